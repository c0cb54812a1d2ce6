use base64::Engine;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{AdapterError, AdapterResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaSource {
    Base64 { data: String },
    Url { url: String },
}

/// A media attachment, either inline or a remote reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    pub mime_type: String,
    pub source: MediaSource,
}

impl Media {
    pub fn base64<S: Into<String>, T: Into<String>>(data: S, mime_type: T) -> Self {
        Media {
            mime_type: mime_type.into(),
            source: MediaSource::Base64 { data: data.into() },
        }
    }

    /// Remote media. The mime type is guessed from the path extension and
    /// left empty when the extension is unknown.
    pub fn url<S: Into<String>>(url: S) -> Self {
        let url = url.into();
        let mime_type = mime_from_extension(&url).unwrap_or_default().to_string();
        Media {
            mime_type,
            source: MediaSource::Url { url },
        }
    }

    pub fn with_mime_type<S: Into<String>>(mut self, mime_type: S) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.source, MediaSource::Url { .. })
    }

    /// Checks the descriptor against the mime types a codec accepts.
    pub fn validate(&self, accepted: &[&str]) -> AdapterResult<()> {
        if self.mime_type.is_empty() {
            return Err(AdapterError::Validation(
                "Media type could not be determined".to_string(),
            ));
        }
        if !accepted.contains(&self.mime_type.as_str()) {
            return Err(AdapterError::Validation(format!(
                "Unsupported media type: {}",
                self.mime_type
            )));
        }

        match &self.source {
            MediaSource::Base64 { data } => {
                base64::engine::general_purpose::STANDARD
                    .decode(data)
                    .map_err(|e| {
                        AdapterError::Validation(format!("Invalid base64 media data: {}", e))
                    })?;
            }
            MediaSource::Url { url } => {
                let parsed = Url::parse(url).map_err(|e| {
                    AdapterError::Validation(format!("Invalid media url '{}': {}", url, e))
                })?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(AdapterError::Validation(format!(
                        "Media url must be http or https: {}",
                        url
                    )));
                }
            }
        }
        Ok(())
    }

    /// `data:` URL for inline media, the url itself for remote media.
    pub fn as_url(&self) -> String {
        match &self.source {
            MediaSource::Base64 { data } => format!("data:{};base64,{}", self.mime_type, data),
            MediaSource::Url { url } => url.clone(),
        }
    }
}

fn mime_from_extension(url: &str) -> Option<&'static str> {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());
    let extension = path.rsplit_once('.')?.1.to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        "mp4" => Some("video/mp4"),
        "mpeg" => Some("video/mpeg"),
        "mov" => Some("video/mov"),
        "webm" => Some("video/webm"),
        "pdf" => Some("application/pdf"),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Media(Media),
}

/// Message content: plain text or an ordered list of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Default for Content {
    fn default() -> Self {
        Content::Text(String::new())
    }
}

impl Content {
    /// All text of the content, parts joined without separators.
    pub fn text(&self) -> String {
        match self {
            Content::Text(text) => text.clone(),
            Content::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Media(_) => None,
                })
                .collect(),
        }
    }

    pub fn media(&self) -> Vec<&Media> {
        match self {
            Content::Text(_) => Vec::new(),
            Content::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Media(media) => Some(media),
                    ContentPart::Text { .. } => None,
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Content::Text(text) => text.is_empty(),
            Content::Parts(parts) => parts.is_empty(),
        }
    }

    pub(crate) fn push(&mut self, part: ContentPart) {
        match self {
            Content::Text(text) if text.is_empty() => {
                *self = Content::Parts(vec![part]);
            }
            Content::Text(text) => {
                let existing = ContentPart::Text {
                    text: std::mem::take(text),
                };
                *self = Content::Parts(vec![existing, part]);
            }
            Content::Parts(parts) => parts.push(part),
        }
    }
}
