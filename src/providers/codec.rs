use serde_json::Value;

use super::anthropic::AnthropicCodec;
use super::gemini::GeminiCodec;
use super::huggingface::HuggingFaceCodec;
use super::ollama::OllamaCodec;
use super::openai::OpenAiCodec;
use crate::errors::{AdapterError, AdapterResult};
use crate::models::content::Media;
use crate::models::request::GenerationRequest;
use crate::models::response::{Response, TokenUsage};

/// What one raw line of a streaming body meant.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Keep-alive, event name, or a metadata frame with nothing to report.
    Skip,
    /// Unparseable line. Dropped by the caller.
    Malformed(String),
    /// A well-formed error reported by the provider mid-stream. Ends the stream.
    Error(AdapterError),
    Chunk(ChunkDelta),
    /// An explicit end-of-stream sentinel.
    Done,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkDelta {
    pub text: String,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
    /// The provider's completion signal was carried by this chunk.
    pub terminal: bool,
}

/// Translation between the generic model and one provider's wire format.
pub trait Codec: Send + Sync {
    fn encode(&self, request: &GenerationRequest) -> AdapterResult<Value>;

    fn decode_chunk(&self, line: &str) -> Frame;

    fn decode_final(&self, body: &Value, model: &str) -> AdapterResult<Response>;

    /// Per-provider completion predicate for a parsed chunk.
    fn is_terminal(&self, chunk: &Value) -> bool;

    fn chat_url(&self, base_url: &str, model: &str, stream: bool) -> String;

    fn accepted_media(&self) -> &'static [&'static str];

    fn validate_media(&self, media: &Media) -> AdapterResult<()> {
        media.validate(self.accepted_media())
    }

    fn embeddings_url(&self, _base_url: &str, _model: &str) -> AdapterResult<String> {
        Err(AdapterError::Unsupported(
            "Embeddings are not available for this provider".to_string(),
        ))
    }

    fn encode_embeddings(&self, _inputs: &[String], _model: &str) -> AdapterResult<Value> {
        Err(AdapterError::Unsupported(
            "Embeddings are not available for this provider".to_string(),
        ))
    }

    fn decode_embeddings(&self, _body: &Value) -> AdapterResult<Vec<Vec<f32>>> {
        Err(AdapterError::Unsupported(
            "Embeddings are not available for this provider".to_string(),
        ))
    }
}

/// The closed set of wire formats, chosen when an adapter is built.
#[derive(Debug, Clone)]
pub enum WireCodec {
    OpenAi(OpenAiCodec),
    Anthropic(AnthropicCodec),
    Ollama(OllamaCodec),
    Gemini(GeminiCodec),
    HuggingFace(HuggingFaceCodec),
}

macro_rules! delegate {
    ($self:ident, $codec:ident => $call:expr) => {
        match $self {
            WireCodec::OpenAi($codec) => $call,
            WireCodec::Anthropic($codec) => $call,
            WireCodec::Ollama($codec) => $call,
            WireCodec::Gemini($codec) => $call,
            WireCodec::HuggingFace($codec) => $call,
        }
    };
}

impl Codec for WireCodec {
    fn encode(&self, request: &GenerationRequest) -> AdapterResult<Value> {
        delegate!(self, c => c.encode(request))
    }

    fn decode_chunk(&self, line: &str) -> Frame {
        delegate!(self, c => c.decode_chunk(line))
    }

    fn decode_final(&self, body: &Value, model: &str) -> AdapterResult<Response> {
        delegate!(self, c => c.decode_final(body, model))
    }

    fn is_terminal(&self, chunk: &Value) -> bool {
        delegate!(self, c => c.is_terminal(chunk))
    }

    fn chat_url(&self, base_url: &str, model: &str, stream: bool) -> String {
        delegate!(self, c => c.chat_url(base_url, model, stream))
    }

    fn accepted_media(&self) -> &'static [&'static str] {
        delegate!(self, c => c.accepted_media())
    }

    fn validate_media(&self, media: &Media) -> AdapterResult<()> {
        delegate!(self, c => c.validate_media(media))
    }

    fn embeddings_url(&self, base_url: &str, model: &str) -> AdapterResult<String> {
        delegate!(self, c => c.embeddings_url(base_url, model))
    }

    fn encode_embeddings(&self, inputs: &[String], model: &str) -> AdapterResult<Value> {
        delegate!(self, c => c.encode_embeddings(inputs, model))
    }

    fn decode_embeddings(&self, body: &Value) -> AdapterResult<Vec<Vec<f32>>> {
        delegate!(self, c => c.decode_embeddings(body))
    }
}

/// Parse a line as JSON or report it as malformed.
pub(crate) fn parse_line(data: &str) -> Result<Value, Frame> {
    serde_json::from_str(data).map_err(|e| Frame::Malformed(format!("{}: {}", e, data)))
}

/// A provider error carried inside a 2xx streaming body.
pub(crate) fn error_frame(error: &Value) -> Frame {
    let raw_body = match error.as_str() {
        Some(message) => message.to_string(),
        None => error.to_string(),
    };
    Frame::Error(AdapterError::Provider {
        status_code: 200,
        raw_body,
    })
}

/// Build a chunk frame, or skip when it carries nothing.
pub(crate) fn chunk_or_skip(chunk: ChunkDelta) -> Frame {
    if chunk.text.is_empty() && chunk.finish_reason.is_none() && chunk.usage.is_none() && !chunk.terminal
    {
        Frame::Skip
    } else {
        Frame::Chunk(chunk)
    }
}

/// Interpret a JSON value as a float vector.
pub(crate) fn as_vector(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chunk_or_skip() {
        assert_eq!(chunk_or_skip(ChunkDelta::default()), Frame::Skip);

        let chunk = ChunkDelta {
            terminal: true,
            ..Default::default()
        };
        assert_eq!(chunk_or_skip(chunk.clone()), Frame::Chunk(chunk));
    }

    #[test]
    fn test_error_frame() {
        assert_eq!(
            error_frame(&json!("model is loading")),
            Frame::Error(AdapterError::Provider {
                status_code: 200,
                raw_body: "model is loading".to_string()
            })
        );
        match error_frame(&json!({"type": "overloaded_error", "message": "Overloaded"})) {
            Frame::Error(AdapterError::Provider { raw_body, .. }) => {
                assert!(raw_body.contains("Overloaded"))
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_as_vector() {
        assert_eq!(as_vector(&json!([0.5, 1])), Some(vec![0.5, 1.0]));
        assert_eq!(as_vector(&json!([0.5, "x"])), None);
        assert_eq!(as_vector(&json!({})), None);
    }

    #[test]
    fn test_dispatch_selects_framing() {
        let openai = WireCodec::OpenAi(OpenAiCodec::default());
        let ollama = WireCodec::Ollama(OllamaCodec::default());

        assert_eq!(openai.decode_chunk("data: [DONE]"), Frame::Done);
        assert!(matches!(
            ollama.decode_chunk("{\"message\":{\"content\":\"\"},\"done\":true}"),
            Frame::Chunk(ChunkDelta { terminal: true, .. })
        ));
        assert!(!openai.is_terminal(&json!({"choices": [{"finish_reason": "stop"}]})));
        assert!(ollama.is_terminal(&json!({"done": true})));
    }
}
