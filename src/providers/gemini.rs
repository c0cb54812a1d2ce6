use serde_json::{json, Value};

use super::adapter::{AdapterOptions, AdapterParts, ProviderAdapter};
use super::codec::{chunk_or_skip, error_frame, parse_line, ChunkDelta, Codec, Frame, WireCodec};
use super::configs::GeminiProviderConfig;
use super::retry::RetryPolicy;
use super::transport::{Auth, TransportClient};
use super::utils::{create_object_id, require_api_key, token_usage};
use crate::errors::{AdapterError, AdapterResult};
use crate::models::capabilities::{CapabilityTable, ModelCapabilities};
use crate::models::content::{Content, ContentPart, Media, MediaSource};
use crate::models::message::Message;
use crate::models::request::GenerationRequest;
use crate::models::response::Response;
use crate::models::role::Role;
use crate::models::tool::ToolCall;

pub const GEMINI_HOST: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GEMINI_MODEL: &str = "gemini-1.5-flash";
pub const GEMINI_HISTORY_CAP: usize = 20;

const MEDIA_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/webp",
    "image/heic",
    "image/heif",
    "video/mp4",
    "video/mpeg",
    "video/mov",
    "video/webm",
];

const SAFETY_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

pub static GEMINI_MODELS: CapabilityTable = CapabilityTable::new(
    &[
        ("gemini-1.5-pro", ModelCapabilities::new(8192, 2097152, true, true)),
        ("gemini-1.5-flash", ModelCapabilities::new(8192, 1048576, true, true)),
        ("gemini-pro-vision", ModelCapabilities::new(4096, 16384, true, false)),
        ("gemini-pro", ModelCapabilities::new(8192, 32760, false, true)),
    ],
    ModelCapabilities::new(8192, 32760, true, true),
);

/// generateContent format. Streams are requested as SSE, but bare JSON
/// array elements are also accepted line by line.
#[derive(Debug, Clone, Default)]
pub struct GeminiCodec;

fn media_part(media: &Media) -> Value {
    match &media.source {
        MediaSource::Base64 { data } => json!({
            "inlineData": {"mimeType": media.mime_type, "data": data}
        }),
        MediaSource::Url { url } => json!({
            "fileData": {"mimeType": media.mime_type, "fileUri": url}
        }),
    }
}

fn message_parts(message: &Message) -> Vec<Value> {
    let mut parts: Vec<Value> = match &message.content {
        Content::Text(text) if text.is_empty() => Vec::new(),
        Content::Text(text) => vec![json!({"text": text})],
        Content::Parts(items) => items
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => json!({"text": text}),
                ContentPart::Media(media) => media_part(media),
            })
            .collect(),
    };
    parts.extend(message.tool_calls.iter().map(|call| {
        json!({"functionCall": {"name": call.name, "args": call.arguments}})
    }));
    parts
}

fn message_to_gemini_spec(message: &Message) -> Option<Value> {
    match message.role {
        Role::System => None,
        Role::User => Some(json!({"role": "user", "parts": message_parts(message)})),
        Role::Assistant => Some(json!({"role": "model", "parts": message_parts(message)})),
        Role::Tool => Some(json!({
            "role": "function",
            "parts": [{
                "functionResponse": {
                    "name": message.name.clone().unwrap_or_default(),
                    "response": {"content": message.text()},
                }
            }]
        })),
    }
}

/// Strip SSE and JSON-array punctuation around one streamed object.
fn unwrap_line(line: &str) -> &str {
    let line = line.strip_prefix("data:").unwrap_or(line).trim();
    let line = line.strip_prefix('[').unwrap_or(line);
    let line = line.strip_prefix(',').unwrap_or(line);
    let line = line.strip_suffix(']').unwrap_or(line);
    line.strip_suffix(',').unwrap_or(line).trim()
}

impl Codec for GeminiCodec {
    fn encode(&self, request: &GenerationRequest) -> AdapterResult<Value> {
        let system: Vec<String> = request
            .system_prompt
            .iter()
            .cloned()
            .chain(
                request
                    .messages
                    .iter()
                    .filter(|m| m.role == Role::System)
                    .map(|m| m.text()),
            )
            .collect();

        let contents: Vec<Value> = request
            .messages
            .iter()
            .filter_map(message_to_gemini_spec)
            .collect();

        let mut generation_config = json!({"topK": 40, "topP": 0.95});
        if let Some(temperature) = request.temperature {
            generation_config["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            generation_config["maxOutputTokens"] = json!(max_tokens);
        }

        let safety_settings: Vec<Value> = SAFETY_CATEGORIES
            .iter()
            .map(|category| json!({"category": category, "threshold": "BLOCK_MEDIUM_AND_ABOVE"}))
            .collect();

        let mut payload = json!({
            "contents": contents,
            "generationConfig": generation_config,
            "safetySettings": safety_settings,
        });
        if !system.is_empty() {
            payload["systemInstruction"] = json!({"parts": [{"text": system.join("\n\n")}]});
        }
        if !request.tools.is_empty() {
            let declarations: Vec<Value> = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.input_schema,
                    })
                })
                .collect();
            payload["tools"] = json!([{"functionDeclarations": declarations}]);
        }
        Ok(payload)
    }

    fn decode_chunk(&self, line: &str) -> Frame {
        let data = unwrap_line(line);
        if data.is_empty() {
            return Frame::Skip;
        }
        let chunk = match parse_line(data) {
            Ok(chunk) => chunk,
            Err(frame) => return frame,
        };
        if let Some(error) = chunk.get("error").filter(|e| !e.is_null()) {
            return error_frame(error);
        }

        let candidate = &chunk["candidates"][0];
        let text: String = candidate["content"]["parts"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|part| part["text"].as_str())
            .collect();

        chunk_or_skip(ChunkDelta {
            text,
            finish_reason: candidate["finishReason"].as_str().map(String::from),
            usage: token_usage(
                &chunk["usageMetadata"],
                "promptTokenCount",
                "candidatesTokenCount",
            ),
            terminal: self.is_terminal(&chunk),
        })
    }

    fn decode_final(&self, body: &Value, model: &str) -> AdapterResult<Response> {
        if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
            return Err(AdapterError::Provider {
                status_code: error["code"].as_u64().unwrap_or(200) as u16,
                raw_body: error.to_string(),
            });
        }
        let candidate = body["candidates"].get(0).ok_or_else(|| {
            match body["promptFeedback"]["blockReason"].as_str() {
                Some(reason) => AdapterError::Provider {
                    status_code: 200,
                    raw_body: format!("Prompt blocked: {}", reason),
                },
                None => AdapterError::Decode(
                    "Invalid response format from Gemini API".to_string(),
                ),
            }
        })?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for part in candidate["content"]["parts"].as_array().into_iter().flatten() {
            if let Some(text) = part["text"].as_str() {
                content.push_str(text);
            }
            if let Some(call) = part.get("functionCall") {
                tool_calls.push(ToolCall::new(
                    create_object_id("call"),
                    call["name"].as_str().unwrap_or_default(),
                    call["args"].clone(),
                ));
            }
        }

        let usage = token_usage(
            &body["usageMetadata"],
            "promptTokenCount",
            "candidatesTokenCount",
        )
        .unwrap_or_default();
        Ok(Response {
            id: create_object_id("resp"),
            model: body["modelVersion"].as_str().unwrap_or(model).to_string(),
            content,
            finish_reason: candidate["finishReason"].as_str().map(String::from),
            usage: usage.as_counters(),
            tool_calls,
        })
    }

    fn is_terminal(&self, chunk: &Value) -> bool {
        chunk["candidates"][0]["finishReason"].is_string()
    }

    fn chat_url(&self, base_url: &str, model: &str, stream: bool) -> String {
        let base_url = base_url.trim_end_matches('/');
        if stream {
            format!("{}/models/{}:streamGenerateContent?alt=sse", base_url, model)
        } else {
            format!("{}/models/{}:generateContent", base_url, model)
        }
    }

    fn accepted_media(&self) -> &'static [&'static str] {
        MEDIA_TYPES
    }
}

impl ProviderAdapter {
    pub fn gemini(
        config: GeminiProviderConfig,
        transport: TransportClient,
        options: AdapterOptions,
    ) -> AdapterResult<Self> {
        require_api_key("Gemini", &config.api_key)?;
        Ok(Self::from_parts(
            AdapterParts {
                name: "gemini",
                base_url: config.host,
                auth: Auth::QueryKey {
                    name: "key".to_string(),
                    value: config.api_key,
                },
                headers: Vec::new(),
                model: config.model,
                embedding_model: None,
                temperature: config.temperature.unwrap_or(0.7),
                max_tokens: config.max_tokens,
                history_cap: GEMINI_HISTORY_CAP,
                codec: WireCodec::Gemini(GeminiCodec),
                capabilities: &GEMINI_MODELS,
                retry: RetryPolicy::default(),
            },
            transport,
            options,
        ))
    }
}
