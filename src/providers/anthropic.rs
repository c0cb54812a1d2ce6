use serde_json::{json, Map, Value};

use super::adapter::{AdapterOptions, AdapterParts, ProviderAdapter};
use super::codec::{chunk_or_skip, error_frame, parse_line, ChunkDelta, Codec, Frame, WireCodec};
use super::configs::AnthropicProviderConfig;
use super::retry::RetryPolicy;
use super::transport::{Auth, TransportClient};
use super::utils::{create_object_id, require_api_key, sse_data, token_usage};
use crate::errors::{AdapterError, AdapterResult};
use crate::models::capabilities::{CapabilityTable, ModelCapabilities};
use crate::models::content::{Content, ContentPart, Media, MediaSource};
use crate::models::message::Message;
use crate::models::request::GenerationRequest;
use crate::models::response::Response;
use crate::models::role::Role;
use crate::models::tool::ToolCall;

pub const ANTHROPIC_HOST: &str = "https://api.anthropic.com";
pub const ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const ANTHROPIC_MAX_TOKENS: u32 = 4096;
pub const ANTHROPIC_HISTORY_CAP: usize = 20;

const IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

pub static ANTHROPIC_MODELS: CapabilityTable = CapabilityTable::new(
    &[
        ("claude-3-5-sonnet-20241022", ModelCapabilities::new(8192, 200000, true, true)),
        ("claude-3-opus-20240229", ModelCapabilities::new(4096, 200000, true, true)),
        ("claude-3-sonnet-20240229", ModelCapabilities::new(4096, 200000, true, true)),
        ("claude-3-haiku-20240307", ModelCapabilities::new(4096, 200000, true, true)),
    ],
    ModelCapabilities::new(4096, 200000, true, true),
);

/// Messages API format. The system prompt is a top-level field and
/// streams are typed SSE events ending with `message_stop`.
#[derive(Debug, Clone, Default)]
pub struct AnthropicCodec;

fn media_block(media: &Media) -> Value {
    let source = match &media.source {
        MediaSource::Base64 { data } => json!({
            "type": "base64",
            "media_type": media.mime_type,
            "data": data,
        }),
        MediaSource::Url { url } => json!({"type": "url", "url": url}),
    };
    json!({"type": "image", "source": source})
}

fn content_blocks(content: &Content) -> Vec<Value> {
    match content {
        Content::Text(text) if text.is_empty() => Vec::new(),
        Content::Text(text) => vec![json!({"type": "text", "text": text})],
        Content::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => json!({"type": "text", "text": text}),
                ContentPart::Media(media) => media_block(media),
            })
            .collect(),
    }
}

/// Convert history to Anthropic messages. Tool results travel as user
/// turns and consecutive turns of the same role are merged, since the
/// API requires alternating roles.
fn messages_to_anthropic_spec(messages: &[Message]) -> Vec<Value> {
    let mut spec: Vec<(&'static str, Vec<Value>)> = Vec::new();

    for message in messages {
        let (role, blocks) = match message.role {
            Role::System => continue,
            Role::User => ("user", content_blocks(&message.content)),
            Role::Assistant => {
                let mut blocks = content_blocks(&message.content);
                blocks.extend(message.tool_calls.iter().map(|call| {
                    json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    })
                }));
                ("assistant", blocks)
            }
            Role::Tool => (
                "user",
                vec![json!({
                    "type": "tool_result",
                    "tool_use_id": message.tool_call_id,
                    "content": message.text(),
                })],
            ),
        };
        if blocks.is_empty() {
            continue;
        }

        match spec.last_mut() {
            Some((last_role, last_blocks)) if *last_role == role => last_blocks.extend(blocks),
            _ => spec.push((role, blocks)),
        }
    }

    spec.into_iter()
        .map(|(role, blocks)| json!({"role": role, "content": blocks}))
        .collect()
}

impl Codec for AnthropicCodec {
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

        let mut payload = Map::new();
        payload.insert("model".to_string(), json!(request.model));
        payload.insert(
            "messages".to_string(),
            Value::Array(messages_to_anthropic_spec(&request.messages)),
        );
        payload.insert(
            "max_tokens".to_string(),
            json!(request.max_tokens.unwrap_or(ANTHROPIC_MAX_TOKENS)),
        );
        payload.insert("stream".to_string(), json!(request.stream));
        if !system.is_empty() {
            payload.insert("system".to_string(), json!(system.join("\n\n")));
        }
        if let Some(temperature) = request.temperature {
            payload.insert("temperature".to_string(), json!(temperature));
        }
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "description": tool.description,
                        "input_schema": tool.input_schema,
                    })
                })
                .collect();
            payload.insert("tools".to_string(), Value::Array(tools));
        }
        Ok(Value::Object(payload))
    }

    fn decode_chunk(&self, line: &str) -> Frame {
        let Some(data) = sse_data(line) else {
            return Frame::Skip;
        };
        match data {
            "" => return Frame::Skip,
            "[DONE]" => return Frame::Done,
            _ => {}
        }
        let event = match parse_line(data) {
            Ok(event) => event,
            Err(frame) => return frame,
        };

        match event["type"].as_str() {
            Some("message_start") => chunk_or_skip(ChunkDelta {
                usage: token_usage(&event["message"]["usage"], "input_tokens", "output_tokens"),
                ..Default::default()
            }),
            Some("content_block_delta") => chunk_or_skip(ChunkDelta {
                text: event["delta"]["text"].as_str().unwrap_or_default().to_string(),
                ..Default::default()
            }),
            Some("message_delta") => chunk_or_skip(ChunkDelta {
                finish_reason: event["delta"]["stop_reason"].as_str().map(String::from),
                usage: token_usage(&event["usage"], "input_tokens", "output_tokens"),
                ..Default::default()
            }),
            Some("message_stop") => Frame::Done,
            Some("error") => error_frame(&event["error"]),
            Some(_) => Frame::Skip,
            None => Frame::Malformed(format!("event without type: {}", data)),
        }
    }

    fn decode_final(&self, body: &Value, model: &str) -> AdapterResult<Response> {
        let blocks = body["content"].as_array().ok_or_else(|| {
            AdapterError::Decode("Invalid response format from Anthropic API".to_string())
        })?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in blocks {
            match block["type"].as_str() {
                Some("text") => content.push_str(block["text"].as_str().unwrap_or_default()),
                Some("tool_use") => tool_calls.push(ToolCall::new(
                    block["id"]
                        .as_str()
                        .map(String::from)
                        .unwrap_or_else(|| create_object_id("call")),
                    block["name"].as_str().unwrap_or_default(),
                    block["input"].clone(),
                )),
                _ => {}
            }
        }

        let usage =
            token_usage(&body["usage"], "input_tokens", "output_tokens").unwrap_or_default();
        Ok(Response {
            id: body["id"]
                .as_str()
                .map(String::from)
                .unwrap_or_else(|| create_object_id("resp")),
            model: body["model"].as_str().unwrap_or(model).to_string(),
            content,
            finish_reason: body["stop_reason"].as_str().map(String::from),
            usage: usage.as_counters(),
            tool_calls,
        })
    }

    fn is_terminal(&self, chunk: &Value) -> bool {
        chunk["type"] == "message_stop"
    }

    fn chat_url(&self, base_url: &str, _model: &str, _stream: bool) -> String {
        format!("{}/v1/messages", base_url.trim_end_matches('/'))
    }

    fn accepted_media(&self) -> &'static [&'static str] {
        IMAGE_TYPES
    }
}

impl ProviderAdapter {
    pub fn anthropic(
        config: AnthropicProviderConfig,
        transport: TransportClient,
        options: AdapterOptions,
    ) -> AdapterResult<Self> {
        require_api_key("Anthropic", &config.api_key)?;
        Ok(Self::from_parts(
            AdapterParts {
                name: "anthropic",
                base_url: config.host,
                auth: Auth::Header {
                    name: "x-api-key".to_string(),
                    value: config.api_key,
                },
                headers: vec![(
                    "anthropic-version".to_string(),
                    ANTHROPIC_VERSION.to_string(),
                )],
                model: config.model,
                embedding_model: None,
                temperature: config.temperature.unwrap_or(0.7),
                max_tokens: Some(config.max_tokens.unwrap_or(ANTHROPIC_MAX_TOKENS)),
                history_cap: ANTHROPIC_HISTORY_CAP,
                codec: WireCodec::Anthropic(AnthropicCodec),
                capabilities: &ANTHROPIC_MODELS,
                retry: RetryPolicy::default(),
            },
            transport,
            options,
        ))
    }
}
