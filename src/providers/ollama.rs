use serde_json::{json, Map, Value};

use super::adapter::{AdapterOptions, AdapterParts, ProviderAdapter};
use super::codec::{
    as_vector, chunk_or_skip, error_frame, parse_line, ChunkDelta, Codec, Frame, WireCodec,
};
use super::configs::OllamaProviderConfig;
use super::retry::RetryPolicy;
use super::transport::{Auth, TransportClient};
use super::utils::{create_object_id, token_usage, tools_to_openai_spec};
use crate::errors::{AdapterError, AdapterResult};
use crate::models::capabilities::{CapabilityTable, ModelCapabilities};
use crate::models::content::{Media, MediaSource};
use crate::models::message::Message;
use crate::models::request::GenerationRequest;
use crate::models::response::Response;
use crate::models::role::Role;
use crate::models::tool::ToolCall;

pub const OLLAMA_HOST: &str = "http://localhost:11434";
pub const OLLAMA_MODEL: &str = "llama3";
pub const OLLAMA_EMBEDDING_MODEL: &str = "nomic-embed-text";
pub const OLLAMA_KEEP_ALIVE: &str = "5m";
pub const OLLAMA_HISTORY_CAP: usize = 20;

const IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png"];

pub static OLLAMA_MODELS: CapabilityTable = CapabilityTable::new(
    &[
        ("llama3.1", ModelCapabilities::new(4096, 131072, false, true)),
        ("llama3", ModelCapabilities::new(4096, 8192, false, true)),
        ("llava", ModelCapabilities::new(4096, 4096, true, false)),
        ("mistral", ModelCapabilities::new(4096, 32768, false, true)),
        ("codellama", ModelCapabilities::new(4096, 16384, false, false)),
    ],
    ModelCapabilities::new(2048, 4096, false, true),
);

#[derive(Debug, Clone, Default)]
pub struct OllamaCodec;

fn message_to_ollama_spec(message: &Message) -> Value {
    let mut spec = json!({
        "role": message.role.as_str(),
        "content": message.text(),
    });

    let images: Vec<&str> = message
        .media()
        .into_iter()
        .filter_map(|media| match &media.source {
            MediaSource::Base64 { data } => Some(data.as_str()),
            MediaSource::Url { .. } => None,
        })
        .collect();
    if !images.is_empty() {
        spec["images"] = json!(images);
    }

    if !message.tool_calls.is_empty() {
        spec["tool_calls"] = message
            .tool_calls
            .iter()
            .map(|call| json!({"function": {"name": call.name, "arguments": call.arguments}}))
            .collect();
    }
    spec
}

impl Codec for OllamaCodec {
    fn encode(&self, request: &GenerationRequest) -> AdapterResult<Value> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system_prompt {
            messages.push(json!({"role": Role::System.as_str(), "content": system}));
        }
        messages.extend(request.messages.iter().map(message_to_ollama_spec));

        let mut options = Map::new();
        if let Some(temperature) = request.temperature {
            options.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            options.insert("num_predict".to_string(), json!(max_tokens));
        }
        options.insert("top_p".to_string(), json!(0.9));
        options.insert("top_k".to_string(), json!(40));

        let mut payload = json!({
            "model": request.model,
            "messages": messages,
            "stream": request.stream,
            "keep_alive": OLLAMA_KEEP_ALIVE,
            "options": options,
        });
        if !request.tools.is_empty() {
            payload["tools"] = json!(tools_to_openai_spec(&request.tools)?);
        }
        Ok(payload)
    }

    fn decode_chunk(&self, line: &str) -> Frame {
        let line = line.trim();
        if line.is_empty() {
            return Frame::Skip;
        }
        let chunk = match parse_line(line) {
            Ok(chunk) => chunk,
            Err(frame) => return frame,
        };
        if let Some(error) = chunk.get("error").filter(|e| !e.is_null()) {
            return error_frame(error);
        }

        let terminal = self.is_terminal(&chunk);
        chunk_or_skip(ChunkDelta {
            text: chunk["message"]["content"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            finish_reason: terminal.then(|| {
                chunk["done_reason"]
                    .as_str()
                    .unwrap_or("stop")
                    .to_string()
            }),
            usage: token_usage(&chunk, "prompt_eval_count", "eval_count"),
            terminal,
        })
    }

    fn decode_final(&self, body: &Value, model: &str) -> AdapterResult<Response> {
        if let Some(error) = body.get("error").and_then(Value::as_str) {
            return Err(AdapterError::Provider {
                status_code: 200,
                raw_body: error.to_string(),
            });
        }
        let message = body.get("message").ok_or_else(|| {
            AdapterError::Decode("Invalid response format from Ollama API".to_string())
        })?;

        let tool_calls = message["tool_calls"]
            .as_array()
            .into_iter()
            .flatten()
            .map(|call| {
                ToolCall::new(
                    create_object_id("call"),
                    call["function"]["name"].as_str().unwrap_or_default(),
                    call["function"]["arguments"].clone(),
                )
            })
            .collect();

        let usage =
            token_usage(body, "prompt_eval_count", "eval_count").unwrap_or_default();
        Ok(Response {
            id: create_object_id("resp"),
            model: body["model"].as_str().unwrap_or(model).to_string(),
            content: message["content"].as_str().unwrap_or_default().to_string(),
            finish_reason: body["done_reason"].as_str().map(String::from),
            usage: usage.as_counters(),
            tool_calls,
        })
    }

    fn is_terminal(&self, chunk: &Value) -> bool {
        chunk["done"].as_bool().unwrap_or(false)
    }

    fn chat_url(&self, base_url: &str, _model: &str, _stream: bool) -> String {
        format!("{}/api/chat", base_url.trim_end_matches('/'))
    }

    fn accepted_media(&self) -> &'static [&'static str] {
        IMAGE_TYPES
    }

    fn validate_media(&self, media: &Media) -> AdapterResult<()> {
        if media.is_remote() {
            return Err(AdapterError::Validation(
                "Ollama only accepts inline base64 images".to_string(),
            ));
        }
        media.validate(IMAGE_TYPES)
    }

    fn embeddings_url(&self, base_url: &str, _model: &str) -> AdapterResult<String> {
        Ok(format!("{}/api/embed", base_url.trim_end_matches('/')))
    }

    fn encode_embeddings(&self, inputs: &[String], model: &str) -> AdapterResult<Value> {
        Ok(json!({"model": model, "input": inputs}))
    }

    fn decode_embeddings(&self, body: &Value) -> AdapterResult<Vec<Vec<f32>>> {
        body["embeddings"]
            .as_array()
            .ok_or_else(|| AdapterError::Decode("Missing embeddings in response".to_string()))?
            .iter()
            .map(|v| {
                as_vector(v)
                    .ok_or_else(|| AdapterError::Decode("Embedding is not a vector".to_string()))
            })
            .collect()
    }
}

impl ProviderAdapter {
    pub fn ollama(
        config: OllamaProviderConfig,
        transport: TransportClient,
        options: AdapterOptions,
    ) -> AdapterResult<Self> {
        Ok(Self::from_parts(
            AdapterParts {
                name: "ollama",
                base_url: config.host,
                auth: Auth::None,
                headers: Vec::new(),
                model: config.model,
                embedding_model: Some(OLLAMA_EMBEDDING_MODEL.to_string()),
                temperature: config.temperature.unwrap_or(0.7),
                max_tokens: config.max_tokens,
                history_cap: OLLAMA_HISTORY_CAP,
                codec: WireCodec::Ollama(OllamaCodec),
                capabilities: &OLLAMA_MODELS,
                retry: RetryPolicy::default(),
            },
            transport,
            options,
        ))
    }
}
