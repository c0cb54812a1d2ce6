use serde_json::{json, Value};

use super::adapter::{AdapterOptions, AdapterParts, ProviderAdapter};
use super::codec::{
    as_vector, chunk_or_skip, error_frame, parse_line, ChunkDelta, Codec, Frame, WireCodec,
};
use super::configs::HuggingFaceProviderConfig;
use super::retry::RetryPolicy;
use super::transport::{Auth, TransportClient};
use super::utils::{create_object_id, require_api_key, sse_data, token_usage};
use crate::errors::{AdapterError, AdapterResult};
use crate::models::capabilities::{CapabilityTable, ModelCapabilities};
use crate::models::request::GenerationRequest;
use crate::models::response::{Response, TokenUsage};

pub const HUGGINGFACE_HOST: &str = "https://api-inference.huggingface.co/models";
pub const HUGGINGFACE_MODEL: &str = "mistralai/Mistral-7B-Instruct-v0.2";
pub const HUGGINGFACE_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const HUGGINGFACE_HISTORY_CAP: usize = 20;
/// The inference API answers 503 while a cold model is loading.
pub const HUGGINGFACE_RETRY_STATUSES: &[u16] = &[503];

/// History messages folded into the prompt ahead of the current turn.
const PROMPT_CONTEXT: usize = 5;

/// Recognised so descriptors can be checked. No model in the table accepts media.
const IMAGE_TYPES: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];

pub static HUGGINGFACE_MODELS: CapabilityTable = CapabilityTable::new(
    &[
        ("mistralai/Mistral-7B-Instruct", ModelCapabilities::new(4096, 32768, false, false)),
        ("meta-llama/Llama-2", ModelCapabilities::new(4096, 4096, false, false)),
        ("HuggingFaceH4/zephyr-7b-beta", ModelCapabilities::new(4096, 32768, false, false)),
        ("google/flan-t5", ModelCapabilities::new(512, 512, false, false)),
    ],
    ModelCapabilities::new(1024, 4096, false, false),
);

/// Text-generation-inference format: a flattened prompt in, token frames out.
#[derive(Debug, Clone, Default)]
pub struct HuggingFaceCodec;

fn build_prompt(request: &GenerationRequest) -> String {
    let mut prompt = String::new();
    if let Some(system) = &request.system_prompt {
        prompt.push_str(&format!("system: {}\n", system));
    }

    let (current, history) = match request.messages.split_last() {
        Some((current, history)) => (Some(current), history),
        None => (None, &[][..]),
    };
    let skip = history.len().saturating_sub(PROMPT_CONTEXT);
    for message in history.iter().skip(skip) {
        prompt.push_str(&format!("{}: {}\n", message.role, message.text()));
    }
    if let Some(current) = current {
        prompt.push_str(&format!("{}: {}\n", current.role, current.text()));
    }
    prompt.push_str("assistant:");
    prompt
}

fn generated_usage(details: &Value) -> Option<TokenUsage> {
    token_usage(details, "prefill_tokens", "generated_tokens")
}

/// Mean-pool token embeddings when the model returns one vector per token.
fn pool(value: &Value) -> Option<Vec<f32>> {
    if let Some(vector) = as_vector(value) {
        return Some(vector);
    }
    let rows: Vec<Vec<f32>> = value
        .as_array()?
        .iter()
        .map(as_vector)
        .collect::<Option<_>>()?;
    let width = rows.first()?.len();
    let mut mean = vec![0.0f32; width];
    for row in &rows {
        for (acc, x) in mean.iter_mut().zip(row) {
            *acc += x;
        }
    }
    let count = rows.len() as f32;
    mean.iter_mut().for_each(|x| *x /= count);
    Some(mean)
}

fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
    vector
}

impl Codec for HuggingFaceCodec {
    fn encode(&self, request: &GenerationRequest) -> AdapterResult<Value> {
        let temperature = request.temperature.unwrap_or(0.7);
        let mut parameters = json!({
            "temperature": temperature,
            "do_sample": temperature > 0.0,
            "return_full_text": false,
        });
        if let Some(max_tokens) = request.max_tokens {
            parameters["max_new_tokens"] = json!(max_tokens);
        }

        let mut payload = json!({
            "inputs": build_prompt(request),
            "parameters": parameters,
        });
        if request.stream {
            payload["stream"] = json!(true);
        }
        Ok(payload)
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
        let chunk = match parse_line(data) {
            Ok(chunk) => chunk,
            Err(frame) => return frame,
        };
        if let Some(error) = chunk.get("error").filter(|e| !e.is_null()) {
            return error_frame(error);
        }

        let token = &chunk["token"];
        let text = if token["special"].as_bool().unwrap_or(false) {
            String::new()
        } else {
            token["text"].as_str().unwrap_or_default().to_string()
        };
        let terminal = self.is_terminal(&chunk);

        chunk_or_skip(ChunkDelta {
            text,
            finish_reason: chunk["details"]["finish_reason"]
                .as_str()
                .map(String::from)
                .or_else(|| terminal.then(|| "stop".to_string())),
            usage: generated_usage(&chunk["details"]),
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
        let result = match body {
            Value::Array(items) => items.first().unwrap_or(&Value::Null),
            other => other,
        };
        let content = result["generated_text"].as_str().ok_or_else(|| {
            AdapterError::Decode("Invalid response format from HuggingFace API".to_string())
        })?;

        let usage = generated_usage(&result["details"]).unwrap_or_default();
        Ok(Response {
            id: create_object_id("resp"),
            model: model.to_string(),
            content: content.trim_start().to_string(),
            finish_reason: result["details"]["finish_reason"]
                .as_str()
                .map(String::from)
                .or_else(|| Some("stop".to_string())),
            usage: usage.as_counters(),
            tool_calls: Vec::new(),
        })
    }

    fn is_terminal(&self, chunk: &Value) -> bool {
        chunk
            .get("generated_text")
            .map_or(false, |text| !text.is_null())
    }

    fn chat_url(&self, base_url: &str, model: &str, _stream: bool) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), model)
    }

    fn accepted_media(&self) -> &'static [&'static str] {
        IMAGE_TYPES
    }

    fn embeddings_url(&self, base_url: &str, model: &str) -> AdapterResult<String> {
        Ok(format!("{}/{}", base_url.trim_end_matches('/'), model))
    }

    fn encode_embeddings(&self, inputs: &[String], _model: &str) -> AdapterResult<Value> {
        Ok(json!({"inputs": inputs, "options": {"wait_for_model": true}}))
    }

    fn decode_embeddings(&self, body: &Value) -> AdapterResult<Vec<Vec<f32>>> {
        body.as_array()
            .ok_or_else(|| AdapterError::Decode("Embeddings response is not a list".to_string()))?
            .iter()
            .map(|item| {
                pool(item).map(normalize).ok_or_else(|| {
                    AdapterError::Decode("Embedding is not a numeric vector".to_string())
                })
            })
            .collect()
    }
}

impl ProviderAdapter {
    pub fn huggingface(
        config: HuggingFaceProviderConfig,
        transport: TransportClient,
        options: AdapterOptions,
    ) -> AdapterResult<Self> {
        require_api_key("HuggingFace", &config.api_key)?;
        Ok(Self::from_parts(
            AdapterParts {
                name: "huggingface",
                base_url: config.host,
                auth: Auth::Bearer(config.api_key),
                headers: Vec::new(),
                model: config.model,
                embedding_model: Some(config.embedding_model),
                temperature: config.temperature.unwrap_or(0.7),
                max_tokens: config.max_tokens,
                history_cap: HUGGINGFACE_HISTORY_CAP,
                codec: WireCodec::HuggingFace(HuggingFaceCodec),
                capabilities: &HUGGINGFACE_MODELS,
                retry: RetryPolicy::default().with_retryable_statuses(HUGGINGFACE_RETRY_STATUSES),
            },
            transport,
            options,
        ))
    }
}
