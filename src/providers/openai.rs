use serde_json::{json, Map, Value};

use super::adapter::{AdapterOptions, AdapterParts, ProviderAdapter};
use super::codec::{
    as_vector, chunk_or_skip, error_frame, parse_line, ChunkDelta, Codec, Frame, WireCodec,
};
use super::configs::OpenAiProviderConfig;
use super::retry::RetryPolicy;
use super::transport::{Auth, TransportClient};
use super::utils::{
    create_object_id, openai_tool_calls, require_api_key, sanitize_function_name, sse_data,
    token_usage, tools_to_openai_spec,
};
use crate::errors::{AdapterError, AdapterResult};
use crate::models::capabilities::{CapabilityTable, ModelCapabilities};
use crate::models::content::{Content, ContentPart};
use crate::models::message::Message;
use crate::models::request::GenerationRequest;
use crate::models::response::Response;
use crate::models::role::Role;

pub const OPENAI_HOST: &str = "https://api.openai.com/v1";
pub const OPENAI_MODEL: &str = "gpt-4o";
pub const OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const OPENAI_HISTORY_CAP: usize = 30;

const IMAGE_TYPES: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];

pub static OPENAI_MODELS: CapabilityTable = CapabilityTable::new(
    &[
        ("gpt-4o", ModelCapabilities::new(4096, 128000, true, true)),
        ("gpt-4o-mini", ModelCapabilities::new(16384, 128000, true, true)),
        ("gpt-4-turbo-preview", ModelCapabilities::new(4096, 128000, false, true)),
        ("gpt-4-vision-preview", ModelCapabilities::new(4096, 128000, true, true)),
        ("gpt-4", ModelCapabilities::new(4096, 8192, false, true)),
        ("gpt-4-32k", ModelCapabilities::new(4096, 32768, false, true)),
        ("gpt-3.5-turbo", ModelCapabilities::new(4096, 16385, false, true)),
    ],
    ModelCapabilities::new(4096, 8192, false, true),
);

/// Chat-completions wire format, shared by OpenAI-compatible APIs.
///
/// Streams are SSE `data:` lines ending with `data: [DONE]`.
#[derive(Debug, Clone, Default)]
pub struct OpenAiCodec {
    include_usage: bool,
}

impl OpenAiCodec {
    /// `include_usage` asks the server for a usage frame at the end of a stream.
    pub fn new(include_usage: bool) -> Self {
        Self { include_usage }
    }
}

/// Convert a message to OpenAI's chat message specification
pub fn message_to_openai_spec(message: &Message) -> Value {
    let mut converted = Map::new();
    converted.insert("role".to_string(), json!(message.role.as_str()));

    let content = match &message.content {
        Content::Text(text) => json!(text),
        Content::Parts(parts) => Value::Array(
            parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => json!({"type": "text", "text": text}),
                    ContentPart::Media(media) => json!({
                        "type": "image_url",
                        "image_url": {"url": media.as_url()}
                    }),
                })
                .collect(),
        ),
    };

    if !message.tool_calls.is_empty() {
        let tool_calls: Vec<Value> = message
            .tool_calls
            .iter()
            .map(|call| {
                json!({
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": sanitize_function_name(&call.name),
                        "arguments": call.arguments.to_string(),
                    }
                })
            })
            .collect();
        converted.insert("tool_calls".to_string(), Value::Array(tool_calls));
        if message.content.is_empty() {
            converted.insert("content".to_string(), Value::Null);
        } else {
            converted.insert("content".to_string(), content);
        }
    } else {
        converted.insert("content".to_string(), content);
    }

    if let Some(tool_call_id) = &message.tool_call_id {
        converted.insert("tool_call_id".to_string(), json!(tool_call_id));
    }
    if let Some(name) = &message.name {
        if message.role != Role::Tool {
            converted.insert("name".to_string(), json!(name));
        }
    }
    Value::Object(converted)
}

impl Codec for OpenAiCodec {
    fn encode(&self, request: &GenerationRequest) -> AdapterResult<Value> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.extend(request.messages.iter().map(message_to_openai_spec));

        let mut payload = Map::new();
        payload.insert("model".to_string(), json!(request.model));
        payload.insert("messages".to_string(), Value::Array(messages));
        payload.insert("stream".to_string(), json!(request.stream));

        if let Some(temperature) = request.temperature {
            payload.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            payload.insert("max_tokens".to_string(), json!(max_tokens));
        }
        if !request.tools.is_empty() {
            let tools = tools_to_openai_spec(&request.tools)?;
            payload.insert("tools".to_string(), Value::Array(tools));
            payload.insert("tool_choice".to_string(), json!("auto"));
        }
        if request.stream && self.include_usage {
            payload.insert(
                "stream_options".to_string(),
                json!({"include_usage": true}),
            );
        }
        Ok(Value::Object(payload))
    }

    fn decode_chunk(&self, line: &str) -> Frame {
        let Some(data) = sse_data(line) else {
            return Frame::Skip;
        };
        if data.is_empty() {
            return Frame::Skip;
        }
        if data == "[DONE]" {
            return Frame::Done;
        }
        let value = match parse_line(data) {
            Ok(value) => value,
            Err(frame) => return frame,
        };
        if !value["error"].is_null() {
            return error_frame(&value["error"]);
        }

        let choice = &value["choices"][0];
        chunk_or_skip(ChunkDelta {
            text: choice["delta"]["content"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            finish_reason: choice["finish_reason"].as_str().map(String::from),
            usage: token_usage(&value["usage"], "prompt_tokens", "completion_tokens"),
            terminal: self.is_terminal(&value),
        })
    }

    fn decode_final(&self, body: &Value, model: &str) -> AdapterResult<Response> {
        if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
            return Err(AdapterError::Provider {
                status_code: 200,
                raw_body: error.to_string(),
            });
        }

        let message = body["choices"]
            .get(0)
            .map(|choice| &choice["message"])
            .filter(|message| message.is_object())
            .ok_or_else(|| {
                AdapterError::Decode("Response has no choices[0].message".to_string())
            })?;

        let usage = token_usage(&body["usage"], "prompt_tokens", "completion_tokens")
            .unwrap_or_default();

        Ok(Response {
            id: body["id"]
                .as_str()
                .map(String::from)
                .unwrap_or_else(|| create_object_id("resp")),
            model: body["model"].as_str().unwrap_or(model).to_string(),
            content: message["content"].as_str().unwrap_or_default().to_string(),
            finish_reason: body["choices"][0]["finish_reason"]
                .as_str()
                .map(String::from),
            usage: usage.as_counters(),
            tool_calls: openai_tool_calls(&message["tool_calls"]),
        })
    }

    /// Completion is the `[DONE]` sentinel, never a JSON chunk.
    fn is_terminal(&self, _chunk: &Value) -> bool {
        false
    }

    fn chat_url(&self, base_url: &str, _model: &str, _stream: bool) -> String {
        format!("{}/chat/completions", base_url.trim_end_matches('/'))
    }

    fn accepted_media(&self) -> &'static [&'static str] {
        IMAGE_TYPES
    }

    fn embeddings_url(&self, base_url: &str, _model: &str) -> AdapterResult<String> {
        Ok(format!("{}/embeddings", base_url.trim_end_matches('/')))
    }

    fn encode_embeddings(&self, inputs: &[String], model: &str) -> AdapterResult<Value> {
        Ok(json!({"model": model, "input": inputs}))
    }

    fn decode_embeddings(&self, body: &Value) -> AdapterResult<Vec<Vec<f32>>> {
        let data = body["data"]
            .as_array()
            .ok_or_else(|| AdapterError::Decode("Embedding response has no data".to_string()))?;
        let mut data: Vec<&Value> = data.iter().collect();
        data.sort_by_key(|item| item["index"].as_u64().unwrap_or(0));
        data.into_iter()
            .map(|item| {
                as_vector(&item["embedding"])
                    .ok_or_else(|| AdapterError::Decode("Malformed embedding".to_string()))
            })
            .collect()
    }
}

impl ProviderAdapter {
    pub fn openai(
        config: OpenAiProviderConfig,
        transport: TransportClient,
        options: AdapterOptions,
    ) -> AdapterResult<Self> {
        require_api_key("OpenAI", &config.api_key)?;
        let headers = config
            .organization
            .map(|org| vec![("OpenAI-Organization".to_string(), org)])
            .unwrap_or_default();

        Ok(Self::from_parts(
            AdapterParts {
                name: "openai",
                base_url: config.host,
                auth: Auth::Bearer(config.api_key),
                headers,
                model: config.model,
                embedding_model: Some(OPENAI_EMBEDDING_MODEL.to_string()),
                temperature: config.temperature.unwrap_or(0.7),
                max_tokens: config.max_tokens,
                history_cap: OPENAI_HISTORY_CAP,
                codec: WireCodec::OpenAi(OpenAiCodec::new(true)),
                capabilities: &OPENAI_MODELS,
                retry: RetryPolicy::default(),
            },
            transport,
            options,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::content::Media;
    use crate::models::response::{StreamOutcome, TokenUsage};
    use crate::models::tool::Tool;
    use crate::providers::base::{MessageOptions, Provider};
    use futures::StreamExt;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Inverse of `encode` for the fields a request must carry across.
    fn decode_request(payload: &Value) -> GenerationRequest {
        let mut messages = Vec::new();
        let mut system_prompt = None;
        for message in payload["messages"].as_array().into_iter().flatten() {
            let text = message["content"].as_str().unwrap_or_default();
            match message["role"].as_str() {
                Some("system") if messages.is_empty() => system_prompt = Some(text.to_string()),
                Some("assistant") => messages.push(Message::assistant().with_text(text)),
                _ => messages.push(Message::user().with_text(text)),
            }
        }
        GenerationRequest {
            model: payload["model"].as_str().unwrap_or_default().to_string(),
            messages,
            temperature: payload["temperature"].as_f64().map(|t| t as f32),
            max_tokens: payload["max_tokens"].as_u64().map(|t| t as u32),
            stream: payload["stream"].as_bool().unwrap_or(false),
            tools: Vec::new(),
            system_prompt,
        }
    }

    fn texts(request: &GenerationRequest) -> Vec<(Role, String)> {
        request
            .messages
            .iter()
            .map(|m| (m.role, m.text()))
            .collect()
    }

    async fn _setup_mock_server(response_body: Value) -> (MockServer, ProviderAdapter) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test_api_key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
            .mount(&mock_server)
            .await;

        let adapter = adapter_for(&mock_server);
        (mock_server, adapter)
    }

    fn adapter_for(server: &MockServer) -> ProviderAdapter {
        let config = OpenAiProviderConfig {
            host: server.uri(),
            model: "gpt-3.5-turbo".to_string(),
            temperature: Some(0.7),
            ..OpenAiProviderConfig::new("test_api_key")
        };
        let transport = TransportClient::new(Duration::from_secs(5)).unwrap();
        ProviderAdapter::openai(config, transport, AdapterOptions::default()).unwrap()
    }

    #[test]
    fn test_encode_round_trip() -> AdapterResult<()> {
        let request = GenerationRequest::new(
            "gpt-4o",
            vec![
                Message::user().with_text("Hello"),
                Message::assistant().with_text("Hi!"),
                Message::user().with_text("How are you?"),
            ],
        )
        .with_temperature(0.3)
        .with_max_tokens(64)
        .with_system_prompt("be terse");

        let payload = OpenAiCodec::default().encode(&request)?;
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"].as_array().unwrap().len(), 4);
        assert!(payload.get("tools").is_none());

        let decoded = decode_request(&payload);
        assert_eq!(decoded.model, request.model);
        assert_eq!(decoded.temperature, request.temperature);
        assert_eq!(decoded.max_tokens, request.max_tokens);
        assert_eq!(decoded.system_prompt, request.system_prompt);
        assert_eq!(texts(&decoded), texts(&request));
        Ok(())
    }

    #[test]
    fn test_encode_parts_and_tools() -> AdapterResult<()> {
        let message = Message::user()
            .with_text("What is this?")
            .with_media(Media::base64("aGk=", "image/png"));
        let tool = Tool::new("lookup", "Look up", json!({"type": "object"}));
        let request = GenerationRequest::new("gpt-4o", vec![message])
            .with_tools(vec![tool])
            .with_stream(true);

        let payload = OpenAiCodec::new(true).encode(&request)?;
        let content = &payload["messages"][0]["content"];
        assert_eq!(content[0], json!({"type": "text", "text": "What is this?"}));
        assert_eq!(content[1]["image_url"]["url"], "data:image/png;base64,aGk=");
        assert_eq!(payload["tools"][0]["function"]["name"], "lookup");
        assert_eq!(payload["tool_choice"], "auto");
        assert_eq!(payload["stream_options"]["include_usage"], true);

        let payload = OpenAiCodec::new(false).encode(&request)?;
        assert!(payload.get("stream_options").is_none());
        Ok(())
    }

    #[test]
    fn test_decode_chunk() {
        let codec = OpenAiCodec::default();
        assert_eq!(
            codec.decode_chunk(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#),
            Frame::Chunk(ChunkDelta {
                text: "Hi".to_string(),
                ..Default::default()
            })
        );
        assert_eq!(codec.decode_chunk("data: [DONE]"), Frame::Done);
        assert_eq!(codec.decode_chunk(""), Frame::Skip);
        assert_eq!(codec.decode_chunk(": keep-alive"), Frame::Skip);
        assert_eq!(
            codec.decode_chunk(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            Frame::Skip
        );
        assert!(matches!(
            codec.decode_chunk("data: {\"choices\": [{"),
            Frame::Malformed(_)
        ));
        assert!(matches!(
            codec.decode_chunk(r#"data: {"error":{"message":"server overloaded","type":"server_error"}}"#),
            Frame::Error(AdapterError::Provider { status_code: 200, .. })
        ));

        let usage = codec.decode_chunk(
            r#"data: {"choices":[],"usage":{"prompt_tokens":5,"completion_tokens":2}}"#,
        );
        assert_eq!(
            usage,
            Frame::Chunk(ChunkDelta {
                usage: Some(TokenUsage::new(5, 2)),
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_decode_final_errors() {
        let codec = OpenAiCodec::default();
        let err = codec.decode_final(&json!({"id": "x"}), "gpt-4o").unwrap_err();
        assert!(matches!(err, AdapterError::Decode(_)));

        let err = codec
            .decode_final(&json!({"error": {"message": "overloaded"}}), "gpt-4o")
            .unwrap_err();
        assert_eq!(err.status_code(), Some(200));
    }

    #[tokio::test]
    async fn test_complete_basic() -> anyhow::Result<()> {
        let response_body = json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "model": "gpt-3.5-turbo",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "Hello! How can I assist you today?",
                    "tool_calls": null
                },
                "finish_reason": "stop"
            }],
            "usage": {
                "prompt_tokens": 12,
                "completion_tokens": 15,
                "total_tokens": 27
            }
        });

        let (_, adapter) = _setup_mock_server(response_body).await;
        let options = MessageOptions::new()
            .with_conversation("c1")
            .with_system_prompt("You are a helpful assistant.");
        let response = adapter.send_message("Hello?", options).await?;

        assert_eq!(response.id, "chatcmpl-123");
        assert_eq!(response.content, "Hello! How can I assist you today?");
        assert_eq!(response.finish_reason.as_deref(), Some("stop"));
        assert_eq!(response.usage.tokens_in, 12);
        assert_eq!(response.usage.tokens_out, 15);

        let history = adapter.history("c1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].text(), "Hello?");
        assert_eq!(history[1].role, Role::Assistant);

        let usage = adapter.usage_stats();
        assert_eq!(usage.requests, 1);
        assert_eq!(usage.tokens_in, 12);
        assert_eq!(usage.tokens_out, 15);
        assert_eq!(usage.errors, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_tool_request() -> anyhow::Result<()> {
        let response_body = json!({
            "id": "chatcmpl-tool",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_123",
                        "type": "function",
                        "function": {
                            "name": "get_weather",
                            "arguments": "{\"location\":\"San Francisco, CA\"}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {
                "prompt_tokens": 20,
                "completion_tokens": 15,
                "total_tokens": 35
            }
        });

        let (_, adapter) = _setup_mock_server(response_body).await;
        let tool = Tool::new(
            "get_weather",
            "Gets the current weather for a location",
            json!({
                "type": "object",
                "properties": {
                    "location": {
                        "type": "string",
                        "description": "The city and state, e.g. New York, NY"
                    }
                },
                "required": ["location"]
            }),
        );

        let response = adapter
            .send_message(
                "What's the weather in San Francisco?",
                MessageOptions::new().with_tools(vec![tool]),
            )
            .await?;

        assert_eq!(response.content, "");
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].id, "call_123");
        assert_eq!(response.tool_calls[0].name, "get_weather");
        assert_eq!(
            response.tool_calls[0].arguments,
            json!({"location": "San Francisco, CA"})
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_stream_hi_there() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let adapter = adapter_for(&server);
        let mut stream = adapter
            .stream_message("hello", MessageOptions::new().with_conversation("s1"))
            .await?;

        let mut deltas = Vec::new();
        while let Some(delta) = stream.next().await {
            deltas.push(delta?);
        }
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].cumulative_text, "Hi");
        assert_eq!(deltas[1].cumulative_text, "Hi there");
        assert_eq!(stream.outcome(), StreamOutcome::Completed);

        let response = stream.into_response().await?;
        let joined: String = deltas.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(response.content, "Hi there");
        assert_eq!(response.content, joined);

        let history = adapter.history("s1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].text(), "Hi there");
        Ok(())
    }

    #[tokio::test]
    async fn test_embeddings() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(json!({"model": OPENAI_EMBEDDING_MODEL})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"index": 1, "embedding": [0.0, 1.0]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ]
            })))
            .mount(&server)
            .await;

        let adapter = adapter_for(&server);
        let vectors = adapter
            .generate_embeddings(&["a".to_string(), "b".to_string()], None)
            .await?;
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        Ok(())
    }

    #[test]
    fn test_missing_api_key() {
        let transport = TransportClient::new(Duration::from_secs(5)).unwrap();
        let result = ProviderAdapter::openai(
            OpenAiProviderConfig::new(""),
            transport,
            AdapterOptions::default(),
        );
        assert!(matches!(result, Err(AdapterError::Validation(_))));
    }

    #[test]
    fn test_capabilities() {
        assert!(OPENAI_MODELS.get("gpt-4o").supports_vision);
        assert_eq!(OPENAI_MODELS.get("gpt-4-32k").context_window, 32768);
        assert_eq!(OPENAI_MODELS.get("gpt-3.5-turbo").context_window, 16385);
    }
}
