use super::adapter::{AdapterOptions, AdapterParts, ProviderAdapter};
use super::codec::WireCodec;
use super::configs::GrokProviderConfig;
use super::openai::OpenAiCodec;
use super::retry::RetryPolicy;
use super::transport::{Auth, TransportClient};
use super::utils::require_api_key;
use crate::errors::AdapterResult;
use crate::models::capabilities::{CapabilityTable, ModelCapabilities};

pub const GROK_HOST: &str = "https://api.x.ai/v1";
pub const GROK_MODEL: &str = "grok-beta";
pub const GROK_MAX_TOKENS: u32 = 4096;
pub const GROK_HISTORY_CAP: usize = 20;

pub static GROK_MODELS: CapabilityTable = CapabilityTable::new(
    &[
        ("grok-beta", ModelCapabilities::new(4096, 131072, false, true)),
        ("grok-vision-beta", ModelCapabilities::new(4096, 131072, true, true)),
    ],
    ModelCapabilities::new(4096, 131072, false, true),
);

impl ProviderAdapter {
    /// xAI speaks the chat-completions format without streamed usage.
    pub fn grok(
        config: GrokProviderConfig,
        transport: TransportClient,
        options: AdapterOptions,
    ) -> AdapterResult<Self> {
        require_api_key("Grok", &config.api_key)?;
        Ok(Self::from_parts(
            AdapterParts {
                name: "grok",
                base_url: config.host,
                auth: Auth::Bearer(config.api_key),
                headers: Vec::new(),
                model: config.model,
                embedding_model: None,
                temperature: config.temperature.unwrap_or(0.7),
                max_tokens: Some(config.max_tokens.unwrap_or(GROK_MAX_TOKENS)),
                history_cap: GROK_HISTORY_CAP,
                codec: WireCodec::OpenAi(OpenAiCodec::new(false)),
                capabilities: &GROK_MODELS,
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
    use crate::errors::AdapterError;
    use crate::models::content::Media;
    use crate::providers::base::{MessageOptions, Provider};
    use futures::StreamExt;
    use serde_json::{json, Value};
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn adapter_for(server: &MockServer) -> ProviderAdapter {
        let config = GrokProviderConfig {
            host: server.uri(),
            ..GrokProviderConfig::new("xai-key")
        };
        let transport = TransportClient::new(Duration::from_secs(5)).unwrap();
        ProviderAdapter::grok(config, transport, AdapterOptions::default()).unwrap()
    }

    #[tokio::test]
    async fn test_stream_without_usage_option() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hey\"},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer xai-key"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let adapter = adapter_for(&server);
        let mut stream = adapter
            .stream_message("hi", MessageOptions::new().with_conversation("x"))
            .await?;
        let mut deltas = Vec::new();
        while let Some(delta) = stream.next().await {
            deltas.push(delta?);
        }
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[1].finish_reason.as_deref(), Some("stop"));

        let requests: Vec<Request> = server.received_requests().await.unwrap_or_default();
        let sent: Value = serde_json::from_slice(&requests[0].body)?;
        assert_eq!(sent["model"], GROK_MODEL);
        assert_eq!(sent["max_tokens"], GROK_MAX_TOKENS);
        assert!(sent.get("stream_options").is_none());
        assert_eq!(adapter.history("x")[1].text(), "Hey");
        Ok(())
    }

    #[tokio::test]
    async fn test_vision_only_on_vision_model() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "x-1",
                "choices": [{"message": {"role": "assistant", "content": "A cat."}, "finish_reason": "stop"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = adapter_for(&server);
        let image = Media::base64("aGk=", "image/png");
        let err = adapter
            .send_multimodal_message("what?", vec![image.clone()], MessageOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Unsupported(_)));

        let unknown = Media::base64("aGk=", "application/x-msdownload");
        let err = adapter
            .send_multimodal_message("what?", vec![unknown], MessageOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Validation(_)));

        let response = adapter
            .send_multimodal_message(
                "what?",
                vec![image],
                MessageOptions::new().with_model("grok-vision-beta"),
            )
            .await?;
        assert_eq!(response.content, "A cat.");
        Ok(())
    }

    #[test]
    fn test_missing_key() {
        let err = ProviderAdapter::grok(
            GrokProviderConfig::new(""),
            TransportClient::new(Duration::from_secs(1)).unwrap(),
            AdapterOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AdapterError::Validation(_)));
    }
}
