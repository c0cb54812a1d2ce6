use super::adapter::{AdapterOptions, AdapterParts, ProviderAdapter};
use super::codec::WireCodec;
use super::configs::DeepSeekProviderConfig;
use super::openai::OpenAiCodec;
use super::retry::RetryPolicy;
use super::transport::{Auth, TransportClient};
use super::utils::require_api_key;
use crate::errors::AdapterResult;
use crate::models::capabilities::{CapabilityTable, ModelCapabilities};

pub const DEEPSEEK_HOST: &str = "https://api.deepseek.com/v1";
pub const DEEPSEEK_MODEL: &str = "deepseek-chat";
pub const DEEPSEEK_MAX_TOKENS: u32 = 4096;
pub const DEEPSEEK_HISTORY_CAP: usize = 20;

pub static DEEPSEEK_MODELS: CapabilityTable = CapabilityTable::new(
    &[
        ("deepseek-chat", ModelCapabilities::new(4096, 32768, false, true)),
        ("deepseek-coder", ModelCapabilities::new(4096, 16384, false, true)),
        ("deepseek-math", ModelCapabilities::new(4096, 16384, false, false)),
    ],
    ModelCapabilities::new(4096, 16384, false, false),
);

impl ProviderAdapter {
    pub fn deepseek(
        config: DeepSeekProviderConfig,
        transport: TransportClient,
        options: AdapterOptions,
    ) -> AdapterResult<Self> {
        require_api_key("DeepSeek", &config.api_key)?;
        Ok(Self::from_parts(
            AdapterParts {
                name: "deepseek",
                base_url: config.host,
                auth: Auth::Bearer(config.api_key),
                headers: Vec::new(),
                model: config.model,
                embedding_model: None,
                temperature: config.temperature.unwrap_or(0.7),
                max_tokens: Some(config.max_tokens.unwrap_or(DEEPSEEK_MAX_TOKENS)),
                history_cap: DEEPSEEK_HISTORY_CAP,
                codec: WireCodec::OpenAi(OpenAiCodec::new(false)),
                capabilities: &DEEPSEEK_MODELS,
                retry: RetryPolicy::default(),
            },
            transport,
            options,
        ))
    }
}
