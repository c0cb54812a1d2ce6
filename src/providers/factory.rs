use super::{
    adapter::{AdapterOptions, ProviderAdapter},
    base::Provider,
    configs::ProviderConfig,
    transport::TransportClient,
};
use crate::errors::AdapterResult;
use strum_macros::{Display, EnumIter, EnumString};

#[derive(EnumIter, EnumString, Display, Debug, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum ProviderType {
    OpenAi,
    Anthropic,
    Ollama,
    Gemini,
    HuggingFace,
    Grok,
    DeepSeek,
}

impl ProviderConfig {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderConfig::OpenAi(_) => ProviderType::OpenAi,
            ProviderConfig::Anthropic(_) => ProviderType::Anthropic,
            ProviderConfig::Ollama(_) => ProviderType::Ollama,
            ProviderConfig::Gemini(_) => ProviderType::Gemini,
            ProviderConfig::HuggingFace(_) => ProviderType::HuggingFace,
            ProviderConfig::Grok(_) => ProviderType::Grok,
            ProviderConfig::DeepSeek(_) => ProviderType::DeepSeek,
        }
    }
}

/// Build the adapter for a configuration. Adapters built from clones of the
/// same transport share its connection pool.
pub fn get_provider(
    config: ProviderConfig,
    transport: TransportClient,
    options: AdapterOptions,
) -> AdapterResult<Box<dyn Provider>> {
    let adapter = match config {
        ProviderConfig::OpenAi(config) => ProviderAdapter::openai(config, transport, options)?,
        ProviderConfig::Anthropic(config) => {
            ProviderAdapter::anthropic(config, transport, options)?
        }
        ProviderConfig::Ollama(config) => ProviderAdapter::ollama(config, transport, options)?,
        ProviderConfig::Gemini(config) => ProviderAdapter::gemini(config, transport, options)?,
        ProviderConfig::HuggingFace(config) => {
            ProviderAdapter::huggingface(config, transport, options)?
        }
        ProviderConfig::Grok(config) => ProviderAdapter::grok(config, transport, options)?,
        ProviderConfig::DeepSeek(config) => ProviderAdapter::deepseek(config, transport, options)?,
    };
    Ok(Box::new(adapter))
}
