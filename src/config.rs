use std::time::Duration;

use config::{Config, Environment};
use serde::Deserialize;
use thiserror::Error;

use crate::providers::{
    adapter::AdapterOptions,
    anthropic,
    configs::{
        AnthropicProviderConfig, DeepSeekProviderConfig, GeminiProviderConfig,
        GrokProviderConfig, HuggingFaceProviderConfig, OllamaProviderConfig,
        OpenAiProviderConfig, ProviderConfig,
    },
    deepseek,
    factory::ProviderType,
    gemini, grok, huggingface, ollama, openai,
    retry::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY},
    transport::DEFAULT_TIMEOUT,
};

const ENV_PREFIX: &str = "INTERLINQ";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {env_var}")]
    MissingEnvVar { env_var: String },
    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Environment variable that feeds a settings field, e.g. `provider.api_key`
/// becomes `INTERLINQ_PROVIDER__API_KEY`. Bare names are provider fields.
pub fn to_env_var(field: &str) -> String {
    let path = match field {
        "provider" => "provider.type".to_string(),
        field if field.contains('.') => field.to_string(),
        field => format!("provider.{}", field),
    };
    format!("{}_{}", ENV_PREFIX, path.replace('.', "__").to_uppercase())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        api_key: String,
        #[serde(default)]
        organization: Option<String>,
        #[serde(default = "default_openai_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<u32>,
    },
    Anthropic {
        #[serde(default = "default_anthropic_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_anthropic_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<u32>,
    },
    Ollama {
        #[serde(default = "default_ollama_host")]
        host: String,
        #[serde(default = "default_ollama_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<u32>,
    },
    Gemini {
        #[serde(default = "default_gemini_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_gemini_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<u32>,
    },
    HuggingFace {
        #[serde(default = "default_huggingface_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_huggingface_model")]
        model: String,
        #[serde(default = "default_huggingface_embedding_model")]
        embedding_model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<u32>,
    },
    Grok {
        #[serde(default = "default_grok_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_grok_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<u32>,
    },
    DeepSeek {
        #[serde(default = "default_deepseek_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_deepseek_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<u32>,
    },
}

impl ProviderSettings {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderSettings::OpenAi { .. } => ProviderType::OpenAi,
            ProviderSettings::Anthropic { .. } => ProviderType::Anthropic,
            ProviderSettings::Ollama { .. } => ProviderType::Ollama,
            ProviderSettings::Gemini { .. } => ProviderType::Gemini,
            ProviderSettings::HuggingFace { .. } => ProviderType::HuggingFace,
            ProviderSettings::Grok { .. } => ProviderType::Grok,
            ProviderSettings::DeepSeek { .. } => ProviderType::DeepSeek,
        }
    }

    pub fn into_config(self) -> ProviderConfig {
        match self {
            ProviderSettings::OpenAi {
                host,
                api_key,
                organization,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::OpenAi(OpenAiProviderConfig {
                host,
                api_key,
                organization,
                model,
                temperature,
                max_tokens,
            }),
            ProviderSettings::Anthropic {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::Anthropic(AnthropicProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            }),
            ProviderSettings::Ollama {
                host,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::Ollama(OllamaProviderConfig {
                host,
                model,
                temperature,
                max_tokens,
            }),
            ProviderSettings::Gemini {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::Gemini(GeminiProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            }),
            ProviderSettings::HuggingFace {
                host,
                api_key,
                model,
                embedding_model,
                temperature,
                max_tokens,
            } => ProviderConfig::HuggingFace(HuggingFaceProviderConfig {
                host,
                api_key,
                model,
                embedding_model,
                temperature,
                max_tokens,
            }),
            ProviderSettings::Grok {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::Grok(GrokProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            }),
            ProviderSettings::DeepSeek {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::DeepSeek(DeepSeekProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AdapterSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub history_cap: Option<usize>,
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            history_cap: None,
            retry_max_attempts: default_retry_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl AdapterSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn options(&self) -> AdapterOptions {
        let options = AdapterOptions::new()
            .with_timeout(self.timeout())
            .with_max_attempts(self.retry_max_attempts)
            .with_retry_delay(Duration::from_millis(self.retry_delay_ms));
        match self.history_cap {
            Some(cap) => options.with_history_cap(cap),
            None => options,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub adapter: AdapterSettings,
    pub provider: ProviderSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        match config.try_deserialize::<Self>() {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                // serde reports "missing field `api_key`"
                let message = err.to_string();
                if message.starts_with("missing field") {
                    let field = message.split('`').nth(1).unwrap_or_default();
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_retry_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY.as_millis() as u64
}

fn default_openai_host() -> String {
    openai::OPENAI_HOST.to_string()
}

fn default_openai_model() -> String {
    openai::OPENAI_MODEL.to_string()
}

fn default_anthropic_host() -> String {
    anthropic::ANTHROPIC_HOST.to_string()
}

fn default_anthropic_model() -> String {
    anthropic::ANTHROPIC_MODEL.to_string()
}

fn default_ollama_host() -> String {
    ollama::OLLAMA_HOST.to_string()
}

fn default_ollama_model() -> String {
    ollama::OLLAMA_MODEL.to_string()
}

fn default_gemini_host() -> String {
    gemini::GEMINI_HOST.to_string()
}

fn default_gemini_model() -> String {
    gemini::GEMINI_MODEL.to_string()
}

fn default_huggingface_host() -> String {
    huggingface::HUGGINGFACE_HOST.to_string()
}

fn default_huggingface_model() -> String {
    huggingface::HUGGINGFACE_MODEL.to_string()
}

fn default_huggingface_embedding_model() -> String {
    huggingface::HUGGINGFACE_EMBEDDING_MODEL.to_string()
}

fn default_grok_host() -> String {
    grok::GROK_HOST.to_string()
}

fn default_grok_model() -> String {
    grok::GROK_MODEL.to_string()
}

fn default_deepseek_host() -> String {
    deepseek::DEEPSEEK_HOST.to_string()
}

fn default_deepseek_model() -> String {
    deepseek::DEEPSEEK_MODEL.to_string()
}
