use serde::{Deserialize, Serialize};

use super::{anthropic, deepseek, gemini, grok, huggingface, ollama, openai};

// Unified enum to wrap different provider configurations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProviderConfig {
    OpenAi(OpenAiProviderConfig),
    Anthropic(AnthropicProviderConfig),
    Ollama(OllamaProviderConfig),
    Gemini(GeminiProviderConfig),
    HuggingFace(HuggingFaceProviderConfig),
    Grok(GrokProviderConfig),
    DeepSeek(DeepSeekProviderConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiProviderConfig {
    pub host: String,
    pub api_key: String,
    pub organization: Option<String>,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl OpenAiProviderConfig {
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self {
            host: openai::OPENAI_HOST.to_string(),
            api_key: api_key.into(),
            organization: None,
            model: openai::OPENAI_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl AnthropicProviderConfig {
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self {
            host: anthropic::ANTHROPIC_HOST.to_string(),
            api_key: api_key.into(),
            model: anthropic::ANTHROPIC_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OllamaProviderConfig {
    pub host: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for OllamaProviderConfig {
    fn default() -> Self {
        Self {
            host: ollama::OLLAMA_HOST.to_string(),
            model: ollama::OLLAMA_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl GeminiProviderConfig {
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self {
            host: gemini::GEMINI_HOST.to_string(),
            api_key: api_key.into(),
            model: gemini::GEMINI_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HuggingFaceProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub embedding_model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl HuggingFaceProviderConfig {
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self {
            host: huggingface::HUGGINGFACE_HOST.to_string(),
            api_key: api_key.into(),
            model: huggingface::HUGGINGFACE_MODEL.to_string(),
            embedding_model: huggingface::HUGGINGFACE_EMBEDDING_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrokProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl GrokProviderConfig {
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self {
            host: grok::GROK_HOST.to_string(),
            api_key: api_key.into(),
            model: grok::GROK_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeepSeekProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl DeepSeekProviderConfig {
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self {
            host: deepseek::DEEPSEEK_HOST.to_string(),
            api_key: api_key.into(),
            model: deepseek::DEEPSEEK_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
        }
    }
}
