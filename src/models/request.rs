use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::message::Message;
use super::tool::Tool;
use crate::errors::{AdapterError, AdapterResult};
use crate::providers::utils::is_valid_function_name;

/// The provider-neutral envelope every codec maps to its wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stream: bool,
    #[serde(default)]
    pub tools: Vec<Tool>,
    pub system_prompt: Option<String>,
}

impl GenerationRequest {
    pub fn new<S: Into<String>>(model: S, messages: Vec<Message>) -> Self {
        GenerationRequest {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            stream: false,
            tools: Vec::new(),
            system_prompt: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_system_prompt<S: Into<String>>(mut self, system_prompt: S) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Rejects requests that must never reach the network.
    pub fn validate(&self) -> AdapterResult<()> {
        if self.model.trim().is_empty() {
            return Err(AdapterError::Validation("Model is required".to_string()));
        }
        if self.messages.is_empty() {
            return Err(AdapterError::Validation(
                "At least one message is required".to_string(),
            ));
        }
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(AdapterError::Validation(format!(
                    "Temperature must be between 0 and 2, got {}",
                    temperature
                )));
            }
        }
        if self.max_tokens == Some(0) {
            return Err(AdapterError::Validation(
                "max_tokens must be greater than zero".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for tool in &self.tools {
            if !is_valid_function_name(&tool.name) {
                return Err(AdapterError::Validation(format!(
                    "Tool name '{}' must match [a-zA-Z0-9_-]+",
                    tool.name
                )));
            }
            if !names.insert(tool.name.as_str()) {
                return Err(AdapterError::Validation(format!(
                    "Duplicate tool name: {}",
                    tool.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> GenerationRequest {
        GenerationRequest::new("gpt-4o", vec![Message::user().with_text("hi")])
    }

    #[test]
    fn test_valid_request() {
        assert!(request().with_temperature(0.7).validate().is_ok());
    }

    #[test]
    fn test_missing_model() {
        let mut req = request();
        req.model = "  ".to_string();
        assert!(matches!(req.validate(), Err(AdapterError::Validation(_))));
    }

    #[test]
    fn test_temperature_range() {
        assert!(request().with_temperature(2.5).validate().is_err());
        assert!(request().with_temperature(f32::NAN).validate().is_err());
        assert!(request().with_temperature(0.0).validate().is_ok());
    }

    #[test]
    fn test_tool_names() {
        let tool = Tool::new("lookup", "Look something up", json!({"type": "object"}));
        let req = request().with_tools(vec![tool.clone(), tool]);
        assert!(matches!(req.validate(), Err(AdapterError::Validation(_))));

        let bad = Tool::new("look up", "", json!({}));
        assert!(request().with_tools(vec![bad]).validate().is_err());
    }
}
