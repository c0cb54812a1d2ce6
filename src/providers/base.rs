use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::stream::DeltaStream;
use super::tools::ToolRegistry;
use crate::errors::AdapterResult;
use crate::models::capabilities::ModelCapabilities;
use crate::models::content::Media;
use crate::models::message::Message;
use crate::models::response::{Response, UsageCounters};
use crate::models::tool::{Tool, ToolCall, ToolOutcome};

/// Per-call settings. Anything left unset falls back to the adapter default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageOptions {
    pub conversation_id: Option<String>,
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub tools: Vec<Tool>,
    #[serde(default)]
    pub stream: bool,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl MessageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conversation<S: Into<String>>(mut self, id: S) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn with_system_prompt<S: Into<String>>(mut self, system_prompt: S) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// What [`Provider::send`] hands back, depending on `MessageOptions::stream`.
#[derive(Debug)]
pub enum Reply {
    Complete(Response),
    Stream(DeltaStream),
}

/// Result of a tool-enabled call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallResponse {
    pub response: Response,
    pub tool_calls: Vec<ToolCall>,
    /// One entry per tool call, in order. Empty unless auto-execution was requested.
    pub outcomes: Vec<ToolOutcome>,
}

/// Base trait for AI providers (OpenAI, Anthropic, etc)
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Send a user turn, returning either the full response or a delta stream.
    async fn send(&self, text: &str, options: MessageOptions) -> AdapterResult<Reply>;

    async fn send_message(&self, text: &str, options: MessageOptions) -> AdapterResult<Response>;

    async fn stream_message(&self, text: &str, options: MessageOptions)
        -> AdapterResult<DeltaStream>;

    async fn send_multimodal_message(
        &self,
        text: &str,
        media: Vec<Media>,
        options: MessageOptions,
    ) -> AdapterResult<Response>;

    async fn call_tools(
        &self,
        text: &str,
        registry: &ToolRegistry,
        options: MessageOptions,
        auto_execute: bool,
    ) -> AdapterResult<ToolCallResponse>;

    async fn generate_embeddings(
        &self,
        inputs: &[String],
        model: Option<&str>,
    ) -> AdapterResult<Vec<Vec<f32>>>;

    fn history(&self, conversation_id: &str) -> Vec<Message>;

    fn clear_conversation(&self, conversation_id: &str) -> bool;

    fn list_conversations(&self) -> Vec<String>;

    fn usage_stats(&self) -> UsageCounters;

    fn model_capabilities(&self, model: Option<&str>) -> ModelCapabilities;

    /// Release resources. Later calls fail with a validation error.
    fn close(&self);
}
