use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;

use super::base::{MessageOptions, Provider, Reply, ToolCallResponse};
use super::codec::{Codec, Frame, WireCodec};
use super::conversation::ConversationStore;
use super::retry::RetryPolicy;
use super::stream::{DeltaStream, StreamStatus};
use super::tools::ToolRegistry;
use super::transport::{Auth, HttpRequest, TransportClient};
use super::usage::UsageAccumulator;
use super::utils::create_object_id;
use crate::errors::{AdapterError, AdapterResult};
use crate::models::capabilities::{CapabilityTable, ModelCapabilities};
use crate::models::content::Media;
use crate::models::message::Message;
use crate::models::request::GenerationRequest;
use crate::models::response::{Delta, Response, StreamOutcome, TokenUsage, UsageCounters};

/// Provider-specific pieces an adapter is assembled from.
#[derive(Debug)]
pub struct AdapterParts {
    pub name: &'static str,
    pub base_url: String,
    pub auth: Auth,
    pub headers: Vec<(String, String)>,
    pub model: String,
    pub embedding_model: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub history_cap: usize,
    pub codec: WireCodec,
    pub capabilities: &'static CapabilityTable,
    pub retry: RetryPolicy,
}

/// Caller overrides applied on top of the provider defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdapterOptions {
    pub timeout: Option<Duration>,
    pub history_cap: Option<usize>,
    pub max_attempts: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub retry_jitter: Option<f64>,
    pub retry_on_timeout: Option<bool>,
}

impl AdapterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_history_cap(mut self, cap: usize) -> Self {
        self.history_cap = Some(cap);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub fn with_retry_jitter(mut self, jitter: f64) -> Self {
        self.retry_jitter = Some(jitter);
        self
    }

    pub fn with_retry_on_timeout(mut self, retry_on_timeout: bool) -> Self {
        self.retry_on_timeout = Some(retry_on_timeout);
        self
    }

    fn apply(&self, mut policy: RetryPolicy) -> RetryPolicy {
        if let Some(max_attempts) = self.max_attempts {
            policy = policy.with_max_attempts(max_attempts);
        }
        if let Some(delay) = self.retry_delay {
            policy = policy.with_delay(delay);
        }
        if let Some(jitter) = self.retry_jitter {
            policy = policy.with_jitter(jitter);
        }
        if let Some(retry_on_timeout) = self.retry_on_timeout {
            policy = policy.with_retry_on_timeout(retry_on_timeout);
        }
        policy
    }
}

/// One provider behind the generic [`Provider`] contract.
///
/// Reads history, encodes with its codec, sends through the shared
/// transport under its retry policy, decodes, and only then appends the
/// turn and updates usage. Failed or aborted calls leave history untouched.
pub struct ProviderAdapter {
    name: &'static str,
    base_url: String,
    auth: Auth,
    headers: Vec<(String, String)>,
    model: String,
    embedding_model: Option<String>,
    temperature: f32,
    max_tokens: Option<u32>,
    timeout: Option<Duration>,
    codec: Arc<WireCodec>,
    transport: TransportClient,
    conversations: Arc<ConversationStore>,
    usage: Arc<UsageAccumulator>,
    retry: RetryPolicy,
    capabilities: &'static CapabilityTable,
    closed: AtomicBool,
}

impl ProviderAdapter {
    pub fn from_parts(parts: AdapterParts, transport: TransportClient, options: AdapterOptions) -> Self {
        let history_cap = options.history_cap.unwrap_or(parts.history_cap);
        Self {
            name: parts.name,
            base_url: parts.base_url.trim_end_matches('/').to_string(),
            auth: parts.auth,
            headers: parts.headers,
            model: parts.model,
            embedding_model: parts.embedding_model,
            temperature: parts.temperature,
            max_tokens: parts.max_tokens,
            timeout: options.timeout,
            codec: Arc::new(parts.codec),
            transport,
            conversations: Arc::new(ConversationStore::new(history_cap)),
            usage: Arc::new(UsageAccumulator::new()),
            retry: options.apply(parts.retry),
            capabilities: parts.capabilities,
            closed: AtomicBool::new(false),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn codec(&self) -> &WireCodec {
        &self.codec
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn history_cap(&self) -> usize {
        self.conversations.cap()
    }

    fn ensure_open(&self) -> AdapterResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AdapterError::Validation(format!(
                "The {} adapter has been closed",
                self.name
            )));
        }
        Ok(())
    }

    fn fail(&self, error: AdapterError) -> AdapterError {
        self.usage.record_error();
        error
    }

    fn http_request(&self, url: String, body: Value) -> HttpRequest {
        let request = HttpRequest::post(url, body)
            .with_auth(self.auth.clone())
            .with_headers(&self.headers);
        match self.timeout {
            Some(timeout) => request.with_timeout(timeout),
            None => request,
        }
    }

    fn build_request(
        &self,
        user: &Message,
        options: &MessageOptions,
        stream: bool,
    ) -> AdapterResult<GenerationRequest> {
        let mut messages = options
            .conversation_id
            .as_deref()
            .map(|id| self.conversations.history(id))
            .unwrap_or_default();
        messages.push(user.clone());

        let request = GenerationRequest {
            model: options.model.clone().unwrap_or_else(|| self.model.clone()),
            messages,
            temperature: Some(options.temperature.unwrap_or(self.temperature)),
            max_tokens: options.max_tokens.or(self.max_tokens),
            stream,
            tools: options.tools.clone(),
            system_prompt: options.system_prompt.clone(),
        };
        request.validate()?;

        let media = user.media();
        for item in &media {
            self.codec.validate_media(item)?;
        }
        let capabilities = self.capabilities.get(&request.model);
        if !media.is_empty() && !capabilities.supports_vision {
            return Err(AdapterError::Unsupported(format!(
                "Model {} does not accept media",
                request.model
            )));
        }
        if !request.tools.is_empty() && !capabilities.supports_tools {
            return Err(AdapterError::Unsupported(format!(
                "Model {} does not support tool calling",
                request.model
            )));
        }
        if stream && !capabilities.supports_streaming {
            return Err(AdapterError::Unsupported(format!(
                "Model {} does not support streaming",
                request.model
            )));
        }
        Ok(request)
    }

    /// One non-streaming round trip. Does not touch history.
    async fn exchange(&self, user: &Message, options: &MessageOptions) -> AdapterResult<Response> {
        self.ensure_open()?;
        let request = self
            .build_request(user, options, false)
            .map_err(|e| self.fail(e))?;
        let body = self.codec.encode(&request).map_err(|e| self.fail(e))?;
        let http = self.http_request(
            self.codec.chat_url(&self.base_url, &request.model, false),
            body,
        );

        tracing::debug!(provider = self.name, model = %request.model, "sending message");
        self.usage.record_request();
        let outcome = self
            .retry
            .execute(|_| self.transport.execute(http.clone()))
            .await;
        let body = outcome.result.map_err(|e| self.fail(e))?;

        let response = self
            .codec
            .decode_final(&body, &request.model)
            .map_err(|e| self.fail(e))?;
        self.usage
            .record_tokens(response.usage.tokens_in, response.usage.tokens_out);
        tracing::debug!(
            provider = self.name,
            attempts = outcome.attempts,
            tokens_in = response.usage.tokens_in,
            tokens_out = response.usage.tokens_out,
            "message complete"
        );
        Ok(response)
    }

    fn remember(&self, options: &MessageOptions, messages: Vec<Message>) {
        if let Some(id) = &options.conversation_id {
            self.conversations.append_all(id, messages);
        }
    }

    async fn complete(&self, user: Message, options: &MessageOptions) -> AdapterResult<Response> {
        let response = self.exchange(&user, options).await?;
        let assistant = Message::assistant()
            .with_text(response.content.clone())
            .with_tool_calls(response.tool_calls.clone());
        self.remember(options, vec![user, assistant]);
        Ok(response)
    }

    async fn open_stream(&self, user: Message, options: &MessageOptions) -> AdapterResult<DeltaStream> {
        self.ensure_open()?;
        let request = self
            .build_request(&user, options, true)
            .map_err(|e| self.fail(e))?;
        let body = self.codec.encode(&request).map_err(|e| self.fail(e))?;
        let http = self.http_request(
            self.codec.chat_url(&self.base_url, &request.model, true),
            body,
        );

        tracing::debug!(provider = self.name, model = %request.model, "opening stream");
        self.usage.record_request();
        let outcome = self
            .retry
            .execute(|_| self.transport.execute_stream(http.clone()))
            .await;
        let lines = outcome.result.map_err(|e| self.fail(e))?;

        let status = StreamStatus::new();
        let producer = status.clone();
        let codec = self.codec.clone();
        let conversations = self.conversations.clone();
        let usage = self.usage.clone();
        let conversation_id = options.conversation_id.clone();
        let provider = self.name;
        let model = request.model;

        let deltas = stream! {
            let mut lines = lines;
            let mut cumulative = String::new();
            let mut finish_reason: Option<String> = None;
            let mut tokens: Option<TokenUsage> = None;
            let mut completed = false;
            let mut last: Option<Delta> = None;

            while let Some(line) = lines.next().await {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        usage.record_error();
                        producer.end(StreamOutcome::Failed, &cumulative);
                        yield Err(e);
                        return;
                    }
                };

                let chunk = match codec.decode_chunk(&line) {
                    Frame::Skip => continue,
                    Frame::Malformed(reason) => {
                        tracing::warn!(provider, "skipping malformed stream frame: {}", reason);
                        continue;
                    }
                    Frame::Error(e) => {
                        tracing::error!(provider, "provider reported an error mid-stream: {}", e);
                        usage.record_error();
                        producer.end(StreamOutcome::Failed, &cumulative);
                        yield Err(e);
                        return;
                    }
                    Frame::Done => {
                        completed = true;
                        break;
                    }
                    Frame::Chunk(chunk) => chunk,
                };

                if let Some(reported) = chunk.usage {
                    tokens.get_or_insert_with(TokenUsage::default).merge(reported);
                }
                if chunk.finish_reason.is_some() {
                    finish_reason = chunk.finish_reason.clone();
                }
                cumulative.push_str(&chunk.text);

                let delta = Delta {
                    text: chunk.text,
                    cumulative_text: cumulative.clone(),
                    finish_reason: chunk.finish_reason,
                    usage_so_far: tokens.map(|t| t.as_counters()),
                };
                let visible = !delta.text.is_empty() || delta.finish_reason.is_some();

                if chunk.terminal {
                    completed = true;
                    last = visible.then_some(delta);
                    break;
                }
                if visible {
                    yield Ok(delta);
                }
            }

            if !completed {
                tracing::warn!(provider, "stream ended without a completion signal");
                usage.record_error();
                producer.end(StreamOutcome::Incomplete, &cumulative);
                return;
            }

            let tokens = tokens.unwrap_or_default();
            usage.record_tokens(tokens.input_tokens, tokens.output_tokens);
            if let Some(id) = &conversation_id {
                conversations.append_all(
                    id,
                    vec![user, Message::assistant().with_text(cumulative.clone())],
                );
            }
            producer.complete(Response {
                id: create_object_id("resp"),
                model,
                content: cumulative,
                finish_reason,
                usage: tokens.as_counters(),
                tool_calls: Vec::new(),
            });

            if let Some(delta) = last {
                yield Ok(delta);
            }
        };

        Ok(DeltaStream::new(Box::pin(deltas), status))
    }
}

#[async_trait]
impl Provider for ProviderAdapter {
    fn name(&self) -> &str {
        self.name
    }

    async fn send(&self, text: &str, options: MessageOptions) -> AdapterResult<Reply> {
        if options.stream {
            Ok(Reply::Stream(self.stream_message(text, options).await?))
        } else {
            Ok(Reply::Complete(self.send_message(text, options).await?))
        }
    }

    async fn send_message(&self, text: &str, options: MessageOptions) -> AdapterResult<Response> {
        self.complete(Message::user().with_text(text), &options).await
    }

    async fn stream_message(
        &self,
        text: &str,
        options: MessageOptions,
    ) -> AdapterResult<DeltaStream> {
        self.open_stream(Message::user().with_text(text), &options)
            .await
    }

    async fn send_multimodal_message(
        &self,
        text: &str,
        media: Vec<Media>,
        options: MessageOptions,
    ) -> AdapterResult<Response> {
        if media.is_empty() {
            return Err(self.fail(AdapterError::Validation(
                "At least one media item is required".to_string(),
            )));
        }
        let user = media
            .into_iter()
            .fold(Message::user().with_text(text), Message::with_media);
        self.complete(user, &options).await
    }

    async fn call_tools(
        &self,
        text: &str,
        registry: &ToolRegistry,
        mut options: MessageOptions,
        auto_execute: bool,
    ) -> AdapterResult<ToolCallResponse> {
        options.tools = registry.tools().to_vec();
        let user = Message::user().with_text(text);
        let response = self.exchange(&user, &options).await?;
        let tool_calls = response.tool_calls.clone();

        let outcomes = if auto_execute && !tool_calls.is_empty() {
            registry.dispatch(&tool_calls).await
        } else {
            Vec::new()
        };

        let mut turn = vec![
            user,
            Message::assistant()
                .with_text(response.content.clone())
                .with_tool_calls(tool_calls.clone()),
        ];
        turn.extend(outcomes.iter().map(|outcome| {
            Message::tool(outcome.call.id.clone())
                .with_name(outcome.call.name.clone())
                .with_text(outcome.output_text())
        }));
        self.remember(&options, turn);

        Ok(ToolCallResponse {
            response,
            tool_calls,
            outcomes,
        })
    }

    async fn generate_embeddings(
        &self,
        inputs: &[String],
        model: Option<&str>,
    ) -> AdapterResult<Vec<Vec<f32>>> {
        self.ensure_open()?;
        if inputs.is_empty() {
            return Err(self.fail(AdapterError::Validation(
                "At least one input is required".to_string(),
            )));
        }
        let model = model
            .map(String::from)
            .or_else(|| self.embedding_model.clone())
            .ok_or_else(|| {
                AdapterError::Unsupported(format!("{} does not provide embeddings", self.name))
            })?;

        let url = self.codec.embeddings_url(&self.base_url, &model)?;
        let body = self.codec.encode_embeddings(inputs, &model)?;
        let http = self.http_request(url, body);

        self.usage.record_request();
        let outcome = self
            .retry
            .execute(|_| self.transport.execute(http.clone()))
            .await;
        let body = outcome.result.map_err(|e| self.fail(e))?;
        self.codec.decode_embeddings(&body).map_err(|e| self.fail(e))
    }

    fn history(&self, conversation_id: &str) -> Vec<Message> {
        self.conversations.history(conversation_id)
    }

    fn clear_conversation(&self, conversation_id: &str) -> bool {
        self.conversations.clear(conversation_id)
    }

    fn list_conversations(&self) -> Vec<String> {
        self.conversations.list()
    }

    fn usage_stats(&self) -> UsageCounters {
        self.usage.snapshot()
    }

    fn model_capabilities(&self, model: Option<&str>) -> ModelCapabilities {
        self.capabilities.get(model.unwrap_or(&self.model))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(provider = self.name, "adapter closed");
        }
    }
}

impl std::fmt::Debug for ProviderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderAdapter")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("auth", &self.auth)
            .field("model", &self.model)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}
