use serde::{Deserialize, Serialize};

use super::tool::ToolCall;

/// Monotonic per-adapter counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounters {
    pub requests: u64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub errors: u64,
}

/// Token counts reported by a provider for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        TokenUsage {
            input_tokens,
            output_tokens,
        }
    }

    /// Providers report counts across several frames; keep the largest seen.
    pub fn merge(&mut self, other: TokenUsage) {
        self.input_tokens = self.input_tokens.max(other.input_tokens);
        self.output_tokens = self.output_tokens.max(other.output_tokens);
    }

    pub fn as_counters(&self) -> UsageCounters {
        UsageCounters {
            requests: 1,
            tokens_in: self.input_tokens,
            tokens_out: self.output_tokens,
            errors: 0,
        }
    }
}

/// One incremental unit of a streamed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub text: String,
    pub cumulative_text: String,
    pub finish_reason: Option<String>,
    pub usage_so_far: Option<UsageCounters>,
}

/// Terminal result of a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub model: String,
    pub content: String,
    pub finish_reason: Option<String>,
    pub usage: UsageCounters,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamOutcome {
    /// Still being consumed.
    Pending,
    /// The provider's completion signal was observed.
    Completed,
    /// The body ended without a completion signal.
    Incomplete,
    /// The consumer closed or dropped the stream early.
    Cancelled,
    /// A transport error or a provider error frame ended the stream.
    Failed,
}
