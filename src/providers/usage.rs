use std::sync::Mutex;

use crate::models::response::UsageCounters;

/// Thread-safe request, token and error counters for one adapter.
#[derive(Debug, Default)]
pub struct UsageAccumulator {
    counters: Mutex<UsageCounters>,
}

impl UsageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, requests: u64, tokens_in: u64, tokens_out: u64, errors: u64) {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        counters.requests += requests;
        counters.tokens_in += tokens_in;
        counters.tokens_out += tokens_out;
        counters.errors += errors;
    }

    pub fn record_request(&self) {
        self.record(1, 0, 0, 0);
    }

    pub fn record_tokens(&self, tokens_in: u64, tokens_out: u64) {
        self.record(0, tokens_in, tokens_out, 0);
    }

    pub fn record_error(&self) {
        self.record(0, 0, 0, 1);
    }

    /// A consistent point-in-time copy.
    pub fn snapshot(&self) -> UsageCounters {
        *self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }
}
