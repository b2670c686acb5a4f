//! Token and request accounting across a profile job.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Cumulative usage of one or more LLM clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetrics {
    /// Total number of tokens used.
    pub total_tokens: i64,
    /// Number of tokens used in prompts.
    pub prompt_tokens: i64,
    /// Number of cached prompt tokens used.
    pub cached_prompt_tokens: i64,
    /// Number of tokens used in completions.
    pub completion_tokens: i64,
    /// Number of successful requests made.
    pub successful_requests: i64,
}

impl UsageMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold another set of counters into this one.
    pub fn add_usage_metrics(&mut self, other: &UsageMetrics) {
        self.total_tokens += other.total_tokens;
        self.prompt_tokens += other.prompt_tokens;
        self.cached_prompt_tokens += other.cached_prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.successful_requests += other.successful_requests;
    }

    /// Counters accumulated since `earlier` was taken from the same client.
    pub fn delta_since(&self, earlier: &UsageMetrics) -> UsageMetrics {
        UsageMetrics {
            total_tokens: (self.total_tokens - earlier.total_tokens).max(0),
            prompt_tokens: (self.prompt_tokens - earlier.prompt_tokens).max(0),
            cached_prompt_tokens: (self.cached_prompt_tokens - earlier.cached_prompt_tokens).max(0),
            completion_tokens: (self.completion_tokens - earlier.completion_tokens).max(0),
            successful_requests: (self.successful_requests - earlier.successful_requests).max(0),
        }
    }

    /// Record one successful request from a provider `usage` object.
    ///
    /// Understands OpenAI (`prompt_tokens`), Anthropic (`input_tokens`) and
    /// Gemini (`prompt_token_count`) field names.
    pub fn record_response(&mut self, usage: Option<&Value>) {
        self.successful_requests += 1;
        let Some(usage) = usage else {
            return;
        };
        let field = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| usage.get(*name).and_then(Value::as_i64))
                .unwrap_or(0)
        };

        let prompt = field(&["prompt_tokens", "input_tokens", "prompt_token_count"]);
        let completion = field(&["completion_tokens", "output_tokens", "candidates_token_count"]);
        let cached = usage
            .get("prompt_tokens_details")
            .and_then(|d| d.get("cached_tokens"))
            .and_then(Value::as_i64)
            .unwrap_or_else(|| field(&["cache_read_input_tokens", "cached_content_token_count"]));
        let total = match field(&["total_tokens", "total_token_count"]) {
            0 => prompt + completion,
            n => n,
        };

        self.prompt_tokens += prompt;
        self.completion_tokens += completion;
        self.cached_prompt_tokens += cached;
        self.total_tokens += total;
    }
}
