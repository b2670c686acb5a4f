//! Provider-agnostic LLM interface.
//!
//! The pipeline treats every model call as an opaque
//! `(messages) -> text | LlmError` function. Providers implement [`BaseLLM`]
//! and usually embed a [`BaseLLMState`] for the shared bookkeeping (stop
//! words, token usage, JSON extraction).

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::usage_metrics::UsageMetrics;
use crate::utilities::errors::LlmError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default HTTP timeout for a single provider request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

static JSON_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LLMMessage {
    pub role: MessageRole,
    pub content: String,
}

impl LLMMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// BaseLLM trait
// ---------------------------------------------------------------------------

/// A chat-completion backend.
///
/// Implementations make exactly one request per call. Retrying is the
/// orchestrator's job, so a transient failure must be returned, not hidden.
#[async_trait]
pub trait BaseLLM: Send + Sync + fmt::Debug {
    /// Model identifier sent to the provider.
    fn model(&self) -> &str;

    /// Provider name (e.g. "openai", "groq").
    fn provider(&self) -> &str {
        "openai"
    }

    fn temperature(&self) -> Option<f64> {
        None
    }

    /// Send the conversation and return the assistant's text.
    async fn acall(&self, messages: &[LLMMessage]) -> Result<String, LlmError>;

    /// Cumulative token usage of this client.
    fn get_token_usage_summary(&self) -> UsageMetrics;
}

// ---------------------------------------------------------------------------
// BaseLLMState - shared state for LLM implementations
// ---------------------------------------------------------------------------

/// Common fields and helpers embedded by concrete providers.
#[derive(Debug)]
pub struct BaseLLMState {
    pub model: String,
    pub provider: String,
    pub temperature: Option<f64>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    /// Sequences after which the response is cut.
    pub stop: Vec<String>,
    pub timeout: Duration,
    token_usage: Mutex<UsageMetrics>,
}

impl BaseLLMState {
    pub fn new(model: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            provider: provider.into(),
            temperature: None,
            api_key: None,
            base_url: None,
            stop: Vec::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            token_usage: Mutex::new(UsageMetrics::default()),
        }
    }

    /// Truncate `content` at the earliest configured stop sequence.
    pub fn apply_stop_words(&self, content: &str) -> String {
        let earliest = self
            .stop
            .iter()
            .filter(|w| !w.is_empty())
            .filter_map(|w| content.find(w.as_str()).map(|pos| (pos, w)))
            .min_by_key(|(pos, _)| *pos);

        match earliest {
            Some((pos, word)) => {
                log::debug!("Applied stop word '{}' at position {}", word, pos);
                content[..pos].trim().to_string()
            }
            None => content.to_string(),
        }
    }

    /// Record one successful response and its `usage` object.
    pub fn track_token_usage(&self, usage: Option<&Value>) {
        self.token_usage.lock().record_response(usage);
    }

    pub fn token_usage_summary(&self) -> UsageMetrics {
        self.token_usage.lock().clone()
    }

    /// Split "provider/model" into its provider, defaulting to "openai".
    pub fn extract_provider(model: &str) -> &str {
        model.split_once('/').map(|(p, _)| p).unwrap_or("openai")
    }

    /// Parse a JSON value out of a model response.
    ///
    /// Accepts bare JSON, fenced JSON, or JSON embedded in prose (the outermost
    /// `{...}` span).
    pub fn extract_json(response: &str) -> Option<Value> {
        let trimmed = crate::utilities::string_utils::strip_code_fence(response);
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return Some(value);
        }
        JSON_OBJECT
            .find(response)
            .and_then(|m| serde_json::from_str::<Value>(m.as_str()).ok())
    }
}
