//! OpenAI-compatible Chat Completions provider.
//!
//! Talks to any endpoint that implements `POST {base_url}/chat/completions`
//! with Bearer authentication: OpenAI itself, Groq, OpenRouter and Gemini's
//! OpenAI-compatible surface.
//!
//! One HTTP request per call. Failures are classified into [`LlmError`]
//! variants so the orchestrator can decide whether to retry.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::llms::base_llm::{BaseLLM, BaseLLMState, LLMMessage};
use crate::types::usage_metrics::UsageMetrics;
use crate::utilities::errors::LlmError;
use crate::utilities::string_utils::truncate_chars;

/// Default API base for OpenAI.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Longest provider error body kept in an error message.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// OpenAI-compatible completion client.
#[derive(Debug)]
pub struct OpenAICompletion {
    state: BaseLLMState,
    client: reqwest::Client,
    max_tokens: Option<u32>,
    /// Ask for `response_format: {"type": "json_object"}`.
    json_mode: bool,
}

impl OpenAICompletion {
    /// Create a client for `model` at `provider`, authenticated by `api_key`.
    pub fn new(
        model: impl Into<String>,
        provider: impl Into<String>,
        api_key: impl Into<String>,
        base_url: Option<String>,
    ) -> Result<Self, LlmError> {
        let mut state = BaseLLMState::new(model, provider);
        state.api_key = Some(api_key.into());
        state.base_url = base_url;
        let client = Self::build_client(state.timeout)?;
        Ok(Self {
            state,
            client,
            max_tokens: None,
            json_mode: false,
        })
    }

    fn build_client(timeout: Duration) -> Result<reqwest::Client, LlmError> {
        Ok(reqwest::Client::builder().timeout(timeout).build()?)
    }

    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.state.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.state.stop = stop;
        self
    }

    /// Replace the HTTP timeout (rebuilds the client).
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, LlmError> {
        self.state.timeout = timeout;
        self.client = Self::build_client(timeout)?;
        Ok(self)
    }

    pub fn api_base_url(&self) -> &str {
        self.state
            .base_url
            .as_deref()
            .unwrap_or(OPENAI_BASE_URL)
            .trim_end_matches('/')
    }

    /// Build the Chat Completions request body.
    pub fn build_request_body(&self, messages: &[LLMMessage]) -> Value {
        let mut body = json!({
            "model": self.state.model,
            "messages": messages,
        });
        if let Some(temperature) = self.state.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if !self.state.stop.is_empty() {
            body["stop"] = json!(self.state.stop);
        }
        if self.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }
        body
    }

    /// Extract the assistant text from a Chat Completions response.
    fn parse_completions_response(&self, response: &Value) -> Result<String, LlmError> {
        let invalid = |message: &str| LlmError::InvalidResponse {
            message: message.to_string(),
        };
        let message = response
            .pointer("/choices/0/message")
            .ok_or_else(|| invalid("no choices in response"))?;
        let content = message
            .get("content")
            .and_then(Value::as_str)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| invalid("empty message content"))?;

        let usage = response.get("usage");
        if let Some(usage) = usage {
            log::debug!(
                "{} token usage: prompt={}, completion={}, total={}",
                self.state.provider,
                usage.get("prompt_tokens").and_then(Value::as_i64).unwrap_or(0),
                usage.get("completion_tokens").and_then(Value::as_i64).unwrap_or(0),
                usage.get("total_tokens").and_then(Value::as_i64).unwrap_or(0),
            );
        }
        self.state.track_token_usage(usage);

        Ok(self.state.apply_stop_words(content))
    }
}

/// Map a non-success HTTP status to an error.
pub fn classify_status(status: StatusCode, body: &str) -> LlmError {
    let message = truncate_chars(body.trim(), MAX_ERROR_BODY_CHARS).to_string();
    if status == StatusCode::TOO_MANY_REQUESTS {
        LlmError::RateLimited { message }
    } else if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        LlmError::Timeout
    } else if status.is_server_error() {
        LlmError::Server {
            status: status.as_u16(),
            message,
        }
    } else {
        LlmError::Client {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl BaseLLM for OpenAICompletion {
    fn model(&self) -> &str {
        &self.state.model
    }

    fn provider(&self) -> &str {
        &self.state.provider
    }

    fn temperature(&self) -> Option<f64> {
        self.state.temperature
    }

    async fn acall(&self, messages: &[LLMMessage]) -> Result<String, LlmError> {
        log::debug!(
            "{}.acall: model={}, messages={}",
            self.state.provider,
            self.state.model,
            messages.len(),
        );

        let api_key = self
            .state
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::MissingApiKey {
                provider: self.state.provider.clone(),
                env_var: "OPENAI_API_KEY".to_string(),
            })?;
        let endpoint = format!("{}/chat/completions", self.api_base_url());
        let body = self.build_request_body(messages);

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let err = classify_status(status, &text);
            log::warn!("{} request failed: {}", self.state.provider, err);
            return Err(err);
        }

        let parsed: Value = serde_json::from_str(&text).map_err(|e| LlmError::InvalidResponse {
            message: format!(
                "{e}; body: {}",
                truncate_chars(&text, MAX_ERROR_BODY_CHARS)
            ),
        })?;
        self.parse_completions_response(&parsed)
    }

    fn get_token_usage_summary(&self) -> UsageMetrics {
        self.state.token_usage_summary()
    }
}
