//! Error taxonomy shared across the analysis pipeline.
//!
//! The split mirrors how failures propagate:
//!
//! - [`TransientError`] is retried inside the sub-agent task boundary.
//! - [`AnalysisError`] fails a single task and is recorded, never propagated.
//! - [`JobAbortedError`] is raised when the whole job is cancelled.
//! - [`ValidationFailure`] describes an ungrounded claim; it is handled by the
//!   validator and never surfaces as a job failure.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Retryable failure of a single sub-agent attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransientError {
    /// The provider asked us to slow down (HTTP 429 or equivalent).
    #[error("rate limited by provider: {message}")]
    RateLimited { message: String },

    /// The attempt exceeded the per-task timeout.
    #[error("attempt timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    /// The provider returned a server-side error.
    #[error("provider unavailable: {message}")]
    ProviderUnavailable { message: String },

    /// The request never reached the provider or the connection dropped.
    #[error("transport failure: {message}")]
    Transport { message: String },

    /// The model answered, but the structured output failed strict parsing.
    #[error("malformed model output: {message}")]
    MalformedOutput { message: String },
}

impl TransientError {
    /// Build a timeout error from the elapsed budget.
    pub fn timeout(budget: Duration) -> Self {
        Self::Timeout {
            elapsed_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Build a malformed-output error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedOutput {
            message: message.into(),
        }
    }
}

/// Non-retryable failure tied to the evidence a task was given.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisError {
    /// Neither raw content nor a description is available.
    #[error("evidence {evidence} has no analyzable content")]
    EmptyEvidence { evidence: String },

    /// The evidence exists but cannot be interpreted.
    #[error("evidence {evidence} could not be read: {reason}")]
    UnreadableEvidence { evidence: String, reason: String },
}

/// Raised when a job is cancelled before it could produce any finding.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("job {job_id} aborted: {reason} ({completed} of {total} units analyzed)")]
pub struct JobAbortedError {
    /// Identifier of the aborted job.
    pub job_id: String,
    /// Human-readable cause (e.g. "cancelled by user").
    pub reason: String,
    /// Units that finished before the abort.
    pub completed: usize,
    /// Units the job was asked to analyze.
    pub total: usize,
}

/// Why a claim could not be grounded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// The claim carries no evidence references at all.
    NoEvidence,
    /// None of the references resolve in the evidence store.
    UnresolvedReferences,
    /// A cited quote does not occur in the referenced record.
    QuoteNotFound,
    /// The referenced text does not support enough of the claim.
    InsufficientSupport,
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoEvidence => write!(f, "no evidence references"),
            Self::UnresolvedReferences => write!(f, "evidence references do not resolve"),
            Self::QuoteNotFound => write!(f, "cited quote not found in evidence"),
            Self::InsufficientSupport => write!(f, "evidence does not support the claim"),
        }
    }
}

/// A claim that failed grounding. Internal to validation.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("claim {claim_id} rejected: {reason} (support {support:.2})")]
pub struct ValidationFailure {
    /// The rejected claim.
    pub claim_id: String,
    /// Rejection cause.
    pub reason: RejectionReason,
    /// Fraction of key terms found in the referenced evidence.
    pub support: f64,
}

/// Errors raised at the LLM provider boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    /// No API key was configured for the selected provider.
    #[error("API key for provider '{provider}' not set (expected env var {env_var})")]
    MissingApiKey { provider: String, env_var: String },

    /// The model selector names a provider this crate cannot talk to.
    #[error("unsupported provider '{provider}'")]
    UnsupportedProvider { provider: String },

    /// HTTP 429 or provider-specific throttling.
    #[error("rate limited: {message}")]
    RateLimited { message: String },

    /// The HTTP client gave up waiting for the provider.
    #[error("request timed out")]
    Timeout,

    /// 5xx from the provider.
    #[error("provider server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// 4xx other than 429. Retrying will not help.
    #[error("provider rejected request ({status}): {message}")]
    Client { status: u16, message: String },

    /// Connection-level failure.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The provider answered with a body we could not interpret.
    #[error("invalid provider response: {message}")]
    InvalidResponse { message: String },
}

impl LlmError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::Timeout
                | Self::Server { .. }
                | Self::Transport { .. }
                | Self::InvalidResponse { .. }
        )
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::InvalidResponse {
                message: err.to_string(),
            }
        } else {
            Self::Transport {
                message: err.to_string(),
            }
        }
    }
}

/// Failure of one sub-agent attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubAgentError {
    /// Retry within the task boundary.
    #[error(transparent)]
    Transient(#[from] TransientError),

    /// Fail the task; do not retry.
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    /// Provider misconfiguration (missing key, rejected request). Not retried.
    #[error("fatal provider error: {message}")]
    Fatal { message: String },
}

impl SubAgentError {
    /// Whether the orchestrator may schedule another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<LlmError> for SubAgentError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::RateLimited { message } => TransientError::RateLimited { message }.into(),
            LlmError::Timeout => TransientError::Timeout { elapsed_ms: 0 }.into(),
            LlmError::Server { status, message } => TransientError::ProviderUnavailable {
                message: format!("{status}: {message}"),
            }
            .into(),
            LlmError::Transport { message } => TransientError::Transport { message }.into(),
            LlmError::InvalidResponse { message } => TransientError::MalformedOutput { message }.into(),
            other => Self::Fatal {
                message: other.to_string(),
            },
        }
    }
}

/// Failure of the optional narration step. Tolerated by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NarrationError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// The narrator's output did not match its contract.
    #[error("malformed narration: {message}")]
    Malformed { message: String },
}

/// Errors raised while ingesting evidence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvidenceError {
    /// Two records share the same `(subject_id, kind)` identity.
    #[error("duplicate evidence record: {id}")]
    DuplicateRecord { id: String },

    /// The upstream payload does not have the expected shape.
    #[error("invalid evidence payload: {message}")]
    InvalidPayload { message: String },

    /// An evidence identifier string could not be parsed.
    #[error("invalid evidence id '{value}': expected '<kind>:<subject>'")]
    InvalidId { value: String },
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {message}")]
    Io { path: String, message: String },

    /// The config file is not valid YAML for the expected shape.
    #[error("failed to parse config: {message}")]
    Parse { message: String },

    /// An environment override could not be interpreted.
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    /// A setting is outside its allowed range.
    #[error("invalid configuration: {message}")]
    OutOfRange { message: String },
}

impl ConfigError {
    pub fn out_of_range(message: impl Into<String>) -> Self {
        Self::OutOfRange {
            message: message.into(),
        }
    }
}

/// Errors that end a profile run without a persona.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// No repository produced a finding and there is no profile to describe.
    #[error("no findings among {total} evidence unit(s); failed: {failed:?}")]
    NoFindings { total: usize, failed: Vec<String> },

    #[error(transparent)]
    Aborted(#[from] JobAbortedError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
