//! Execution policy for a profile job: concurrency, timeouts, retries and
//! the failure tolerance that separates a complete result from a degraded one.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::utilities::errors::ConfigError;

/// Hard upper bound on parallel sub-agent attempts.
pub const MAX_CONCURRENCY_CAP: usize = 8;

fn default_max_concurrency() -> usize {
    1
}

fn default_per_task_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    2
}

fn default_failure_tolerance() -> f64 {
    0.5
}

/// Exponential backoff between retry attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    #[serde(default = "BackoffPolicy::default_initial_ms")]
    pub initial_ms: u64,
    #[serde(default = "BackoffPolicy::default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "BackoffPolicy::default_max_ms")]
    pub max_ms: u64,
}

impl BackoffPolicy {
    fn default_initial_ms() -> u64 {
        500
    }

    fn default_multiplier() -> f64 {
        2.0
    }

    fn default_max_ms() -> u64 {
        30_000
    }

    /// No delay between attempts. Used by tests.
    pub fn none() -> Self {
        Self {
            initial_ms: 0,
            multiplier: 1.0,
            max_ms: 0,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 || self.initial_ms == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(retry - 1).unwrap_or(i32::MAX);
        let ms = (self.initial_ms as f64) * self.multiplier.powi(exponent);
        let capped = ms.min(self.max_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_ms: Self::default_initial_ms(),
            multiplier: Self::default_multiplier(),
            max_ms: Self::default_max_ms(),
        }
    }
}

/// How the orchestrator drives sub-agent tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPolicy {
    /// Parallel attempts in flight. 1 means strictly serial.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Budget for a single attempt.
    #[serde(default = "default_per_task_timeout_secs")]
    pub per_task_timeout_secs: u64,
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Largest failed fraction that still counts as a complete result.
    #[serde(default = "default_failure_tolerance")]
    pub failure_tolerance: f64,
    #[serde(default)]
    pub backoff: BackoffPolicy,
    /// Requests-per-minute ceiling across all attempts of the job.
    #[serde(default)]
    pub max_rpm: Option<u32>,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            per_task_timeout_secs: default_per_task_timeout_secs(),
            max_retries: default_max_retries(),
            failure_tolerance: default_failure_tolerance(),
            backoff: BackoffPolicy::default(),
            max_rpm: None,
        }
    }
}

impl ExecutionPolicy {
    /// Builder: set the concurrency.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Builder: set the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Builder: set the failure tolerance.
    pub fn with_failure_tolerance(mut self, failure_tolerance: f64) -> Self {
        self.failure_tolerance = failure_tolerance;
        self
    }

    /// Builder: set the per-attempt timeout.
    pub fn with_per_task_timeout(mut self, timeout: Duration) -> Self {
        self.per_task_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Builder: set the backoff.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Builder: set the RPM ceiling.
    pub fn with_max_rpm(mut self, max_rpm: Option<u32>) -> Self {
        self.max_rpm = max_rpm;
        self
    }

    pub fn per_task_timeout(&self) -> Duration {
        Duration::from_secs(self.per_task_timeout_secs)
    }

    /// Check every field is in range. Nothing is clamped.
    pub fn validated(self) -> Result<Self, ConfigError> {
        if self.max_concurrency == 0 || self.max_concurrency > MAX_CONCURRENCY_CAP {
            return Err(ConfigError::out_of_range(format!(
                "max_concurrency must be between 1 and {MAX_CONCURRENCY_CAP}, got {}",
                self.max_concurrency
            )));
        }
        if self.per_task_timeout_secs == 0 {
            return Err(ConfigError::out_of_range("per_task_timeout_secs must be positive"));
        }
        if !(0.0..=1.0).contains(&self.failure_tolerance) {
            return Err(ConfigError::out_of_range(format!(
                "failure_tolerance must be within [0, 1], got {}",
                self.failure_tolerance
            )));
        }
        if !self.backoff.multiplier.is_finite() || self.backoff.multiplier < 1.0 {
            return Err(ConfigError::out_of_range(format!(
                "backoff multiplier must be >= 1, got {}",
                self.backoff.multiplier
            )));
        }
        Ok(self)
    }
}
