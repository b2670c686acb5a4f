//! Run configuration.
//!
//! Loaded in three layers: built-in defaults, an optional YAML file, then
//! `KOGNIT_*` environment overrides. Every layer is checked by
//! [`KognitConfig::validated`]; bad values are errors, never coerced.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::explorer::job::DEFAULT_MAX_REPOSITORIES;
use crate::explorer::policy::ExecutionPolicy;
use crate::llm::{ModelSelector, ProviderSettings};
use crate::synthesis::narrative::{NarrativeParams, Tone};
use crate::synthesis::synthesizer::SynthesisConfig;
use crate::utilities::errors::ConfigError;
use crate::validation::validator::ValidatorConfig;

pub const ENV_MODEL: &str = "KOGNIT_MODEL";
pub const ENV_MAX_CONCURRENCY: &str = "KOGNIT_MAX_CONCURRENCY";
pub const ENV_MAX_RETRIES: &str = "KOGNIT_MAX_RETRIES";
pub const ENV_MAX_REPOSITORIES: &str = "KOGNIT_MAX_REPOSITORIES";
pub const ENV_ROAST: &str = "KOGNIT_ROAST";
pub const ENV_HUMOR: &str = "KOGNIT_HUMOR";

fn default_max_repositories() -> usize {
    DEFAULT_MAX_REPOSITORIES
}

/// Everything a run needs besides the evidence itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KognitConfig {
    #[serde(default)]
    pub model: ModelSelector,
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub policy: ExecutionPolicy,
    #[serde(default)]
    pub narrative: NarrativeParams,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub validation: ValidatorConfig,
    /// Repositories analyzed per job, most relevant first.
    #[serde(default = "default_max_repositories")]
    pub max_repositories: usize,
}

impl Default for KognitConfig {
    fn default() -> Self {
        Self {
            model: ModelSelector::default(),
            provider: ProviderSettings::default(),
            policy: ExecutionPolicy::default(),
            narrative: NarrativeParams::default(),
            synthesis: SynthesisConfig::default(),
            validation: ValidatorConfig::default(),
            max_repositories: default_max_repositories(),
        }
    }
}

impl KognitConfig {
    /// Parse a YAML document. Missing sections take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })
    }

    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Like [`load`](Self::load), reading overrides through `lookup`.
    pub fn load_with_env(
        path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let yaml = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
                log::debug!("Loaded configuration from {}", path.display());
                Self::from_yaml_str(&yaml)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides(lookup)?.validated()
    }

    /// Apply `KOGNIT_*` overrides. Unset or blank variables are ignored.
    pub fn apply_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(model) = get(ENV_MODEL) {
            self.model = model.parse().map_err(|e: crate::utilities::errors::LlmError| {
                ConfigError::InvalidValue {
                    key: ENV_MODEL.to_string(),
                    value: model.clone(),
                    reason: e.to_string(),
                }
            })?;
        }
        if let Some(value) = get(ENV_MAX_CONCURRENCY) {
            self.policy.max_concurrency = parse_number(ENV_MAX_CONCURRENCY, &value)?;
        }
        if let Some(value) = get(ENV_MAX_RETRIES) {
            self.policy.max_retries = parse_number(ENV_MAX_RETRIES, &value)?;
        }
        if let Some(value) = get(ENV_MAX_REPOSITORIES) {
            self.max_repositories = parse_number(ENV_MAX_REPOSITORIES, &value)?;
        }

        let roast = get(ENV_ROAST).map(|v| parse_flag(ENV_ROAST, &v)).transpose()?;
        let humor = get(ENV_HUMOR).map(|v| parse_number::<u8>(ENV_HUMOR, &v)).transpose()?;
        if roast.is_some() || humor.is_some() {
            let current = self.narrative.tone;
            let roast = roast.unwrap_or(current == Tone::Roast);
            let humor = humor.unwrap_or(match current {
                Tone::Humorous(level) => level,
                _ => 0,
            });
            self.narrative.tone = Tone::from_levels(humor, roast);
        }
        Ok(self)
    }

    /// Check every section.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        self.policy = self.policy.validated()?;
        self.narrative = self.narrative.validated()?;
        self.validation = self.validation.validated()?;
        if self.max_repositories == 0 {
            return Err(ConfigError::out_of_range("max_repositories must be positive"));
        }
        Ok(self)
    }
}

fn parse_number<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}
