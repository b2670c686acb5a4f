//! Model selection and client construction.
//!
//! A model selector is the user-facing string naming a provider and model:
//! `"groq:llama-3.3-70b-versatile"`, `"openai/gpt-4o-mini"` or a bare model
//! name whose provider is inferred from its prefix. Provider-level clients
//! live in [`crate::llms`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::llms::base_llm::BaseLLM;
use crate::llms::providers::openai::{OpenAICompletion, OPENAI_BASE_URL};
use crate::utilities::errors::LlmError;

/// Model used when nothing is configured.
pub const DEFAULT_MODEL: &str = "google-gla:gemini-flash-latest";

/// Static description of a supported provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub base_url: &'static str,
    /// `None` for local servers that need no key.
    pub api_key_env: Option<&'static str>,
}

/// Supported providers. All speak the OpenAI Chat Completions dialect.
pub const PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        name: "openai",
        aliases: &[],
        base_url: OPENAI_BASE_URL,
        api_key_env: Some("OPENAI_API_KEY"),
    },
    ProviderSpec {
        name: "gemini",
        aliases: &["google", "google-gla"],
        base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
        api_key_env: Some("GEMINI_API_KEY"),
    },
    ProviderSpec {
        name: "groq",
        aliases: &[],
        base_url: "https://api.groq.com/openai/v1",
        api_key_env: Some("GROQ_API_KEY"),
    },
    ProviderSpec {
        name: "openrouter",
        aliases: &[],
        base_url: "https://openrouter.ai/api/v1",
        api_key_env: Some("OPENROUTER_API_KEY"),
    },
    ProviderSpec {
        name: "ollama",
        aliases: &[],
        base_url: "http://localhost:11434/v1",
        api_key_env: None,
    },
];

/// Look up a provider by name or alias (case-insensitive).
pub fn provider_spec(name: &str) -> Option<&'static ProviderSpec> {
    let name = name.to_ascii_lowercase();
    PROVIDERS
        .iter()
        .find(|p| p.name == name || p.aliases.contains(&name.as_str()))
}

/// Infer a provider from a bare model name.
fn infer_provider(model: &str) -> &'static str {
    let lower = model.to_ascii_lowercase();
    if lower.starts_with("gemini-") || lower.starts_with("gemma-") {
        "gemini"
    } else if lower.starts_with("llama") || lower.starts_with("mixtral") {
        "groq"
    } else {
        "openai"
    }
}

// ---------------------------------------------------------------------------
// ModelSelector
// ---------------------------------------------------------------------------

/// Parsed `provider:model` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ModelSelector {
    provider: String,
    model: String,
}

impl ModelSelector {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// Canonical provider name.
    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn spec(&self) -> Option<&'static ProviderSpec> {
        provider_spec(&self.provider)
    }
}

impl Default for ModelSelector {
    fn default() -> Self {
        // DEFAULT_MODEL always parses.
        Self::new("gemini", "gemini-flash-latest")
    }
}

impl FromStr for ModelSelector {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(LlmError::UnsupportedProvider {
                provider: String::new(),
            });
        }

        // "provider:model" is explicit; the provider must be known.
        if let Some((provider, model)) = s.split_once(':') {
            let spec = provider_spec(provider).ok_or_else(|| LlmError::UnsupportedProvider {
                provider: provider.to_string(),
            })?;
            return Ok(Self::new(spec.name, model));
        }

        // "provider/model" only when the prefix names a provider, so that
        // OpenRouter-style "vendor/model" ids survive intact.
        if let Some((prefix, model)) = s.split_once('/') {
            if let Some(spec) = provider_spec(prefix) {
                return Ok(Self::new(spec.name, model));
            }
        }

        Ok(Self::new(infer_provider(s), s))
    }
}

impl fmt::Display for ModelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

impl From<ModelSelector> for String {
    fn from(selector: ModelSelector) -> Self {
        selector.to_string()
    }
}

impl TryFrom<String> for ModelSelector {
    type Error = LlmError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ---------------------------------------------------------------------------
// Provider settings and factory
// ---------------------------------------------------------------------------

fn default_timeout_secs() -> u64 {
    120
}

fn default_json_mode() -> bool {
    true
}

/// Provider connection settings from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Override the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Override the provider's base URL.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Request JSON-object responses where the provider supports it.
    #[serde(default = "default_json_mode")]
    pub json_mode: bool,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_key_env: None,
            base_url: None,
            timeout_secs: default_timeout_secs(),
            temperature: None,
            max_tokens: None,
            json_mode: default_json_mode(),
        }
    }
}

/// Build a client for `selector`, reading the API key from the process
/// environment.
pub fn create_llm(
    selector: &ModelSelector,
    settings: &ProviderSettings,
) -> Result<Arc<dyn BaseLLM>, LlmError> {
    create_llm_with_env(selector, settings, |key| std::env::var(key).ok())
}

/// Build a client for `selector`, reading the API key through `lookup`.
pub fn create_llm_with_env(
    selector: &ModelSelector,
    settings: &ProviderSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Arc<dyn BaseLLM>, LlmError> {
    let spec = selector.spec().ok_or_else(|| LlmError::UnsupportedProvider {
        provider: selector.provider().to_string(),
    })?;

    let key_env = settings.api_key_env.as_deref().or(spec.api_key_env);
    let api_key = match key_env {
        Some(env_var) => lookup(env_var)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::MissingApiKey {
                provider: spec.name.to_string(),
                env_var: env_var.to_string(),
            })?,
        None => spec.name.to_string(),
    };
    let base_url = settings
        .base_url
        .clone()
        .unwrap_or_else(|| spec.base_url.to_string());

    log::info!(
        "Using model '{}' via {} ({})",
        selector.model(),
        spec.name,
        base_url
    );

    let llm = OpenAICompletion::new(selector.model(), spec.name, api_key, Some(base_url))?
        .with_temperature(settings.temperature)
        .with_max_tokens(settings.max_tokens)
        .with_json_mode(settings.json_mode)
        .with_timeout(Duration::from_secs(settings.timeout_secs.max(1)))?;
    Ok(Arc::new(llm))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_explicit_provider() {
        let selector: ModelSelector = "google-gla:gemini-flash-latest".parse().unwrap();
        assert_eq!(selector.provider(), "gemini");
        assert_eq!(selector.model(), "gemini-flash-latest");
        assert_eq!(selector, ModelSelector::default());
        assert_eq!(DEFAULT_MODEL.parse::<ModelSelector>().unwrap(), selector);
    }

    #[test]
    fn test_parse_slash_prefix_only_for_known_providers() {
        let selector: ModelSelector = "groq/llama-3.3-70b-versatile".parse().unwrap();
        assert_eq!(selector.provider(), "groq");

        let selector: ModelSelector = "openrouter:anthropic/claude-3.5-sonnet".parse().unwrap();
        assert_eq!(selector.provider(), "openrouter");
        assert_eq!(selector.model(), "anthropic/claude-3.5-sonnet");

        let selector: ModelSelector = "meta/llama".parse().unwrap();
        assert_eq!(selector.provider(), "openai");
        assert_eq!(selector.model(), "meta/llama");
    }

    #[test]
    fn test_parse_infers_from_bare_model() {
        assert_eq!("gpt-4o-mini".parse::<ModelSelector>().unwrap().provider(), "openai");
        assert_eq!("gemini-2.0-flash".parse::<ModelSelector>().unwrap().provider(), "gemini");
        assert_eq!("llama-3.1-8b-instant".parse::<ModelSelector>().unwrap().provider(), "groq");
    }

    #[test]
    fn test_parse_rejects_unknown_provider() {
        assert!(matches!(
            "bogus:model".parse::<ModelSelector>(),
            Err(LlmError::UnsupportedProvider { .. })
        ));
        assert!("".parse::<ModelSelector>().is_err());
    }

    #[test]
    fn test_selector_serializes_as_string() {
        let selector: ModelSelector = "groq:llama3".parse().unwrap();
        assert_eq!(serde_json::to_string(&selector).unwrap(), "\"groq:llama3\"");
    }

    #[test]
    fn test_create_llm_requires_api_key() {
        let selector: ModelSelector = "groq:llama3".parse().unwrap();
        let err = create_llm_with_env(&selector, &ProviderSettings::default(), |_| None).unwrap_err();
        assert_eq!(
            err,
            LlmError::MissingApiKey {
                provider: "groq".to_string(),
                env_var: "GROQ_API_KEY".to_string()
            }
        );
    }

    #[test]
    fn test_create_llm_with_key() {
        let selector: ModelSelector = "groq:llama3".parse().unwrap();
        let llm = create_llm_with_env(&selector, &ProviderSettings::default(), |key| {
            (key == "GROQ_API_KEY").then(|| "gsk-test".to_string())
        })
        .unwrap();
        assert_eq!(llm.provider(), "groq");
        assert_eq!(llm.model(), "llama3");
    }

    #[test]
    fn test_local_provider_needs_no_key() {
        let selector: ModelSelector = "ollama:qwen2.5".parse().unwrap();
        assert!(create_llm_with_env(&selector, &ProviderSettings::default(), |_| None).is_ok());
    }
}
