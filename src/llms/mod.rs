//! LLM infrastructure.
//!
//! - [`base_llm`] - the provider-agnostic trait and shared provider state
//! - [`providers`] - HTTP provider implementations

pub mod base_llm;
pub mod providers;

pub use base_llm::{BaseLLM, BaseLLMState, LLMMessage, MessageRole};
