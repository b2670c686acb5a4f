//! LLM provider implementations.
//!
//! Every supported backend speaks the OpenAI Chat Completions dialect, so a
//! single client covers them; [`crate::llm`] maps provider names to base URLs
//! and API-key variables.

pub mod openai;

pub use openai::OpenAICompletion;
