//! Sub-agents and their prompt/parse boundary.
//!
//! - [`sub_agent`] - the `SubAgent` trait and the LLM-backed implementation
//! - [`prompts`] - repository analysis prompts
//! - [`parser`] - strict structured-output parsing

pub mod parser;
pub mod prompts;
pub mod sub_agent;

pub use parser::{parse_analysis, ParsedAnalysis, ProposedClaim};
pub use sub_agent::{ground_claims, LlmSubAgent, SubAgent, SubAgentConfig};
