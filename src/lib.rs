//! # kognit
//!
//! Evidence-grounded developer personas from public code-hosting footprints.
//!
//! A profile job fans one sub-agent task out per relevant repository, runs
//! them under a bounded execution policy, merges the findings into a
//! persona document and then re-checks every claim against the original
//! evidence. Claims that cannot be grounded are hedged or dropped; the
//! result always states which evidence was consulted and what failed.
//!
//! ```text
//! EvidenceStore ─► ExplorerOrchestrator ─► FindingSet ─► Synthesizer
//!                                                           │
//!                      ValidatedPersona ◄─ Validator ◄─ PersonaDocument
//! ```

pub mod agents;
pub mod evidence;
pub mod explorer;
pub mod llm;
pub mod llms;
pub mod pipeline;
pub mod synthesis;
pub mod task;
pub mod tasks;
pub mod types;
pub mod utilities;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use agents::{LlmSubAgent, SubAgent};
pub use evidence::{EvidenceId, EvidenceKind, EvidenceRecord, EvidenceStore};
pub use explorer::{
    CoverageReport, ExecutionPolicy, ExplorerOrchestrator, FindingSet, JobCancellation, JobContext,
    JobSpec,
};
pub use llm::{create_llm, ModelSelector, ProviderSettings};
pub use llms::base_llm::BaseLLM;
pub use pipeline::{ProfilePipeline, ProfileReport, RunStatus};
pub use synthesis::{NarrativeParams, PersonaDocument, Synthesizer, Tone, ValidatedPersona};
pub use tasks::{Claim, ClaimId, Finding};
pub use utilities::config::KognitConfig;
pub use utilities::errors::PipelineError;
pub use validation::{ValidationResult, Validator};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
