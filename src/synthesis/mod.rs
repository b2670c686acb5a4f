//! Synthesis: from a finding set to a persona document.
//!
//! - [`persona`] - the document model
//! - [`conflict`] - role conflict resolution and tie-break policy
//! - [`narrative`] - tone, analysis mode and length
//! - [`narrator`] - optional summary narration
//! - [`synthesizer`] - merge and finalize

pub mod conflict;
pub mod narrative;
pub mod narrator;
pub mod persona;
pub mod synthesizer;

pub use conflict::{resolve_roles, RoleResolution, TieBreak};
pub use narrative::{AnalysisMode, NarrativeParams, Tone};
pub use narrator::{LlmNarrator, NarratedStatement, Narrator, TemplateNarrator};
pub use persona::{
    ClaimRank, DocClaim, GlobalMetadata, PersonaDocument, Section, SectionKind, ValidatedPersona,
};
pub use synthesizer::{SynthesisConfig, Synthesizer};
