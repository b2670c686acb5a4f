//! Evidence: the raw per-profile and per-repository facts a run reasons over.
//!
//! The store is built once during ingestion and is read-only for the rest of
//! the run.

pub mod normalizer;
pub mod record;
pub mod store;

pub use normalizer::ingest_github_payload;
pub use record::{EvidenceField, EvidenceId, EvidenceKind, EvidenceRecord, MetadataValue};
pub use store::{EvidenceStore, EvidenceStoreBuilder};
