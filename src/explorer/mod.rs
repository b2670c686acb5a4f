//! Explorer: decomposes a profile job into sub-agent tasks and runs them.
//!
//! - [`job`] - job specification, per-run context, cancellation
//! - [`policy`] - concurrency, timeout, retry and tolerance settings
//! - [`orchestrator`] - the single-writer scheduler
//! - [`finding_set`] - collected findings and the coverage report

pub mod finding_set;
pub mod job;
pub mod orchestrator;
pub mod policy;

pub use finding_set::{Completeness, CoverageReport, FailedUnit, FindingSet};
pub use job::{JobCancellation, JobContext, JobSpec, DEFAULT_MAX_REPOSITORIES};
pub use orchestrator::{ExplorerError, ExplorerOrchestrator};
pub use policy::{BackoffPolicy, ExecutionPolicy, MAX_CONCURRENCY_CAP};
