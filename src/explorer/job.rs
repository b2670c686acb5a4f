//! Job specification and the per-run context passed to every stage.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use uuid::Uuid;

use super::policy::ExecutionPolicy;
use crate::evidence::{EvidenceId, EvidenceStore};

/// Default cap on analyzed repositories.
pub const DEFAULT_MAX_REPOSITORIES: usize = 20;

/// What to analyze and how.
#[derive(Debug, Clone)]
pub struct JobSpec {
    evidence_refs: Vec<EvidenceId>,
    pub policy: ExecutionPolicy,
}

impl JobSpec {
    /// Job over `evidence_refs` in the given order. Duplicates are dropped.
    pub fn new(evidence_refs: impl IntoIterator<Item = EvidenceId>, policy: ExecutionPolicy) -> Self {
        let mut seen = HashSet::new();
        let evidence_refs = evidence_refs
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();
        Self {
            evidence_refs,
            policy,
        }
    }

    /// Job over the store's repositories ranked by relevance (pinned first,
    /// then stars descending, then id), capped at `max_repositories`.
    pub fn prioritized(store: &EvidenceStore, max_repositories: usize, policy: ExecutionPolicy) -> Self {
        let mut repos: Vec<_> = store.repositories().collect();
        repos.sort_by(|a, b| {
            b.is_pinned()
                .cmp(&a.is_pinned())
                .then_with(|| b.stars().cmp(&a.stars()))
                .then_with(|| a.id().cmp(&b.id()))
        });
        let refs = repos.into_iter().take(max_repositories).map(|r| r.id());
        Self::new(refs, policy)
    }

    pub fn evidence_refs(&self) -> &[EvidenceId] {
        &self.evidence_refs
    }

    pub fn len(&self) -> usize {
        self.evidence_refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evidence_refs.is_empty()
    }
}

/// Whole-job cancellation signal. Clones share the same flag.
#[derive(Debug, Clone)]
pub struct JobCancellation {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for JobCancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl JobCancellation {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

/// Explicit per-run state handed to each stage. Nothing here outlives the run.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: Uuid,
    pub store: Arc<EvidenceStore>,
    pub cancellation: JobCancellation,
    pub started_at: DateTime<Utc>,
}

impl JobContext {
    pub fn new(store: Arc<EvidenceStore>) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            store,
            cancellation: JobCancellation::new(),
            started_at: Utc::now(),
        }
    }

    pub fn with_cancellation(mut self, cancellation: JobCancellation) -> Self {
        self.cancellation = cancellation;
        self
    }
}
