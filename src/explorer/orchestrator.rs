//! Explorer orchestrator: fans a job out into sub-agent tasks and drives them
//! under the job's execution policy.
//!
//! The scheduler loop below is the only code that touches the task queue.
//! At most `max_concurrency` attempts are in flight; each attempt is bounded
//! by the per-task timeout and gated by the job's RPM budget. Retryable
//! failures send the task back to `pending` and it is requeued behind the
//! tasks that have not started yet. Cancellation drops every in-flight attempt
//! (which drops the underlying provider request) and stops issuing new ones.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use thiserror::Error;
use uuid::Uuid;

use super::finding_set::{FailedUnit, FindingSet};
use super::job::{JobContext, JobSpec};
use crate::agents::sub_agent::SubAgent;
use crate::evidence::EvidenceRecord;
use crate::task::{SubAgentTask, TaskStatus};
use crate::tasks::Finding;
use crate::utilities::errors::{ConfigError, JobAbortedError, SubAgentError, TransientError};
use crate::utilities::rpm_controller::RpmController;

/// Reason recorded for attempts dropped by cancellation.
pub const CANCELLED_REASON: &str = "cancelled";

/// Why the orchestrator produced no finding set at all.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExplorerError {
    #[error(transparent)]
    InvalidPolicy(#[from] ConfigError),

    #[error(transparent)]
    Aborted(#[from] JobAbortedError),
}

type Attempt<'a> = BoxFuture<'a, (usize, Result<Finding, SubAgentError>)>;

/// Drives sub-agent tasks for one job at a time.
#[derive(Debug, Clone)]
pub struct ExplorerOrchestrator {
    agent: Arc<dyn SubAgent>,
}

impl ExplorerOrchestrator {
    pub fn new(agent: Arc<dyn SubAgent>) -> Self {
        Self { agent }
    }

    pub fn agent(&self) -> &Arc<dyn SubAgent> {
        &self.agent
    }

    /// Run every task of `job` and collect the findings.
    ///
    /// Task failures never abort the job: they are recorded in the returned
    /// set, which reports itself as partial when the failure fraction exceeds
    /// the tolerance. The only errors are an invalid policy and a
    /// cancellation that arrives before any finding exists.
    pub async fn run(&self, ctx: &JobContext, job: &JobSpec) -> Result<FindingSet, ExplorerError> {
        let policy = job.policy.clone().validated()?;
        let total = job.len();
        let mut set = FindingSet::new(ctx.job_id, total, policy.failure_tolerance);

        let mut tasks: Vec<SubAgentTask> = job
            .evidence_refs()
            .iter()
            .cloned()
            .map(SubAgentTask::new)
            .collect();
        let records: Vec<Option<Arc<EvidenceRecord>>> =
            tasks.iter().map(|t| ctx.store.get(t.evidence()).cloned()).collect();

        tracing::info!(
            job_id = %ctx.job_id,
            tasks = total,
            max_concurrency = policy.max_concurrency,
            max_retries = policy.max_retries,
            "starting explorer job"
        );

        let mut ready: VecDeque<usize> = VecDeque::with_capacity(total);
        for (idx, task) in tasks.iter().enumerate() {
            if records[idx].is_some() {
                ready.push_back(idx);
            } else {
                // Nothing to analyze; the task never runs.
                tracing::warn!(
                    job_id = %ctx.job_id,
                    task_id = %task.id(),
                    evidence = %task.evidence(),
                    outcome = "failed",
                    reason = "evidence not found",
                    "sub-agent task not started"
                );
                set.push_failure(FailedUnit {
                    evidence: task.evidence().clone(),
                    reason: "evidence not found in store".to_string(),
                    attempts: 0,
                });
            }
        }

        let rpm = RpmController::new(policy.max_rpm);
        let timeout = policy.per_task_timeout();
        let mut in_flight: FuturesUnordered<Attempt<'_>> = FuturesUnordered::new();
        let mut cancelled = ctx.cancellation.is_cancelled();

        while !cancelled {
            while in_flight.len() < policy.max_concurrency {
                let Some(idx) = ready.pop_front() else {
                    break;
                };
                let Some(record) = records[idx].clone() else {
                    continue;
                };
                let task = &mut tasks[idx];
                let attempt = match task.start() {
                    Ok(attempt) => attempt,
                    Err(e) => {
                        tracing::error!(job_id = %ctx.job_id, error = %e, "scheduler skipped task");
                        continue;
                    }
                };
                tracing::debug!(
                    job_id = %ctx.job_id,
                    task_id = %task.id(),
                    evidence = %task.evidence(),
                    attempt,
                    "dispatching sub-agent attempt"
                );
                let delay = policy.backoff.delay_for(attempt - 1);
                in_flight.push(self.attempt(idx, task.id(), record, delay, timeout, &rpm));
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                _ = ctx.cancellation.cancelled() => {
                    cancelled = true;
                }
                Some((idx, outcome)) = in_flight.next() => {
                    let task = &mut tasks[idx];
                    if Self::settle(ctx, task, outcome, policy.max_retries, &mut set) {
                        ready.push_back(idx);
                    }
                }
            }
        }

        // Dropping the attempts cancels their provider calls.
        drop(in_flight);

        if cancelled {
            set.cancelled = true;
            for (task, record) in tasks.iter_mut().zip(&records) {
                match task.status() {
                    TaskStatus::Running => {
                        let attempts = task.attempts();
                        if task.fail(CANCELLED_REASON).is_ok() {
                            tracing::warn!(
                                job_id = %ctx.job_id,
                                task_id = %task.id(),
                                evidence = %task.evidence(),
                                attempt = attempts,
                                outcome = "failed",
                                reason = CANCELLED_REASON,
                                "sub-agent task cancelled"
                            );
                            set.push_failure(FailedUnit {
                                evidence: task.evidence().clone(),
                                reason: CANCELLED_REASON.to_string(),
                                attempts,
                            });
                        }
                    }
                    // Requeued for a retry: the work was attempted.
                    TaskStatus::Pending if record.is_some() && task.attempts() > 0 => {
                        let reason = task.last_error().unwrap_or(CANCELLED_REASON).to_string();
                        tracing::warn!(
                            job_id = %ctx.job_id,
                            task_id = %task.id(),
                            evidence = %task.evidence(),
                            attempt = task.attempts(),
                            outcome = "failed",
                            reason = %reason,
                            "sub-agent task cancelled before its retry"
                        );
                        set.push_failure(FailedUnit {
                            evidence: task.evidence().clone(),
                            reason,
                            attempts: task.attempts(),
                        });
                    }
                    TaskStatus::Pending if record.is_some() => {
                        set.push_skipped(task.evidence().clone());
                    }
                    _ => {}
                }
            }
        }

        set.usage = self.agent.usage();
        let set = set.seal();

        tracing::info!(
            job_id = %ctx.job_id,
            analyzed = set.findings.len(),
            failed = set.failed.len(),
            skipped = set.skipped.len(),
            cancelled = set.cancelled,
            completeness = ?set.completeness(),
            "explorer job finished"
        );

        if set.cancelled && set.is_empty() {
            return Err(JobAbortedError {
                job_id: ctx.job_id.to_string(),
                reason: "cancelled before any repository was analyzed".to_string(),
                completed: 0,
                total,
            }
            .into());
        }
        Ok(set)
    }

    /// One attempt: backoff, RPM gate, then the analysis under a timeout.
    fn attempt<'a>(
        &'a self,
        idx: usize,
        task_id: Uuid,
        record: Arc<EvidenceRecord>,
        delay: Duration,
        timeout: Duration,
        rpm: &'a RpmController,
    ) -> Attempt<'a> {
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            rpm.check_or_wait().await;
            let outcome = match tokio::time::timeout(timeout, self.agent.analyze(task_id, &record)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(TransientError::timeout(timeout).into()),
            };
            (idx, outcome)
        }
        .boxed()
    }

    /// Apply an attempt's outcome to its task. Returns true when the task went
    /// back to `pending` and must be requeued.
    fn settle(
        ctx: &JobContext,
        task: &mut SubAgentTask,
        outcome: Result<Finding, SubAgentError>,
        max_retries: u32,
        set: &mut FindingSet,
    ) -> bool {
        let attempt = task.attempts();
        match outcome {
            Ok(finding) => {
                tracing::info!(
                    job_id = %ctx.job_id,
                    task_id = %task.id(),
                    evidence = %task.evidence(),
                    attempt,
                    outcome = "succeeded",
                    claims = finding.claims().len(),
                    "sub-agent task succeeded"
                );
                set.push_finding(finding.clone());
                if let Err(e) = task.succeed(finding) {
                    tracing::error!(job_id = %ctx.job_id, error = %e, "illegal task transition");
                }
                false
            }
            Err(err) if err.is_retryable() && task.can_retry(max_retries) => {
                tracing::warn!(
                    job_id = %ctx.job_id,
                    task_id = %task.id(),
                    evidence = %task.evidence(),
                    attempt,
                    outcome = "retry",
                    reason = %err,
                    "sub-agent attempt failed, retrying"
                );
                match task.retry(err.to_string()) {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::error!(job_id = %ctx.job_id, error = %e, "illegal task transition");
                        false
                    }
                }
            }
            Err(err) => {
                tracing::warn!(
                    job_id = %ctx.job_id,
                    task_id = %task.id(),
                    evidence = %task.evidence(),
                    attempt,
                    outcome = "failed",
                    reason = %err,
                    "sub-agent task failed"
                );
                set.push_failure(FailedUnit {
                    evidence: task.evidence().clone(),
                    reason: err.to_string(),
                    attempts: attempt,
                });
                if let Err(e) = task.fail(err.to_string()) {
                    tracing::error!(job_id = %ctx.job_id, error = %e, "illegal task transition");
                }
                false
            }
        }
    }
}
