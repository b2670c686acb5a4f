//! Sub-agent task: one unit of analysis bound to exactly one evidence record.
//!
//! State machine:
//!
//! ```text
//! pending ──start──▶ running ──succeed──▶ succeeded
//!    ▲                  │
//!    └──────retry───────┤
//!                       └──fail──▶ failed
//! ```
//!
//! `succeeded` and `failed` are terminal. Only the orchestrator's scheduler
//! loop mutates a task.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::evidence::EvidenceId;
use crate::tasks::Finding;

/// Lifecycle state of a [`SubAgentTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// An illegal state transition was requested.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("task {task_id}: cannot {action} from {from}")]
pub struct TaskTransitionError {
    pub task_id: Uuid,
    pub from: TaskStatus,
    pub action: &'static str,
}

/// A unit of work bound to one evidence record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentTask {
    id: Uuid,
    evidence: EvidenceId,
    status: TaskStatus,
    attempts: u32,
    result: Option<Finding>,
    last_error: Option<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl SubAgentTask {
    /// Create a pending task for one evidence record.
    pub fn new(evidence: EvidenceId) -> Self {
        Self {
            id: Uuid::new_v4(),
            evidence,
            status: TaskStatus::Pending,
            attempts: 0,
            result: None,
            last_error: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn evidence(&self) -> &EvidenceId {
        &self.evidence
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn result(&self) -> Option<&Finding> {
        self.result.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Whether another attempt fits in a budget of `max_retries` retries.
    pub fn can_retry(&self, max_retries: u32) -> bool {
        self.attempts <= max_retries
    }

    fn expect_status(&self, expected: TaskStatus, action: &'static str) -> Result<(), TaskTransitionError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(TaskTransitionError {
                task_id: self.id,
                from: self.status,
                action,
            })
        }
    }

    /// `pending → running`; counts one attempt.
    pub fn start(&mut self) -> Result<u32, TaskTransitionError> {
        self.expect_status(TaskStatus::Pending, "start")?;
        self.status = TaskStatus::Running;
        self.attempts += 1;
        self.started_at.get_or_insert_with(Utc::now);
        Ok(self.attempts)
    }

    /// `running → succeeded`, storing the finding.
    pub fn succeed(&mut self, finding: Finding) -> Result<(), TaskTransitionError> {
        self.expect_status(TaskStatus::Running, "succeed")?;
        self.status = TaskStatus::Succeeded;
        self.result = Some(finding);
        self.last_error = None;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// `running → pending` after a retryable failure.
    pub fn retry(&mut self, reason: impl Into<String>) -> Result<(), TaskTransitionError> {
        self.expect_status(TaskStatus::Running, "retry")?;
        self.status = TaskStatus::Pending;
        self.last_error = Some(reason.into());
        Ok(())
    }

    /// `running → failed`.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), TaskTransitionError> {
        self.expect_status(TaskStatus::Running, "fail")?;
        self.status = TaskStatus::Failed;
        self.last_error = Some(reason.into());
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(task: &SubAgentTask) -> Finding {
        Finding::new(task.id(), task.evidence().clone(), "summary", 5, vec![], vec![])
    }

    #[test]
    fn test_happy_path() {
        let mut task = SubAgentTask::new(EvidenceId::repository("a/b"));
        assert_eq!(task.status(), TaskStatus::Pending);
        assert_eq!(task.start().unwrap(), 1);
        let f = finding(&task);
        task.succeed(f).unwrap();
        assert_eq!(task.status(), TaskStatus::Succeeded);
        assert!(task.status().is_terminal());
        assert!(task.result().is_some());
        assert!(task.finished_at().is_some());
    }

    #[test]
    fn test_retry_then_fail() {
        let mut task = SubAgentTask::new(EvidenceId::repository("a/b"));
        task.start().unwrap();
        task.retry("rate limited").unwrap();
        assert_eq!(task.status(), TaskStatus::Pending);
        assert!(task.can_retry(1));

        assert_eq!(task.start().unwrap(), 2);
        assert!(!task.can_retry(1));
        task.fail("timed out").unwrap();
        assert_eq!(task.status(), TaskStatus::Failed);
        assert_eq!(task.last_error(), Some("timed out"));
        assert_eq!(task.attempts(), 2);
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let mut task = SubAgentTask::new(EvidenceId::repository("a/b"));
        assert!(task.succeed(finding(&task)).is_err());
        assert!(task.retry("x").is_err());

        task.start().unwrap();
        task.fail("boom").unwrap();
        let err = task.start().unwrap_err();
        assert_eq!(err.from, TaskStatus::Failed);
        assert_eq!(err.action, "start");
        assert!(task.retry("again").is_err());
    }
}
