//! Orchestrator output: the finding stream plus what could not be analyzed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::evidence::{EvidenceId, EvidenceStore};
use crate::tasks::Finding;
use crate::types::usage_metrics::UsageMetrics;

/// Whether the job stayed within its failure tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completeness {
    Complete,
    /// Failure fraction exceeded the tolerance, or the job was cancelled.
    Partial,
}

/// An evidence unit whose task ended in `failed`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FailedUnit {
    pub evidence: EvidenceId,
    pub reason: String,
    pub attempts: u32,
}

/// How much of the requested evidence was analyzed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub total_evidence_units: usize,
    pub analyzed_units: usize,
    pub failed_units: Vec<EvidenceId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_units: Vec<EvidenceId>,
}

/// Findings of one job, keyed by evidence so that completion order never
/// shows through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindingSet {
    pub job_id: Uuid,
    pub findings: BTreeMap<EvidenceId, Finding>,
    /// Sorted by evidence id.
    pub failed: Vec<FailedUnit>,
    /// Sorted by evidence id.
    pub skipped: Vec<EvidenceId>,
    pub total: usize,
    pub cancelled: bool,
    pub failure_tolerance: f64,
    pub usage: UsageMetrics,
}

impl FindingSet {
    /// Start an empty set for a job over `total` units.
    pub fn new(job_id: Uuid, total: usize, failure_tolerance: f64) -> Self {
        Self {
            job_id,
            findings: BTreeMap::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            total,
            cancelled: false,
            failure_tolerance,
            usage: UsageMetrics::default(),
        }
    }

    pub(crate) fn push_finding(&mut self, finding: Finding) {
        self.findings.insert(finding.evidence().clone(), finding);
    }

    pub(crate) fn push_failure(&mut self, unit: FailedUnit) {
        self.failed.push(unit);
    }

    pub(crate) fn push_skipped(&mut self, evidence: EvidenceId) {
        self.skipped.push(evidence);
    }

    /// Sort the failure and skip lists so the set is order-independent.
    pub(crate) fn seal(mut self) -> Self {
        self.failed.sort();
        self.skipped.sort();
        self
    }

    /// Failed tasks over all tasks; zero for an empty job.
    pub fn failure_fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failed.len() as f64 / self.total as f64
        }
    }

    pub fn completeness(&self) -> Completeness {
        if self.cancelled || self.failure_fraction() > self.failure_tolerance {
            Completeness::Partial
        } else {
            Completeness::Complete
        }
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn failed_ids(&self) -> Vec<EvidenceId> {
        self.failed.iter().map(|f| f.evidence.clone()).collect()
    }

    pub fn coverage(&self) -> CoverageReport {
        CoverageReport {
            total_evidence_units: self.total,
            analyzed_units: self.findings.len(),
            failed_units: self.failed_ids(),
            skipped_units: self.skipped.clone(),
        }
    }

    /// Markdown audit of every analyzed repository, most complex first.
    pub fn consolidated_report(&self, store: &EvidenceStore) -> String {
        let mut findings: Vec<&Finding> = self.findings.values().collect();
        findings.sort_by(|a, b| {
            b.complexity()
                .cmp(&a.complexity())
                .then_with(|| a.evidence().cmp(b.evidence()))
        });

        let mut lines = vec!["# Full-Dive Technical Audit".to_string(), String::new()];
        for finding in findings {
            let name = store
                .get(finding.evidence())
                .map(|r| r.display_name().to_string())
                .unwrap_or_else(|| finding.evidence().subject_id().to_string());
            let stack: Vec<&str> = finding
                .tech_signals()
                .iter()
                .map(|s| s.technology.as_str())
                .collect();

            lines.push(format!("## {} (Complexity: {}/10)", name, finding.complexity()));
            if !stack.is_empty() {
                lines.push(format!("**Tech Stack:** {}", stack.join(", ")));
            }
            lines.push(String::new());
            lines.push(finding.summary().to_string());
            if !finding.claims().is_empty() {
                lines.push(String::new());
                for claim in finding.claims() {
                    lines.push(format!("- {} ({:.0}%)", claim.text, claim.confidence * 100.0));
                }
            }
            lines.push("---".to_string());
            lines.push(String::new());
        }

        if !self.failed.is_empty() {
            lines.push("## Not analyzed".to_string());
            for unit in &self.failed {
                lines.push(format!(
                    "- {} after {} attempt(s): {}",
                    unit.evidence, unit.attempts, unit.reason
                ));
            }
        }
        lines.join("\n")
    }
}
