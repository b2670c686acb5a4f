//! End-to-end profile run.
//!
//! `explore → merge → narrate → validate → finalize`. Exploration fans out
//! one sub-agent task per prioritized repository. Everything after it is
//! single-threaded and deterministic given the finding set and the store.
//! Narration and link checks are optional and never fail the run.

use std::sync::Arc;

use serde::Serialize;

use crate::agents::sub_agent::{LlmSubAgent, SubAgent, SubAgentConfig};
use crate::explorer::finding_set::{Completeness, CoverageReport, FindingSet};
use crate::explorer::job::{JobContext, JobSpec, DEFAULT_MAX_REPOSITORIES};
use crate::explorer::orchestrator::{ExplorerError, ExplorerOrchestrator};
use crate::explorer::policy::ExecutionPolicy;
use crate::llms::base_llm::BaseLLM;
use crate::synthesis::narrative::NarrativeParams;
use crate::synthesis::narrator::{LlmNarrator, Narrator};
use crate::synthesis::persona::ValidatedPersona;
use crate::synthesis::synthesizer::Synthesizer;
use crate::types::usage_metrics::UsageMetrics;
use crate::utilities::config::KognitConfig;
use crate::utilities::errors::{ConfigError, PipelineError};
use crate::validation::links::{LinkChecker, DEFAULT_LINK_TIMEOUT};
use crate::validation::validator::{ValidationResult, Validator};

impl From<ExplorerError> for PipelineError {
    fn from(err: ExplorerError) -> Self {
        match err {
            ExplorerError::InvalidPolicy(e) => Self::Config(e),
            ExplorerError::Aborted(e) => Self::Aborted(e),
        }
    }
}

/// Overall outcome of a run that produced a persona.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Failures stayed within tolerance.
    Complete,
    /// Too many failures, or the run was cancelled after some findings.
    Degraded,
}

/// Everything a run hands back.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileReport {
    pub persona: ValidatedPersona,
    pub coverage: CoverageReport,
    pub status: RunStatus,
    pub usage: UsageMetrics,
    /// Markdown audit of every analyzed repository.
    pub audit_report: String,
    pub validation: ValidationResult,
}

/// Explorer, synthesizer and validator wired together.
#[derive(Debug, Clone)]
pub struct ProfilePipeline {
    orchestrator: ExplorerOrchestrator,
    synthesizer: Synthesizer,
    validator: Validator,
    narrator: Option<Arc<dyn Narrator>>,
    link_checker: LinkChecker,
    policy: ExecutionPolicy,
    max_repositories: usize,
}

impl ProfilePipeline {
    /// Pipeline with default settings, no narrator and offline link checks.
    pub fn new(agent: Arc<dyn SubAgent>) -> Self {
        Self {
            orchestrator: ExplorerOrchestrator::new(agent),
            synthesizer: Synthesizer::default(),
            validator: Validator::default(),
            narrator: None,
            link_checker: LinkChecker::offline(),
            policy: ExecutionPolicy::default(),
            max_repositories: DEFAULT_MAX_REPOSITORIES,
        }
    }

    /// Pipeline backed by `llm` for both analysis and narration.
    pub fn from_config(config: &KognitConfig, llm: Arc<dyn BaseLLM>) -> Result<Self, PipelineError> {
        let config = config.clone().validated()?;

        let agent = LlmSubAgent::new(llm.clone()).with_config(SubAgentConfig {
            tone: config.narrative.tone,
            custom_instructions: config.narrative.custom_instructions.clone(),
            ..SubAgentConfig::default()
        });
        let link_checker = if config.validation.check_links {
            LinkChecker::with_http(DEFAULT_LINK_TIMEOUT).map_err(|e| ConfigError::InvalidValue {
                key: "validation.check_links".to_string(),
                value: "true".to_string(),
                reason: e.to_string(),
            })?
        } else {
            LinkChecker::offline()
        };

        let mut pipeline = Self::new(Arc::new(agent))
            .with_params(config.narrative.clone())
            .with_validator(Validator::from_config(&config.validation))
            .with_link_checker(link_checker)
            .with_policy(config.policy.clone())
            .with_max_repositories(config.max_repositories);
        pipeline.synthesizer = pipeline.synthesizer.with_tie_break(config.synthesis.tie_break);
        if config.synthesis.narrate {
            pipeline = pipeline.with_narrator(Arc::new(LlmNarrator::new(llm)));
        }
        Ok(pipeline)
    }

    pub fn with_narrator(mut self, narrator: Arc<dyn Narrator>) -> Self {
        self.narrator = Some(narrator);
        self
    }

    pub fn with_link_checker(mut self, link_checker: LinkChecker) -> Self {
        self.link_checker = link_checker;
        self
    }

    pub fn with_params(mut self, params: NarrativeParams) -> Self {
        self.synthesizer = Synthesizer::new(params).with_tie_break(self.synthesizer.tie_break());
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_policy(mut self, policy: ExecutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_repositories(mut self, max_repositories: usize) -> Self {
        self.max_repositories = max_repositories;
        self
    }

    /// Run one profile job to a validated persona.
    pub async fn run(&self, ctx: &JobContext) -> Result<ProfileReport, PipelineError> {
        let job = JobSpec::prioritized(&ctx.store, self.max_repositories, self.policy.clone());
        let set = self.orchestrator.run(ctx, &job).await?;

        if set.is_empty() && ctx.store.profile().is_none() {
            tracing::warn!(job_id = %ctx.job_id, total = set.total, "Run produced no findings");
            return Err(PipelineError::NoFindings {
                total: set.total,
                failed: set.failed_ids().iter().map(ToString::to_string).collect(),
            });
        }

        let mut draft = self.synthesizer.merge(&set, &ctx.store);
        let mut usage = set.usage.clone();

        if let Some(narrator) = &self.narrator {
            if ctx.cancellation.is_cancelled() {
                tracing::info!(job_id = %ctx.job_id, "Skipping narration of a cancelled run");
            } else {
                // The narrator may share a client with the sub-agents.
                let before = narrator.usage();
                match narrator.narrate(&draft, self.synthesizer.params()).await {
                    Ok(statements) => {
                        let added = self.synthesizer.attach_narration(&mut draft, statements);
                        tracing::debug!(job_id = %ctx.job_id, statements = added, "Narration attached");
                    }
                    Err(e) => {
                        tracing::warn!(job_id = %ctx.job_id, reason = %e, "Narration failed; summary omitted");
                    }
                }
                usage.add_usage_metrics(&narrator.usage().delta_since(&before));
            }
        }

        let links = std::mem::take(&mut draft.global_metadata.links);
        draft.global_metadata.links = self.link_checker.filter_links(&links).await;

        let validation = self.validator.validate(&draft, &ctx.store);
        let persona = self.synthesizer.finalize(draft, &validation);
        let report = self.report(&set, persona, validation, usage, ctx);

        tracing::info!(
            job_id = %ctx.job_id,
            status = ?report.status,
            analyzed = report.coverage.analyzed_units,
            failed = report.coverage.failed_units.len(),
            claims = report.persona.document().claim_count(),
            "Profile run finished"
        );
        Ok(report)
    }

    fn report(
        &self,
        set: &FindingSet,
        persona: ValidatedPersona,
        validation: ValidationResult,
        usage: UsageMetrics,
        ctx: &JobContext,
    ) -> ProfileReport {
        let status = match set.completeness() {
            Completeness::Complete => RunStatus::Complete,
            Completeness::Partial => RunStatus::Degraded,
        };
        ProfileReport {
            persona,
            coverage: set.coverage(),
            status,
            usage,
            audit_report: set.consolidated_report(&ctx.store),
            validation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::record::{META_NAME, META_WEBSITE};
    use crate::evidence::{EvidenceId, EvidenceKind, EvidenceRecord, EvidenceStore};
    use crate::explorer::job::JobCancellation;
    use crate::synthesis::narrator::TemplateNarrator;
    use crate::synthesis::persona::SectionKind;
    use crate::tasks::{Claim, RoleAssertion, TechRole};
    use crate::testing::{default_finding, repo_record, ScriptedLlm, ScriptedSubAgent, Step};
    use crate::utilities::errors::{LlmError, SubAgentError};

    const CONSENSUS: &str = "Expert in distributed consensus protocols";

    fn store(with_profile: bool) -> Arc<EvidenceStore> {
        let mut records = vec![
            repo_record(
                "octocat/raft-kv",
                "# raft-kv\nA distributed key-value store built on Raft.",
                "Distributed key-value store",
                "Rust",
                40,
                "2024-06-01T00:00:00Z",
            ),
            repo_record(
                "octocat/gopher-cli",
                "# gopher-cli\nA command line tool.",
                "Command line tool",
                "Go",
                5,
                "2023-01-01T00:00:00Z",
            ),
            EvidenceRecord::new(EvidenceKind::Repository, "octocat/empty", "", ""),
        ];
        if with_profile {
            records.push(
                EvidenceRecord::new(
                    EvidenceKind::Profile,
                    "octocat",
                    "Builds distributed systems in Rust",
                    "https://github.com/octocat",
                )
                .with_metadata(META_NAME, "The Octocat")
                .with_metadata(META_WEBSITE, "octo dev"),
            );
        }
        Arc::new(EvidenceStore::from_records(records).unwrap())
    }

    /// Orphan check: every claim refers to resolvable evidence and every
    /// unhedged claim passed validation.
    fn assert_grounded(report: &ProfileReport, store: &EvidenceStore) {
        for (_, claim) in report.persona.document().claims() {
            assert!(!claim.evidence_refs.is_empty(), "{}", claim.text);
            assert_eq!(store.resolve(&claim.evidence_refs).len(), claim.evidence_refs.len());
            if !claim.hedged {
                assert!(report.validation.is_accepted(&claim.id), "{}", claim.text);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_repositories_one_empty() {
        let store = store(true);
        let ctx = JobContext::new(store.clone());
        let pipeline = ProfilePipeline::new(Arc::new(ScriptedSubAgent::new()));

        let report = pipeline.run(&ctx).await.unwrap();

        assert_eq!(report.status, RunStatus::Complete);
        assert_eq!(report.coverage.total_evidence_units, 3);
        assert_eq!(report.coverage.analyzed_units, 2);
        assert_eq!(report.coverage.failed_units, vec![EvidenceId::repository("octocat/empty")]);
        assert_grounded(&report, &store);

        let meta = report.persona.metadata();
        assert_eq!(meta.failed_tasks.len(), 1);
        assert_eq!(meta.links, vec!["https://github.com/octocat"]);
        assert_eq!(report.persona.headline(), Some("The Octocat: Rust"));
        assert!(report.persona.document().section(SectionKind::Profile).is_some());
        assert!(report.audit_report.contains("## raft-kv"));
        assert!(report.audit_report.contains("empty"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_consensus_claim_never_survives_verbatim() {
        let store = store(true);
        let ctx = JobContext::new(store.clone());
        let agent = ScriptedSubAgent::new().with_findings(|task_id, record| {
            let base = default_finding(task_id, record);
            if record.subject_id() != "octocat/raft-kv" {
                return base;
            }
            let mut claims = base.claims().to_vec();
            claims.push(
                Claim::new(CONSENSUS, [record.id()], 0.95)
                    .with_assertion(RoleAssertion::new(TechRole::Specialization, "distributed consensus")),
            );
            crate::tasks::Finding::new(
                task_id,
                record.id(),
                base.summary(),
                base.complexity(),
                claims,
                base.tech_signals().to_vec(),
            )
        });
        let report = ProfilePipeline::new(Arc::new(agent)).run(&ctx).await.unwrap();

        let texts: Vec<&str> = report
            .persona
            .document()
            .claims()
            .map(|(_, c)| c.text.as_str())
            .collect();
        assert!(!texts.contains(&CONSENSUS));
        assert!(texts.contains(&"Evidence in raft-kv mentions distributed; broader claims could not be verified"));
        assert_grounded(&report, &store);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_above_tolerance_degrade_the_run() {
        let store = store(true);
        let ctx = JobContext::new(store.clone());
        let agent = ScriptedSubAgent::new().script(
            "octocat/gopher-cli",
            vec![Step::Fail(SubAgentError::Fatal {
                message: "bad key".to_string(),
            })],
        );
        let report = ProfilePipeline::new(Arc::new(agent)).run(&ctx).await.unwrap();

        assert_eq!(report.status, RunStatus::Degraded);
        assert_eq!(
            report.coverage.failed_units,
            vec![
                EvidenceId::repository("octocat/empty"),
                EvidenceId::repository("octocat/gopher-cli"),
            ]
        );
        assert_grounded(&report, &store);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_findings_without_profile_is_an_error() {
        let ctx = JobContext::new(store(false));
        let agent = ScriptedSubAgent::new()
            .script("octocat/raft-kv", vec![Step::Fail(SubAgentError::Fatal { message: "x".into() })])
            .script("octocat/gopher-cli", vec![Step::Fail(SubAgentError::Fatal { message: "y".into() })]);
        let err = ProfilePipeline::new(Arc::new(agent)).run(&ctx).await.unwrap_err();
        match err {
            PipelineError::NoFindings { total, failed } => {
                assert_eq!(total, 3);
                assert_eq!(failed.len(), 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_profile_alone_still_yields_a_persona() {
        let store = Arc::new(
            EvidenceStore::from_records(vec![EvidenceRecord::new(
                EvidenceKind::Profile,
                "octocat",
                "Builds distributed systems in Rust",
                "https://github.com/octocat",
            )
            .with_metadata(META_NAME, "The Octocat")])
            .unwrap(),
        );
        let report = ProfilePipeline::new(Arc::new(ScriptedSubAgent::new()))
            .run(&JobContext::new(store.clone()))
            .await
            .unwrap();
        assert_eq!(report.status, RunStatus::Complete);
        assert_eq!(report.coverage.total_evidence_units, 0);
        let profile = report.persona.document().section(SectionKind::Profile).unwrap();
        assert_eq!(profile.claims[0].text, "Name: The Octocat");
        assert_grounded(&report, &store);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start_aborts() {
        let cancellation = JobCancellation::new();
        cancellation.cancel();
        let ctx = JobContext::new(store(true)).with_cancellation(cancellation);
        let err = ProfilePipeline::new(Arc::new(ScriptedSubAgent::new()))
            .run(&ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Aborted(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_narration_is_validated_and_failures_tolerated() {
        let store = store(true);
        let pipeline = ProfilePipeline::new(Arc::new(ScriptedSubAgent::new()))
            .with_narrator(Arc::new(TemplateNarrator));
        let report = pipeline.run(&JobContext::new(store.clone())).await.unwrap();
        let summary = report.persona.document().section(SectionKind::Summary).unwrap();
        assert_eq!(summary.claims[0].text, "Core stack: Rust");
        assert!(!summary.claims[0].derived_from.is_empty());
        assert_grounded(&report, &store);

        let llm = Arc::new(ScriptedLlm::new(vec![Err(LlmError::Timeout)]));
        let pipeline = ProfilePipeline::new(Arc::new(ScriptedSubAgent::new()))
            .with_narrator(Arc::new(LlmNarrator::new(llm.clone())));
        let report = pipeline.run(&JobContext::new(store)).await.unwrap();
        assert!(report.persona.document().section(SectionKind::Summary).is_none());
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repository_cap_limits_the_job() {
        let store = store(true);
        let report = ProfilePipeline::new(Arc::new(ScriptedSubAgent::new()))
            .with_max_repositories(1)
            .run(&JobContext::new(store))
            .await
            .unwrap();
        // Highest-starred repository first.
        assert_eq!(report.coverage.total_evidence_units, 1);
        assert_eq!(report.coverage.analyzed_units, 1);
        assert!(report.audit_report.contains("raft-kv"));
    }

    #[test]
    fn test_from_config_rejects_invalid_settings() {
        let mut config = KognitConfig::default();
        config.policy.max_concurrency = 0;
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let err = ProfilePipeline::from_config(&config, llm.clone()).unwrap_err();
        assert!(matches!(err, PipelineError::Config(ConfigError::OutOfRange { .. })));

        assert!(ProfilePipeline::from_config(&KognitConfig::default(), llm).is_ok());
    }
}
