//! Sub-agents: isolated analysis of exactly one evidence record.
//!
//! A sub-agent sees one record and nothing else. Its claims may only cite
//! fields of that record, and a claim that cannot be tied to a field that
//! actually contains the quoted text is omitted before the finding leaves
//! the agent.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::parser::{parse_analysis, ProposedClaim};
use super::prompts::{analysis_messages, DEFAULT_MAX_CONTENT_CHARS};
use crate::evidence::{EvidenceField, EvidenceRecord};
use crate::llms::base_llm::BaseLLM;
use crate::synthesis::narrative::Tone;
use crate::tasks::{Citation, Claim, Finding};
use crate::types::usage_metrics::UsageMetrics;
use crate::utilities::errors::{AnalysisError, SubAgentError};
use crate::utilities::string_utils::contains_normalized;
use crate::validation::support::assertion_agrees;

/// Analyzes one evidence record into a [`Finding`].
#[async_trait]
pub trait SubAgent: Send + Sync + fmt::Debug {
    /// Run one bounded analysis cycle. `task_id` is recorded as the finding's
    /// source task.
    async fn analyze(&self, task_id: Uuid, record: &EvidenceRecord) -> Result<Finding, SubAgentError>;

    /// Token usage accumulated by this agent.
    fn usage(&self) -> UsageMetrics {
        UsageMetrics::default()
    }
}

/// Reject evidence no model call could make sense of.
pub fn check_analyzable(record: &EvidenceRecord) -> Result<(), AnalysisError> {
    if !record.is_analyzable() {
        return Err(AnalysisError::EmptyEvidence {
            evidence: record.id().to_string(),
        });
    }
    if record.raw_content().contains('\0') && record.description().is_none() {
        return Err(AnalysisError::UnreadableEvidence {
            evidence: record.id().to_string(),
            reason: "raw content is binary".to_string(),
        });
    }
    Ok(())
}

fn citation_holds(record: &EvidenceRecord, citation: &Citation) -> bool {
    let Some(field) = EvidenceField::parse(&citation.field) else {
        return false;
    };
    let Some(text) = record.field_text(&field) else {
        return false;
    };
    match &citation.quote {
        Some(quote) => contains_normalized(&text, quote),
        None => true,
    }
}

/// Turn proposed claims into claims referencing `record`, keeping only
/// citations that hold and dropping claims left with none. A claim whose
/// role contradicts a metadata field it cites is dropped outright.
pub fn ground_claims(record: &EvidenceRecord, proposed: Vec<ProposedClaim>) -> Vec<Claim> {
    let id = record.id();
    proposed
        .into_iter()
        .filter_map(|p| {
            if let Some(role) = &p.role {
                if let Some(c) = p.citations.iter().find(|c| !assertion_agrees(record, c, role)) {
                    log::debug!("Omitting claim on {} contradicting {}: {}", id, c.field, p.text);
                    return None;
                }
            }
            let citations: Vec<Citation> = p
                .citations
                .into_iter()
                .filter(|c| citation_holds(record, c))
                .collect();
            if citations.is_empty() {
                log::debug!("Omitting ungrounded claim on {}: {}", id, p.text);
                return None;
            }
            let mut claim = Claim::new(p.text, [id.clone()], p.confidence);
            claim.citations = citations;
            claim.assertion = p.role;
            Some(claim)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// LLM-backed sub-agent
// ---------------------------------------------------------------------------

/// Prompt-level settings of an [`LlmSubAgent`].
#[derive(Debug, Clone, PartialEq)]
pub struct SubAgentConfig {
    pub tone: Tone,
    pub custom_instructions: Option<String>,
    pub max_content_chars: usize,
}

impl Default for SubAgentConfig {
    fn default() -> Self {
        Self {
            tone: Tone::Professional,
            custom_instructions: None,
            max_content_chars: DEFAULT_MAX_CONTENT_CHARS,
        }
    }
}

/// Sub-agent that asks an LLM for a structured analysis.
#[derive(Debug, Clone)]
pub struct LlmSubAgent {
    llm: Arc<dyn BaseLLM>,
    config: SubAgentConfig,
}

impl LlmSubAgent {
    pub fn new(llm: Arc<dyn BaseLLM>) -> Self {
        Self {
            llm,
            config: SubAgentConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SubAgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SubAgentConfig {
        &self.config
    }
}

#[async_trait]
impl SubAgent for LlmSubAgent {
    async fn analyze(&self, task_id: Uuid, record: &EvidenceRecord) -> Result<Finding, SubAgentError> {
        check_analyzable(record)?;

        let messages = analysis_messages(
            record,
            self.config.tone,
            self.config.custom_instructions.as_deref(),
            self.config.max_content_chars,
        );
        let response = self.llm.acall(&messages).await?;
        let parsed = parse_analysis(&response)?;

        let proposed = parsed.claims.len();
        let claims = ground_claims(record, parsed.claims);
        if claims.len() < proposed {
            log::info!(
                "{}: kept {} of {} proposed claims after grounding",
                record.id(),
                claims.len(),
                proposed
            );
        }

        Ok(Finding::new(
            task_id,
            record.id(),
            parsed.summary,
            parsed.complexity,
            claims,
            parsed.tech_signals,
        ))
    }

    fn usage(&self) -> UsageMetrics {
        self.llm.get_token_usage_summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::record::{META_DESCRIPTION, META_PRIMARY_LANGUAGE};
    use crate::evidence::EvidenceKind;
    use crate::tasks::{RoleAssertion, TechRole};
    use crate::testing::ScriptedLlm;
    use crate::utilities::errors::{LlmError, TransientError};

    fn record() -> EvidenceRecord {
        EvidenceRecord::new(
            EvidenceKind::Repository,
            "octocat/raft-kv",
            "# raft-kv\nA key-value store. Consensus via Raft.",
            "https://github.com/octocat/raft-kv",
        )
        .with_metadata(META_PRIMARY_LANGUAGE, "Rust")
    }

    fn proposed(text: &str, field: &str, quote: Option<&str>) -> ProposedClaim {
        ProposedClaim {
            text: text.to_string(),
            confidence: 0.7,
            citations: vec![Citation::new(field, quote.map(str::to_string))],
            role: None,
        }
    }

    #[test]
    fn test_ground_claims_drops_unverifiable_citations() {
        let claims = ground_claims(
            &record(),
            vec![
                proposed("Uses Raft", "raw_content", Some("consensus  via raft")),
                proposed("Written in Rust", "metadata.primary_language", None),
                proposed("Invented Paxos", "raw_content", Some("Paxos")),
                proposed("Has CI", "metadata.ci", None),
                proposed("Reads commits", "commits", None),
            ],
        );
        let texts: Vec<_> = claims.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["Uses Raft", "Written in Rust"]);
        assert!(claims
            .iter()
            .all(|c| c.evidence_refs.len() == 1 && c.evidence_refs.contains(&record().id())));
    }

    #[test]
    fn test_ground_claims_drops_roles_contradicting_metadata() {
        let with_role = |text: &str, value: &str| ProposedClaim {
            role: Some(RoleAssertion::new(TechRole::PrimaryLanguage, value)),
            ..proposed(text, "metadata.primary_language", None)
        };
        let claims = ground_claims(
            &record(),
            vec![
                with_role("Primary language is Haskell", "Haskell"),
                with_role("Primary language is Rust", "Rust"),
            ],
        );
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].text, "Primary language is Rust");
        assert_eq!(
            claims[0].assertion,
            Some(RoleAssertion::new(TechRole::PrimaryLanguage, "Rust"))
        );
    }

    #[test]
    fn test_check_analyzable() {
        let empty = EvidenceRecord::new(EvidenceKind::Repository, "a/empty", "", "");
        assert!(matches!(
            check_analyzable(&empty),
            Err(AnalysisError::EmptyEvidence { .. })
        ));
        let binary = EvidenceRecord::new(EvidenceKind::Repository, "a/bin", "\0\0PK", "");
        assert!(matches!(
            check_analyzable(&binary),
            Err(AnalysisError::UnreadableEvidence { .. })
        ));
        let described = empty.with_metadata(META_DESCRIPTION, "A CLI");
        assert!(check_analyzable(&described).is_ok());
    }

    #[tokio::test]
    async fn test_empty_evidence_never_calls_the_model() {
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let agent = LlmSubAgent::new(llm.clone());
        let empty = EvidenceRecord::new(EvidenceKind::Repository, "a/empty", " ", "");
        let err = agent.analyze(Uuid::new_v4(), &empty).await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_analyze_builds_grounded_finding() {
        let response = r#"{"summary": "Raft KV store", "complexity_score": 7,
            "tech_signals": [{"technology": "Rust", "confidence": 0.9}],
            "claims": [
              {"text": "Implements Raft consensus", "confidence": 0.85,
               "citations": [{"field": "raw_content", "quote": "Consensus via Raft"}]},
              {"text": "Expert in Kubernetes operators", "confidence": 0.6,
               "citations": [{"field": "raw_content", "quote": "Kubernetes operator"}]}
            ]}"#;
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(response.to_string())]));
        let agent = LlmSubAgent::new(llm.clone());
        let task_id = Uuid::new_v4();

        let finding = agent.analyze(task_id, &record()).await.unwrap();
        assert_eq!(finding.source_task_id(), task_id);
        assert_eq!(finding.complexity(), 7);
        assert_eq!(finding.claims().len(), 1);
        assert_eq!(finding.claims()[0].text, "Implements Raft consensus");
        assert_eq!(agent.usage().successful_requests, 1);
    }

    #[tokio::test]
    async fn test_malformed_output_is_transient() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok("not json".to_string())]));
        let agent = LlmSubAgent::new(llm);
        let err = agent.analyze(Uuid::new_v4(), &record()).await.unwrap_err();
        assert!(matches!(
            err,
            SubAgentError::Transient(TransientError::MalformedOutput { .. })
        ));
    }

    #[tokio::test]
    async fn test_provider_errors_are_classified() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Err(LlmError::RateLimited { message: "429".into() }),
            Err(LlmError::Client { status: 401, message: "bad key".into() }),
        ]));
        let agent = LlmSubAgent::new(llm);
        assert!(agent.analyze(Uuid::new_v4(), &record()).await.unwrap_err().is_retryable());
        assert!(!agent.analyze(Uuid::new_v4(), &record()).await.unwrap_err().is_retryable());
    }
}
