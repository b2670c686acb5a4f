//! Narration of the summary section.
//!
//! A narrator turns already-placed claims into a few summary statements.
//! Every statement names the claims it was derived from; the synthesizer
//! copies their evidence references onto it and the validator checks it like
//! any other claim. A narrator never sees raw evidence.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::narrative::NarrativeParams;
use super::persona::{ClaimRank, PersonaDocument, SectionKind};
use crate::llms::base_llm::{BaseLLM, BaseLLMState, LLMMessage};
use crate::tasks::ClaimId;
use crate::types::usage_metrics::UsageMetrics;
use crate::utilities::errors::NarrationError;
use crate::utilities::string_utils::join_human;

/// Statements kept from one narration.
pub const MAX_STATEMENTS: usize = 5;

/// A summary sentence and the claims it restates.
#[derive(Debug, Clone, PartialEq)]
pub struct NarratedStatement {
    pub text: String,
    pub derived_from: Vec<ClaimId>,
}

impl NarratedStatement {
    pub fn new(text: impl Into<String>, derived_from: impl IntoIterator<Item = ClaimId>) -> Self {
        Self {
            text: text.into(),
            derived_from: derived_from.into_iter().collect(),
        }
    }
}

/// Produces summary statements from a draft persona.
#[async_trait]
pub trait Narrator: Send + Sync + fmt::Debug {
    async fn narrate(
        &self,
        draft: &PersonaDocument,
        params: &NarrativeParams,
    ) -> Result<Vec<NarratedStatement>, NarrationError>;

    fn usage(&self) -> UsageMetrics {
        UsageMetrics::default()
    }
}

// ---------------------------------------------------------------------------
// Template narrator
// ---------------------------------------------------------------------------

/// Deterministic narrator: one statement listing the winning role values.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateNarrator;

#[async_trait]
impl Narrator for TemplateNarrator {
    async fn narrate(
        &self,
        draft: &PersonaDocument,
        _params: &NarrativeParams,
    ) -> Result<Vec<NarratedStatement>, NarrationError> {
        let Some(roles) = draft.section(SectionKind::PrimaryRoles) else {
            return Ok(Vec::new());
        };

        let mut values: Vec<String> = Vec::new();
        let mut seen = BTreeSet::new();
        let mut sources = Vec::new();
        for claim in roles.claims.iter().filter(|c| c.rank == ClaimRank::Primary) {
            let Some(assertion) = &claim.assertion else {
                continue;
            };
            if seen.insert(assertion.normalized_value()) {
                values.push(assertion.value.clone());
            }
            sources.push(claim.id.clone());
        }
        if values.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![NarratedStatement::new(
            format!("Core stack: {}", join_human(&values)),
            sources,
        )])
    }
}

// ---------------------------------------------------------------------------
// LLM narrator
// ---------------------------------------------------------------------------

const NARRATOR_PROMPT: &str = r#"You write the summary of a developer profile.
You are given numbered claims that have already been extracted from evidence.
Write at most five short sentences. Each sentence may only restate facts from
the claims it cites. Do not add facts.

Respond with a single JSON object and nothing else:
{"statements": [{"text": "<sentence>", "claim_ids": ["<id>", ...]}]}"#;

#[derive(Debug, Deserialize)]
struct WireNarration {
    statements: Vec<WireStatement>,
}

#[derive(Debug, Deserialize)]
struct WireStatement {
    text: String,
    claim_ids: Vec<String>,
}

/// Narrator backed by an LLM.
#[derive(Debug, Clone)]
pub struct LlmNarrator {
    llm: Arc<dyn BaseLLM>,
}

impl LlmNarrator {
    pub fn new(llm: Arc<dyn BaseLLM>) -> Self {
        Self { llm }
    }

    fn messages(draft: &PersonaDocument, params: &NarrativeParams) -> Vec<LLMMessage> {
        let mut system = NARRATOR_PROMPT.to_string();
        if let Some(directive) = params.tone.prompt_directive() {
            system.push_str("\n\n");
            system.push_str(&directive);
        }
        if let Some(custom) = &params.custom_instructions {
            system.push_str("\n\nUser custom instructions:\n");
            system.push_str(custom.trim());
        }

        let mut lines = Vec::new();
        if let Some(subject) = &draft.global_metadata.subject {
            lines.push(format!("Developer: {subject}"));
        }
        lines.push("Claims:".to_string());
        for (kind, claim) in draft.claims().filter(|(k, _)| *k != SectionKind::Summary) {
            lines.push(format!("- [{}] ({}) {}", claim.id, kind.title(), claim.text));
        }
        vec![LLMMessage::system(system), LLMMessage::user(lines.join("\n"))]
    }

    /// Parse the model response, dropping statements with no known claim.
    fn parse(response: &str, draft: &PersonaDocument) -> Result<Vec<NarratedStatement>, NarrationError> {
        let value = BaseLLMState::extract_json(response).ok_or_else(|| NarrationError::Malformed {
            message: "response contains no JSON object".to_string(),
        })?;
        let wire: WireNarration = serde_json::from_value(value).map_err(|e| NarrationError::Malformed {
            message: e.to_string(),
        })?;

        let statements = wire
            .statements
            .into_iter()
            .filter_map(|s| {
                let text = s.text.trim().to_string();
                let ids: Vec<ClaimId> = s
                    .claim_ids
                    .iter()
                    .map(|id| ClaimId::from(id.trim()))
                    .filter(|id| draft.claim(id).is_some())
                    .collect();
                if text.is_empty() || ids.is_empty() {
                    log::debug!("Dropping narrated statement without known claims: {}", text);
                    return None;
                }
                Some(NarratedStatement::new(text, ids))
            })
            .take(MAX_STATEMENTS)
            .collect();
        Ok(statements)
    }
}

#[async_trait]
impl Narrator for LlmNarrator {
    async fn narrate(
        &self,
        draft: &PersonaDocument,
        params: &NarrativeParams,
    ) -> Result<Vec<NarratedStatement>, NarrationError> {
        if draft.claim_count() == 0 {
            return Ok(Vec::new());
        }
        let response = self.llm.acall(&Self::messages(draft, params)).await?;
        Self::parse(&response, draft)
    }

    fn usage(&self) -> UsageMetrics {
        self.llm.get_token_usage_summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::EvidenceId;
    use crate::synthesis::narrative::Tone;
    use crate::synthesis::persona::DocClaim;
    use crate::tasks::{Claim, RoleAssertion, TechRole};
    use crate::testing::{doc_claim, document, ScriptedLlm};

    fn role_claim(value: &str, rank: ClaimRank) -> DocClaim {
        let claim = Claim::new(
            format!("Primary language is {value}"),
            [EvidenceId::repository("octocat/raft-kv")],
            0.9,
        )
        .with_assertion(RoleAssertion::new(TechRole::PrimaryLanguage, value));
        DocClaim::from_claim(&claim, rank)
    }

    fn draft() -> PersonaDocument {
        document(vec![
            (SectionKind::Summary, vec![]),
            (
                SectionKind::PrimaryRoles,
                vec![role_claim("Rust", ClaimRank::Primary), role_claim("Go", ClaimRank::Secondary)],
            ),
            (
                SectionKind::ProjectHighlights,
                vec![doc_claim("raft-kv: distributed store", &[EvidenceId::repository("octocat/raft-kv")])],
            ),
        ])
    }

    #[tokio::test]
    async fn test_template_lists_primary_roles_only() {
        let draft = draft();
        let statements = TemplateNarrator.narrate(&draft, &NarrativeParams::default()).await.unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].text, "Core stack: Rust");
        assert_eq!(statements[0].derived_from, vec![draft.sections[1].claims[0].id.clone()]);

        let empty = document(vec![(SectionKind::Summary, vec![])]);
        assert!(TemplateNarrator.narrate(&empty, &NarrativeParams::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_llm_statements_must_cite_known_claims() {
        let draft = draft();
        let rust = draft.sections[1].claims[0].id.clone();
        let response = format!(
            r#"Sure! {{"statements": [
                {{"text": "Writes Rust.", "claim_ids": ["{rust}", "ffffffffffffffff"]}},
                {{"text": "Invented fact.", "claim_ids": ["ffffffffffffffff"]}},
                {{"text": "  ", "claim_ids": ["{rust}"]}}
            ]}}"#
        );
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(response)]));
        let narrator = LlmNarrator::new(llm.clone());
        let params = NarrativeParams::default().with_tone(Tone::Roast);

        let statements = narrator.narrate(&draft, &params).await.unwrap();
        assert_eq!(statements, vec![NarratedStatement::new("Writes Rust.", [rust.clone()])]);

        let messages = llm.last_messages().unwrap();
        assert!(messages[0].content.contains("TONE: Roast"));
        assert!(messages[1].content.contains(rust.as_str()));
    }

    #[tokio::test]
    async fn test_malformed_response_is_an_error() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok("no json here".to_string())]));
        let err = LlmNarrator::new(llm).narrate(&draft(), &NarrativeParams::default()).await;
        assert!(matches!(err, Err(NarrationError::Malformed { .. })));
    }

    #[tokio::test]
    async fn test_empty_draft_skips_the_model() {
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let narrator = LlmNarrator::new(llm.clone());
        let empty = document(vec![(SectionKind::Summary, vec![])]);
        assert!(narrator.narrate(&empty, &NarrativeParams::default()).await.unwrap().is_empty());
        assert_eq!(llm.calls(), 0);
    }
}
