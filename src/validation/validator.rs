//! Validator: re-checks every claim of a draft persona against the evidence
//! store and decides which claims survive, which are rewritten and which
//! are dropped.
//!
//! Checks, in order:
//!
//! 1. the claim has at least one evidence reference
//! 2. every reference resolves in the store
//! 3. every citation holds in a referenced record, and a role assertion
//!    matches the metadata it cites
//! 4. enough key terms of the text occur in the referenced records
//!
//! A narrated claim is also rejected when any claim it was derived from was
//! rejected. Validation is a pure function of the draft and the store.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::support::{assertion_agrees, citation_holds, score_support, SupportScore};
use crate::evidence::{EvidenceRecord, EvidenceStore};
use crate::synthesis::persona::{DocClaim, PersonaDocument, SectionKind};
use crate::tasks::ClaimId;
use crate::utilities::errors::{ConfigError, RejectionReason, ValidationFailure};
use crate::utilities::string_utils::join_human;

/// Default fraction of key terms that must be found in the evidence.
pub const DEFAULT_STRICTNESS: f64 = 0.6;

/// Terms named in a hedged rewrite.
const MAX_HEDGE_TERMS: usize = 5;

fn default_strictness() -> f64 {
    DEFAULT_STRICTNESS
}

/// Validation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    #[serde(default = "default_strictness")]
    pub strictness: f64,
    /// Probe external links over HTTP and drop unreachable ones.
    #[serde(default)]
    pub check_links: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            strictness: default_strictness(),
            check_links: false,
        }
    }
}

impl ValidatorConfig {
    pub fn validated(self) -> Result<Self, ConfigError> {
        if !(self.strictness > 0.0 && self.strictness <= 1.0) {
            return Err(ConfigError::out_of_range(format!(
                "strictness must be within (0, 1], got {}",
                self.strictness
            )));
        }
        Ok(self)
    }
}

/// Outcome of one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub accepted_claims: BTreeSet<ClaimId>,
    pub rejected_claims: BTreeMap<ClaimId, RejectionReason>,
    /// Hedged replacement text for rejected essential claims.
    pub rewrites: BTreeMap<ClaimId, String>,
    /// Details of every rejection, sorted by claim id.
    pub failures: Vec<ValidationFailure>,
}

impl ValidationResult {
    pub fn is_accepted(&self, id: &ClaimId) -> bool {
        self.accepted_claims.contains(id)
    }

    pub fn is_rejected(&self, id: &ClaimId) -> bool {
        self.rejected_claims.contains_key(id)
    }

    /// Text a claim may appear with in the final document, if any.
    pub fn final_text<'a>(&'a self, claim: &'a DocClaim) -> Option<&'a str> {
        if self.is_accepted(&claim.id) {
            Some(&claim.text)
        } else {
            self.rewrites.get(&claim.id).map(String::as_str)
        }
    }
}

/// Grounds draft claims in the evidence store.
#[derive(Debug, Clone, PartialEq)]
pub struct Validator {
    strictness: f64,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(DEFAULT_STRICTNESS)
    }
}

impl Validator {
    pub fn new(strictness: f64) -> Self {
        Self { strictness }
    }

    pub fn from_config(config: &ValidatorConfig) -> Self {
        Self::new(config.strictness)
    }

    pub fn strictness(&self) -> f64 {
        self.strictness
    }

    /// Validate every claim of `draft` against `store`.
    pub fn validate(&self, draft: &PersonaDocument, store: &EvidenceStore) -> ValidationResult {
        let mut result = ValidationResult::default();
        let mut decided: BTreeSet<ClaimId> = BTreeSet::new();

        // Narrated claims are judged after the claims they restate.
        let (derived, direct): (Vec<_>, Vec<_>) =
            draft.claims().partition(|(_, claim)| !claim.derived_from.is_empty());

        for (kind, claim) in direct.into_iter().chain(derived) {
            if !decided.insert(claim.id.clone()) {
                continue;
            }
            let outcome = self
                .check_derivation(claim, &result)
                .and_then(|()| self.check(claim, store));
            match outcome {
                Ok(_) => {
                    result.accepted_claims.insert(claim.id.clone());
                }
                Err(rejection) => {
                    log::debug!(
                        "Rejected claim {} ({}): {}",
                        claim.id,
                        rejection.failure.reason,
                        claim.text
                    );
                    if let Some(text) = self.rewrite(kind, &rejection) {
                        result.rewrites.insert(claim.id.clone(), text);
                    }
                    result
                        .rejected_claims
                        .insert(claim.id.clone(), rejection.failure.reason.clone());
                    result.failures.push(rejection.failure);
                }
            }
        }
        result.failures.sort_by(|a, b| a.claim_id.cmp(&b.claim_id));

        log::info!(
            "Validation: {} accepted, {} rejected, {} rewritten",
            result.accepted_claims.len(),
            result.rejected_claims.len(),
            result.rewrites.len()
        );
        result
    }

    fn check_derivation(&self, claim: &DocClaim, result: &ValidationResult) -> Result<(), Rejection> {
        match claim.derived_from.iter().find(|id| result.is_rejected(id)) {
            Some(source) => {
                log::debug!("Claim {} restates rejected claim {}", claim.id, source);
                Err(Rejection::new(claim, RejectionReason::InsufficientSupport, Vec::new(), SupportScore::default()))
            }
            None => Ok(()),
        }
    }

    /// Check one claim. On success returns its support score.
    fn check(&self, claim: &DocClaim, store: &EvidenceStore) -> Result<SupportScore, Rejection> {
        if claim.evidence_refs.is_empty() {
            return Err(Rejection::new(claim, RejectionReason::NoEvidence, Vec::new(), SupportScore::default()));
        }
        let records = store.resolve(&claim.evidence_refs);
        if records.len() < claim.evidence_refs.len() {
            return Err(Rejection::new(
                claim,
                RejectionReason::UnresolvedReferences,
                Vec::new(),
                SupportScore::default(),
            ));
        }

        let score = score_support(&claim.text, &records);
        if !claim.citations.iter().all(|c| citation_holds(c, &records)) {
            return Err(Rejection::new(claim, RejectionReason::QuoteNotFound, records, score));
        }
        if let Some(assertion) = &claim.assertion {
            let agrees = claim
                .citations
                .iter()
                .all(|c| records.iter().any(|r| assertion_agrees(r, c, assertion)));
            if !agrees {
                return Err(Rejection::new(claim, RejectionReason::QuoteNotFound, records, score));
            }
        }
        if !score.passes(self.strictness) {
            return Err(Rejection::new(claim, RejectionReason::InsufficientSupport, records, score));
        }
        Ok(score)
    }

    /// Hedged text for a rejected essential claim whose references resolve
    /// and of which at least one term is confirmed.
    fn rewrite(&self, kind: SectionKind, rejection: &Rejection) -> Option<String> {
        let rewritable = matches!(
            rejection.failure.reason,
            RejectionReason::QuoteNotFound | RejectionReason::InsufficientSupport
        );
        if !kind.is_essential() || !rewritable || rejection.score.matched.is_empty() || rejection.records.is_empty() {
            return None;
        }
        let sources: BTreeSet<String> = rejection
            .records
            .iter()
            .map(|r| r.display_name().to_string())
            .collect();
        let terms: Vec<String> = rejection
            .score
            .matched
            .iter()
            .take(MAX_HEDGE_TERMS)
            .cloned()
            .collect();
        Some(format!(
            "Evidence in {} mentions {}; broader claims could not be verified",
            join_human(&sources.into_iter().collect::<Vec<_>>()),
            join_human(&terms)
        ))
    }
}

/// A failed check with what is needed to hedge it.
struct Rejection {
    failure: ValidationFailure,
    records: Vec<Arc<EvidenceRecord>>,
    score: SupportScore,
}

impl Rejection {
    fn new(claim: &DocClaim, reason: RejectionReason, records: Vec<Arc<EvidenceRecord>>, score: SupportScore) -> Self {
        Self {
            failure: ValidationFailure {
                claim_id: claim.id.to_string(),
                reason,
                support: score.ratio(),
            },
            records,
            score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::record::META_PRIMARY_LANGUAGE;
    use crate::evidence::{EvidenceId, EvidenceKind};
    use crate::evidence::record::META_STARS;
    use crate::tasks::{Citation, RoleAssertion, TechRole};
    use crate::testing::{doc_claim, document};

    fn raft() -> EvidenceId {
        EvidenceId::repository("octocat/raft-kv")
    }

    fn store() -> EvidenceStore {
        EvidenceStore::from_records(vec![EvidenceRecord::new(
            EvidenceKind::Repository,
            "octocat/raft-kv",
            "# raft-kv\nA distributed key-value store written for fun.",
            "https://github.com/octocat/raft-kv",
        )
        .with_metadata(META_PRIMARY_LANGUAGE, "Rust")])
        .unwrap()
    }

    #[test]
    fn test_ungrounded_highlight_is_dropped() {
        let claim = doc_claim("Expert in distributed consensus", &[raft()]);
        let draft = document(vec![(SectionKind::ProjectHighlights, vec![claim.clone()])]);

        let result = Validator::default().validate(&draft, &store());
        assert_eq!(
            result.rejected_claims.get(&claim.id),
            Some(&RejectionReason::InsufficientSupport)
        );
        assert!(result.rewrites.is_empty());
        assert_eq!(result.final_text(&claim), None);
        assert!((result.failures[0].support - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_grounded_claim_is_accepted() {
        let claim = doc_claim("Primary language is Rust", &[raft()]);
        let draft = document(vec![(SectionKind::PrimaryRoles, vec![claim.clone()])]);
        let result = Validator::default().validate(&draft, &store());
        assert!(result.is_accepted(&claim.id));
        assert_eq!(result.final_text(&claim), Some("Primary language is Rust"));
    }

    #[test]
    fn test_essential_claim_is_hedged_not_repeated() {
        let claim = doc_claim("Specialization: distributed consensus protocols", &[raft()]);
        let draft = document(vec![(SectionKind::PrimaryRoles, vec![claim.clone()])]);

        let result = Validator::default().validate(&draft, &store());
        assert!(result.is_rejected(&claim.id));
        let rewrite = result.rewrites.get(&claim.id).unwrap();
        assert_eq!(
            rewrite,
            "Evidence in raft-kv mentions distributed; broader claims could not be verified"
        );
        assert_ne!(rewrite, &claim.text);
    }

    #[test]
    fn test_unresolved_and_missing_references() {
        let orphan = doc_claim("Primary language is Rust", &[EvidenceId::repository("ghost/repo")]);
        let partial = doc_claim("Writes Rust", &[raft(), EvidenceId::repository("ghost/repo")]);
        let floating = doc_claim("Writes Rust", &[]);
        let draft = document(vec![(
            SectionKind::PrimaryRoles,
            vec![orphan.clone(), partial.clone(), floating.clone()],
        )]);

        let result = Validator::default().validate(&draft, &store());
        assert_eq!(result.rejected_claims[&orphan.id], RejectionReason::UnresolvedReferences);
        assert_eq!(result.rejected_claims[&partial.id], RejectionReason::UnresolvedReferences);
        assert_eq!(result.rejected_claims[&floating.id], RejectionReason::NoEvidence);
        // Nothing is hedged without resolvable evidence.
        assert!(result.rewrites.is_empty());
    }

    #[test]
    fn test_missing_quote_is_rejected() {
        let mut claim = doc_claim("Distributed key-value store", &[raft()]);
        claim.citations = vec![Citation::new("raw_content", Some("Raft consensus".into()))];
        let draft = document(vec![(SectionKind::ProjectHighlights, vec![claim.clone()])]);

        let result = Validator::default().validate(&draft, &store());
        assert_eq!(result.rejected_claims[&claim.id], RejectionReason::QuoteNotFound);
    }

    #[test]
    fn test_fabricated_metadata_claims_are_not_accepted() {
        let store = EvidenceStore::from_records(vec![EvidenceRecord::new(
            EvidenceKind::Repository,
            "octocat/raft-kv",
            "A key-value store.",
            "https://github.com/octocat/raft-kv",
        )
        .with_metadata(META_PRIMARY_LANGUAGE, "Rust")
        .with_metadata(META_STARS, 3_i64)])
        .unwrap();
        let language = |value: &str| {
            let mut claim = doc_claim(&format!("Primary language is {value}"), &[raft()]);
            claim.citations = vec![Citation::new("metadata.primary_language", None)];
            claim.assertion = Some(RoleAssertion::new(TechRole::PrimaryLanguage, value));
            claim
        };
        let haskell = language("Haskell");
        let rust = language("Rust");
        let mut stars = doc_claim("Has 50000 stars", &[raft()]);
        stars.citations = vec![Citation::new("metadata.stars", None)];
        let hosted = doc_claim("Hosted on GitHub by octocat", &[raft()]);
        let draft = document(vec![
            (SectionKind::PrimaryRoles, vec![haskell.clone(), rust.clone()]),
            (SectionKind::ProjectHighlights, vec![stars.clone(), hosted.clone()]),
        ]);

        let result = Validator::default().validate(&draft, &store);
        assert!(result.is_accepted(&rust.id));
        assert_eq!(result.rejected_claims[&haskell.id], RejectionReason::QuoteNotFound);
        assert_eq!(result.rejected_claims[&stars.id], RejectionReason::InsufficientSupport);
        assert_eq!(result.rejected_claims[&hosted.id], RejectionReason::InsufficientSupport);
        // No key term of the Haskell claim is confirmed, so nothing is hedged.
        assert_eq!(result.final_text(&haskell), None);
        assert_eq!(result.final_text(&stars), None);
    }

    #[test]
    fn test_strictness_is_configurable() {
        let claim = doc_claim("Expert in distributed consensus", &[raft()]);
        let draft = document(vec![(SectionKind::ProjectHighlights, vec![claim.clone()])]);
        let lenient = Validator::from_config(&ValidatorConfig {
            strictness: 0.5,
            check_links: false,
        });
        assert!(lenient.validate(&draft, &store()).is_accepted(&claim.id));
        assert!(ValidatorConfig { strictness: 0.0, check_links: false }.validated().is_err());
        assert!(ValidatorConfig::default().validated().is_ok());
    }

    #[test]
    fn test_narration_of_rejected_claim_is_rejected() {
        let bad = doc_claim("Expert in distributed consensus", &[raft()]);
        let mut narrated = doc_claim("Distributed store in Rust", &[raft()]);
        narrated.derived_from = vec![bad.id.clone()];
        let draft = document(vec![
            (SectionKind::Summary, vec![narrated.clone()]),
            (SectionKind::ProjectHighlights, vec![bad]),
        ]);

        let result = Validator::default().validate(&draft, &store());
        assert_eq!(result.rejected_claims[&narrated.id], RejectionReason::InsufficientSupport);
    }

    #[test]
    fn test_validation_is_idempotent() {
        let draft = document(vec![
            (
                SectionKind::PrimaryRoles,
                vec![
                    doc_claim("Primary language is Rust", &[raft()]),
                    doc_claim("Specialization: consensus", &[raft()]),
                ],
            ),
            (
                SectionKind::ProjectHighlights,
                vec![
                    doc_claim("Expert in distributed consensus", &[raft()]),
                    doc_claim("Distributed key-value store", &[raft()]),
                ],
            ),
        ]);
        let validator = Validator::default();
        let store = store();
        let first = validator.validate(&draft, &store);
        let second = validator.validate(&draft, &store);
        assert_eq!(first, second);
        assert_eq!(first.accepted_claims.len() + first.rejected_claims.len(), 4);
    }
}
