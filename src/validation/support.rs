//! Lexical grounding: how much of a claim the referenced evidence supports.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::evidence::{EvidenceField, EvidenceRecord};
use crate::tasks::{Citation, RoleAssertion};
use crate::utilities::string_utils::{contains_normalized, key_terms, term_in_tokens};

/// Key terms of a claim and the subset found in the evidence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupportScore {
    pub terms: BTreeSet<String>,
    pub matched: BTreeSet<String>,
}

impl SupportScore {
    /// Matched over total key terms. A claim with no key terms asserts
    /// nothing checkable and scores zero.
    pub fn ratio(&self) -> f64 {
        if self.terms.is_empty() {
            0.0
        } else {
            self.matched.len() as f64 / self.terms.len() as f64
        }
    }

    pub fn passes(&self, strictness: f64) -> bool {
        !self.terms.is_empty() && self.ratio() + f64::EPSILON >= strictness
    }

    pub fn missing(&self) -> impl Iterator<Item = &String> {
        self.terms.difference(&self.matched)
    }
}

/// Score `text` against the union of the records' token corpora.
///
/// Terms that only name a field or the subject (metadata keys, repository
/// names) are left out unless the evidence itself mentions them.
pub fn score_support(text: &str, records: &[Arc<EvidenceRecord>]) -> SupportScore {
    let corpus: BTreeSet<String> = records.iter().flat_map(|r| r.token_corpus()).collect();
    let labels: BTreeSet<String> = records.iter().flat_map(|r| r.label_tokens()).collect();
    let terms: BTreeSet<String> = key_terms(text)
        .into_iter()
        .filter(|t| !labels.contains(t) || term_in_tokens(t, &corpus))
        .collect();
    let matched = terms
        .iter()
        .filter(|t| term_in_tokens(t, &corpus))
        .cloned()
        .collect();
    SupportScore { terms, matched }
}

/// Whether a citation holds in at least one record: the field exists and,
/// when a quote is given, contains it.
pub fn citation_holds(citation: &Citation, records: &[Arc<EvidenceRecord>]) -> bool {
    let Some(field) = EvidenceField::parse(&citation.field) else {
        return false;
    };
    records.iter().any(|record| match record.field_text(&field) {
        Some(text) => citation
            .quote
            .as_deref()
            .map_or(true, |quote| contains_normalized(&text, quote)),
        None => false,
    })
}

/// Whether `assertion` agrees with the cited field of `record`. Only
/// metadata fields hold a single value; other citations always agree.
pub fn assertion_agrees(record: &EvidenceRecord, citation: &Citation, assertion: &RoleAssertion) -> bool {
    match EvidenceField::parse(&citation.field) {
        Some(field @ EvidenceField::Metadata(_)) => record
            .field_text(&field)
            .is_some_and(|text| contains_normalized(&text, &assertion.value)),
        _ => true,
    }
}
