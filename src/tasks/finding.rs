//! Structured output of a sub-agent task: claims, technology signals and the
//! per-repository summary.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::evidence::EvidenceId;

// ---------------------------------------------------------------------------
// Claim identity
// ---------------------------------------------------------------------------

/// Stable identifier of a claim, derived from its text and evidence refs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimId(String);

impl ClaimId {
    /// First 16 hex chars of SHA-256 over the text and the sorted refs.
    pub fn compute<'a>(text: &str, refs: impl IntoIterator<Item = &'a EvidenceId>) -> Self {
        let mut refs: Vec<String> = refs.into_iter().map(ToString::to_string).collect();
        refs.sort();
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        for r in &refs {
            hasher.update([0u8]);
            hasher.update(r.as_bytes());
        }
        let digest = hex::encode(hasher.finalize());
        Self(digest[..16].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClaimId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ---------------------------------------------------------------------------
// Citations and role assertions
// ---------------------------------------------------------------------------

/// Back-reference from a claim to the field it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Citation {
    /// `raw_content`, `source_uri` or `metadata.<key>`.
    pub field: String,
    /// Verbatim span of that field, when the claim quotes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<String>,
}

impl Citation {
    pub fn new(field: impl Into<String>, quote: Option<String>) -> Self {
        Self {
            field: field.into(),
            quote: quote.filter(|q| !q.trim().is_empty()),
        }
    }
}

/// Technology roles whose values can contradict each other across findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechRole {
    PrimaryLanguage,
    PrimaryFramework,
    Specialization,
    Domain,
}

impl TechRole {
    pub fn label(&self) -> &'static str {
        match self {
            Self::PrimaryLanguage => "primary language",
            Self::PrimaryFramework => "primary framework",
            Self::Specialization => "specialization",
            Self::Domain => "domain",
        }
    }
}

impl std::str::FromStr for TechRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "primary_language" | "language" => Ok(Self::PrimaryLanguage),
            "primary_framework" | "framework" => Ok(Self::PrimaryFramework),
            "specialization" | "specialisation" => Ok(Self::Specialization),
            "domain" => Ok(Self::Domain),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// A claim that the subject holds `role` with `value` (e.g. primary language
/// Rust). Two assertions of the same role with different values conflict.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleAssertion {
    pub role: TechRole,
    pub value: String,
}

impl RoleAssertion {
    pub fn new(role: TechRole, value: impl Into<String>) -> Self {
        Self {
            role,
            value: value.into().trim().to_string(),
        }
    }

    /// Case-insensitive value used to group equivalent assertions.
    pub fn normalized_value(&self) -> String {
        self.value.to_lowercase()
    }
}

// ---------------------------------------------------------------------------
// Claim
// ---------------------------------------------------------------------------

/// An assertion that must trace back to evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub text: String,
    pub evidence_refs: BTreeSet<EvidenceId>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assertion: Option<RoleAssertion>,
}

impl Claim {
    pub fn new(
        text: impl Into<String>,
        evidence_refs: impl IntoIterator<Item = EvidenceId>,
        confidence: f64,
    ) -> Self {
        debug_assert!(
            (0.0..=1.0).contains(&confidence),
            "claim confidence {confidence} outside [0, 1]"
        );
        Self {
            text: text.into(),
            evidence_refs: evidence_refs.into_iter().collect(),
            confidence,
            citations: Vec::new(),
            assertion: None,
        }
    }

    pub fn with_citation(mut self, citation: Citation) -> Self {
        self.citations.push(citation);
        self
    }

    pub fn with_assertion(mut self, assertion: RoleAssertion) -> Self {
        self.assertion = Some(assertion);
        self
    }

    pub fn id(&self) -> ClaimId {
        ClaimId::compute(&self.text, &self.evidence_refs)
    }

    /// Claims without references are unsupported by construction.
    pub fn is_unsupported(&self) -> bool {
        self.evidence_refs.is_empty()
    }
}

/// A technology detected in one unit of evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechSignal {
    pub technology: String,
    pub confidence: f64,
}

impl TechSignal {
    pub fn new(technology: impl Into<String>, confidence: f64) -> Self {
        debug_assert!(
            (0.0..=1.0).contains(&confidence),
            "signal confidence {confidence} outside [0, 1]"
        );
        Self {
            technology: technology.into().trim().to_string(),
            confidence,
        }
    }
}

// ---------------------------------------------------------------------------
// Finding
// ---------------------------------------------------------------------------

/// Result of exactly one successful sub-agent task. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    source_task_id: Uuid,
    evidence: EvidenceId,
    summary: String,
    complexity: u8,
    claims: Vec<Claim>,
    tech_signals: Vec<TechSignal>,
}

impl Finding {
    /// Build a finding. Claims are deduplicated by id (first occurrence kept,
    /// order preserved); tech signals are deduplicated case-insensitively,
    /// keeping the highest confidence, and sorted by name.
    pub fn new(
        source_task_id: Uuid,
        evidence: EvidenceId,
        summary: impl Into<String>,
        complexity: u8,
        claims: Vec<Claim>,
        tech_signals: Vec<TechSignal>,
    ) -> Self {
        debug_assert!((1..=10).contains(&complexity), "complexity {complexity} outside 1..=10");
        let mut seen = BTreeSet::new();
        let claims = claims.into_iter().filter(|c| seen.insert(c.id())).collect();

        let mut signals: BTreeMap<String, TechSignal> = BTreeMap::new();
        for signal in tech_signals.into_iter().filter(|s| !s.technology.is_empty()) {
            let key = signal.technology.to_lowercase();
            match signals.get(&key) {
                Some(existing) if existing.confidence >= signal.confidence => {}
                _ => {
                    signals.insert(key, signal);
                }
            }
        }

        Self {
            source_task_id,
            evidence,
            summary: summary.into(),
            complexity,
            claims,
            tech_signals: signals.into_values().collect(),
        }
    }

    pub fn source_task_id(&self) -> Uuid {
        self.source_task_id
    }

    /// The evidence record this finding was derived from.
    pub fn evidence(&self) -> &EvidenceId {
        &self.evidence
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Complexity score, 1 to 10.
    pub fn complexity(&self) -> u8 {
        self.complexity
    }

    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    pub fn tech_signals(&self) -> &[TechSignal] {
        &self.tech_signals
    }
}
