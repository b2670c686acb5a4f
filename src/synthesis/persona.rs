//! The persona document handed to the renderer.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::narrative::{AnalysisMode, Tone};
use crate::evidence::EvidenceId;
use crate::explorer::finding_set::{Completeness, CoverageReport, FailedUnit};
use crate::tasks::{Citation, Claim, ClaimId, RoleAssertion, TechSignal};

/// Kinds of section a persona can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Summary,
    Profile,
    PrimaryRoles,
    TechnicalDna,
    ProjectHighlights,
    Ecosystem,
}

impl SectionKind {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Summary => "Summary",
            Self::Profile => "Profile",
            Self::PrimaryRoles => "Primary Roles",
            Self::TechnicalDna => "Technical DNA",
            Self::ProjectHighlights => "Project Highlights",
            Self::Ecosystem => "Ecosystem & Connections",
        }
    }

    /// Claims in these sections are kept in hedged form rather than dropped
    /// when they fail validation.
    pub fn is_essential(&self) -> bool {
        matches!(self, Self::Profile | Self::PrimaryRoles)
    }
}

/// Whether a claim won its conflict or was demoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimRank {
    Primary,
    Secondary,
}

/// A claim as placed in the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocClaim {
    pub id: ClaimId,
    pub text: String,
    pub evidence_refs: BTreeSet<EvidenceId>,
    pub confidence: f64,
    pub rank: ClaimRank,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assertion: Option<RoleAssertion>,
    /// Source claims of a narrated statement.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub derived_from: Vec<ClaimId>,
    /// Set when validation replaced the text with a hedged form.
    #[serde(default)]
    pub hedged: bool,
}

impl DocClaim {
    /// Place a finding claim in the document, keeping its identity.
    pub fn from_claim(claim: &Claim, rank: ClaimRank) -> Self {
        Self {
            id: claim.id(),
            text: claim.text.clone(),
            evidence_refs: claim.evidence_refs.clone(),
            confidence: claim.confidence,
            rank,
            citations: claim.citations.clone(),
            assertion: claim.assertion.clone(),
            derived_from: Vec::new(),
            hedged: false,
        }
    }

    pub fn is_primary(&self) -> bool {
        self.rank == ClaimRank::Primary
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub kind: SectionKind,
    pub title: String,
    pub intro: String,
    pub claims: Vec<DocClaim>,
}

impl Section {
    pub fn new(kind: SectionKind, intro: impl Into<String>) -> Self {
        Self {
            kind,
            title: kind.title().to_string(),
            intro: intro.into(),
            claims: Vec::new(),
        }
    }
}

/// Document-wide facts about the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalMetadata {
    /// Display name of the developer, when a profile was ingested.
    pub subject: Option<String>,
    /// One-liner built from surviving primary role claims.
    pub headline: Option<String>,
    /// Every evidence record the job was asked to analyze, plus the profile.
    pub sources_consulted: Vec<EvidenceId>,
    pub failed_tasks: Vec<FailedUnit>,
    /// Units never started because the job was cancelled.
    pub skipped: Vec<EvidenceId>,
    pub coverage: CoverageReport,
    pub completeness: Completeness,
    pub cancelled: bool,
    pub tone: Tone,
    pub mode: AnalysisMode,
    /// Aggregated technology signals, strongest first.
    pub tech_stack: Vec<TechSignal>,
    /// External links; the profile URL first.
    pub links: Vec<String>,
}

/// Persona under construction by the synthesizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaDocument {
    pub sections: Vec<Section>,
    pub global_metadata: GlobalMetadata,
}

impl PersonaDocument {
    pub fn section(&self, kind: SectionKind) -> Option<&Section> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    /// Every claim with the kind of the section holding it.
    pub fn claims(&self) -> impl Iterator<Item = (SectionKind, &DocClaim)> {
        self.sections
            .iter()
            .flat_map(|s| s.claims.iter().map(move |c| (s.kind, c)))
    }

    pub fn claim(&self, id: &ClaimId) -> Option<&DocClaim> {
        self.claims().map(|(_, c)| c).find(|c| &c.id == id)
    }

    pub fn claim_count(&self) -> usize {
        self.sections.iter().map(|s| s.claims.len()).sum()
    }
}

/// Final persona: validated and no longer mutable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidatedPersona(PersonaDocument);

impl ValidatedPersona {
    pub(crate) fn new(document: PersonaDocument) -> Self {
        Self(document)
    }

    pub fn document(&self) -> &PersonaDocument {
        &self.0
    }

    pub fn metadata(&self) -> &GlobalMetadata {
        &self.0.global_metadata
    }

    pub fn sections(&self) -> &[Section] {
        &self.0.sections
    }

    pub fn headline(&self) -> Option<&str> {
        self.0.global_metadata.headline.as_deref()
    }

    pub fn into_document(self) -> PersonaDocument {
        self.0
    }
}
