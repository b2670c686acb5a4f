//! Synthesizer: merges findings and profile evidence into one persona
//! document, then applies a validation result to produce the final revision.
//!
//! `merge` is commutative over the finding set. Findings are visited in
//! evidence-id order and every section is sorted by content-derived keys, so
//! the order in which sub-agents completed never shows in the draft.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::conflict::{resolve_roles, RoleResolution, TieBreak};
use super::narrative::NarrativeParams;
use super::narrator::NarratedStatement;
use super::persona::{
    ClaimRank, DocClaim, GlobalMetadata, PersonaDocument, Section, SectionKind, ValidatedPersona,
};
use crate::evidence::record::{
    MetadataValue, META_COMPANY, META_CONTRIBUTIONS, META_FOLLOWERS, META_LOCATION, META_NAME,
    META_STARS, META_TOPICS, META_TWITTER, META_WEBSITE,
};
use crate::evidence::{EvidenceId, EvidenceRecord, EvidenceStore};
use crate::explorer::finding_set::FindingSet;
use crate::tasks::{Citation, Claim, ClaimId, Finding, TechRole, TechSignal};
use crate::utilities::string_utils::{join_human, normalize_whitespace, truncate_chars};
use crate::validation::ValidationResult;

/// Longest bio quoted in the profile section.
const MAX_BIO_CHARS: usize = 280;
/// Repository names spelled out in a technical DNA line.
const NAMED_SOURCES: usize = 3;
/// Topics listed in the ecosystem section.
const MAX_TOPICS: usize = 8;
/// Most-starred repositories listed in the ecosystem section.
const MAX_STARRED: usize = 3;

fn default_narrate() -> bool {
    true
}

/// Synthesis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisConfig {
    #[serde(default)]
    pub tie_break: TieBreak,
    /// Ask the model for a narrated summary section.
    #[serde(default = "default_narrate")]
    pub narrate: bool,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            tie_break: TieBreak::default(),
            narrate: default_narrate(),
        }
    }
}

/// Merges findings into a persona document.
#[derive(Debug, Clone, Default)]
pub struct Synthesizer {
    params: NarrativeParams,
    tie_break: TieBreak,
}

impl Synthesizer {
    pub fn new(params: NarrativeParams) -> Self {
        Self {
            params,
            tie_break: TieBreak::default(),
        }
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub fn params(&self) -> &NarrativeParams {
        &self.params
    }

    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    // -----------------------------------------------------------------------
    // Merge
    // -----------------------------------------------------------------------

    /// Build the draft persona from a finding set and the evidence store.
    pub fn merge(&self, set: &FindingSet, store: &EvidenceStore) -> PersonaDocument {
        let mut findings: Vec<&Finding> = set.findings.values().collect();
        findings.sort_by(|a, b| a.evidence().cmp(b.evidence()));

        let role_claims: Vec<&Claim> = findings
            .iter()
            .flat_map(|f| f.claims())
            .filter(|c| c.assertion.is_some())
            .collect();
        let roles = resolve_roles(role_claims.iter().copied(), store, self.tie_break);
        let tech_stack = aggregate_signals(&findings);

        let tone = self.params.tone;
        let mode = self.params.mode;
        let limit = self.params.claim_limit();

        let mut sections = Vec::new();
        for &kind in mode.sections() {
            let mut section = Section::new(kind, tone.intro(kind));
            section.claims = match kind {
                SectionKind::Summary => Vec::new(),
                SectionKind::Profile => profile_claims(store),
                SectionKind::PrimaryRoles => self.role_claims(&role_claims, &roles),
                SectionKind::TechnicalDna => tech_claims(&tech_stack, store),
                SectionKind::ProjectHighlights => highlight_claims(&findings),
                SectionKind::Ecosystem => ecosystem_claims(&findings, store),
            };
            if let Some(limit) = limit {
                section.claims.truncate(limit);
            }
            sections.push(section);
        }

        let profile = store.profile();
        let mut sources: BTreeSet<EvidenceId> = set.findings.keys().cloned().collect();
        sources.extend(set.failed_ids());
        sources.extend(set.skipped.iter().cloned());
        if let Some(profile) = profile {
            sources.insert(profile.id());
        }

        let document = PersonaDocument {
            sections,
            global_metadata: GlobalMetadata {
                subject: profile.map(|p| subject_name(p)),
                headline: None,
                sources_consulted: sources.into_iter().collect(),
                failed_tasks: set.failed.clone(),
                skipped: set.skipped.clone(),
                coverage: set.coverage(),
                completeness: set.completeness(),
                cancelled: set.cancelled,
                tone,
                mode,
                tech_stack: tech_stack.iter().map(|t| t.signal()).collect(),
                links: profile.map(|p| profile_links(p)).unwrap_or_default(),
            },
        };
        log::info!(
            "Merged {} finding(s) into {} claim(s) across {} section(s)",
            findings.len(),
            document.claim_count(),
            document.sections.len()
        );
        document
    }

    fn role_claims(&self, claims: &[&Claim], roles: &BTreeMap<TechRole, RoleResolution>) -> Vec<DocClaim> {
        let show_secondary = self.params.mode.shows_secondary();
        let mut placed: Vec<(TechRole, f64, DocClaim)> = claims
            .iter()
            .filter_map(|claim| {
                let assertion = claim.assertion.as_ref()?;
                let resolution = roles.get(&assertion.role)?;
                let rank = if resolution.is_winner(&assertion.value) {
                    ClaimRank::Primary
                } else {
                    ClaimRank::Secondary
                };
                if rank == ClaimRank::Secondary && !show_secondary {
                    return None;
                }
                let aggregate = resolution.aggregate_of(&assertion.value);
                Some((assertion.role, aggregate, DocClaim::from_claim(claim, rank)))
            })
            .collect();

        placed.sort_by(|(role_a, agg_a, a), (role_b, agg_b, b)| {
            a.rank
                .cmp(&b.rank)
                .then_with(|| role_a.cmp(role_b))
                .then_with(|| agg_b.total_cmp(agg_a))
                .then_with(|| b.confidence.total_cmp(&a.confidence))
                .then_with(|| a.id.cmp(&b.id))
        });
        placed.into_iter().map(|(_, _, claim)| claim).collect()
    }

    // -----------------------------------------------------------------------
    // Narration
    // -----------------------------------------------------------------------

    /// Add narrated statements to the summary section. Each statement takes
    /// the union of its source claims' evidence and the lowest of their
    /// confidences. Statements citing no known claim are dropped. Returns the
    /// number of statements added.
    pub fn attach_narration(&self, draft: &mut PersonaDocument, statements: Vec<NarratedStatement>) -> usize {
        let mut narrated = Vec::new();
        for statement in statements {
            let text = normalize_whitespace(&statement.text);
            let ids: BTreeSet<ClaimId> = statement.derived_from.into_iter().collect();
            let sources: Vec<&DocClaim> = draft
                .claims()
                .filter(|(kind, _)| *kind != SectionKind::Summary)
                .map(|(_, claim)| claim)
                .filter(|claim| ids.contains(&claim.id))
                .collect();
            if text.is_empty() || sources.is_empty() {
                continue;
            }
            let refs: BTreeSet<EvidenceId> = sources
                .iter()
                .flat_map(|c| c.evidence_refs.iter().cloned())
                .collect();
            let confidence = sources
                .iter()
                .map(|c| c.confidence)
                .fold(1.0_f64, f64::min);
            narrated.push(DocClaim {
                id: ClaimId::compute(&text, &refs),
                text,
                evidence_refs: refs,
                confidence,
                rank: ClaimRank::Primary,
                citations: Vec::new(),
                assertion: None,
                derived_from: sources.iter().map(|c| c.id.clone()).collect(),
                hedged: false,
            });
        }

        let Some(summary) = draft
            .sections
            .iter_mut()
            .find(|s| s.kind == SectionKind::Summary)
        else {
            return 0;
        };
        let mut added = 0;
        for claim in narrated {
            if summary.claims.iter().any(|c| c.id == claim.id) {
                continue;
            }
            summary.claims.push(claim);
            added += 1;
        }
        added
    }

    // -----------------------------------------------------------------------
    // Finalize
    // -----------------------------------------------------------------------

    /// Apply a validation result: accepted claims stay, rewritten claims take
    /// their hedged text, every other claim is removed. Empty sections are
    /// dropped and the headline is built from what survived.
    pub fn finalize(&self, mut draft: PersonaDocument, result: &ValidationResult) -> ValidatedPersona {
        let mut removed = 0usize;
        for section in draft.sections.iter_mut() {
            let claims = std::mem::take(&mut section.claims);
            for mut claim in claims {
                if result.is_accepted(&claim.id) {
                    section.claims.push(claim);
                } else if let Some(text) = result.rewrites.get(&claim.id) {
                    claim.text = text.clone();
                    claim.hedged = true;
                    claim.citations.clear();
                    claim.assertion = None;
                    section.claims.push(claim);
                } else {
                    removed += 1;
                }
            }
        }
        draft.sections.retain(|s| !s.claims.is_empty());
        draft.global_metadata.headline = headline(&draft);

        if removed > 0 {
            log::info!("Removed {} claim(s) that failed validation", removed);
        }
        ValidatedPersona::new(draft)
    }
}

// ---------------------------------------------------------------------------
// Section builders
// ---------------------------------------------------------------------------

fn subject_name(profile: &EvidenceRecord) -> String {
    profile
        .meta(META_NAME)
        .and_then(MetadataValue::as_str)
        .unwrap_or(profile.subject_id())
        .to_string()
}

fn profile_links(profile: &EvidenceRecord) -> Vec<String> {
    let mut links = Vec::new();
    if !profile.source_uri().trim().is_empty() {
        links.push(profile.source_uri().to_string());
    }
    if let Some(website) = profile.meta(META_WEBSITE).and_then(MetadataValue::as_str) {
        if website.starts_with("http://") || website.starts_with("https://") {
            links.push(website.to_string());
        } else {
            links.push(format!("https://{website}"));
        }
    }
    if let Some(handle) = profile.meta(META_TWITTER).and_then(MetadataValue::as_str) {
        links.push(format!("https://twitter.com/{}", handle.trim_start_matches('@')));
    }
    let mut seen = BTreeSet::new();
    links.retain(|l| seen.insert(l.clone()));
    links
}

fn metadata_claim(record: &EvidenceRecord, key: &str, label: &str) -> Option<DocClaim> {
    let value = record.meta(key)?;
    let claim = Claim::new(format!("{label}: {value}"), [record.id()], 1.0)
        .with_citation(Citation::new(format!("metadata.{key}"), None));
    Some(DocClaim::from_claim(&claim, ClaimRank::Primary))
}

fn profile_claims(store: &EvidenceStore) -> Vec<DocClaim> {
    let Some(profile) = store.profile() else {
        return Vec::new();
    };
    let mut claims = Vec::new();
    claims.extend(metadata_claim(profile, META_NAME, "Name"));

    let bio = normalize_whitespace(profile.raw_content());
    if !bio.is_empty() {
        let bio = truncate_chars(&bio, MAX_BIO_CHARS).to_string();
        let claim = Claim::new(bio.clone(), [profile.id()], 1.0)
            .with_citation(Citation::new("raw_content", Some(bio)));
        claims.push(DocClaim::from_claim(&claim, ClaimRank::Primary));
    }

    claims.extend(metadata_claim(profile, META_COMPANY, "Company"));
    claims.extend(metadata_claim(profile, META_LOCATION, "Location"));
    claims.extend(metadata_claim(profile, META_FOLLOWERS, "Followers"));
    claims.extend(metadata_claim(profile, META_CONTRIBUTIONS, "Contributions last year"));
    claims
}

/// One technology aggregated across findings.
#[derive(Debug, Clone)]
struct TechAggregate {
    name: String,
    strength: f64,
    confidence: f64,
    sources: BTreeSet<EvidenceId>,
}

impl TechAggregate {
    fn signal(&self) -> TechSignal {
        TechSignal::new(self.name.clone(), self.confidence)
    }
}

/// Sum signal confidences per technology (case-insensitive), strongest first.
fn aggregate_signals(findings: &[&Finding]) -> Vec<TechAggregate> {
    let mut by_key: BTreeMap<String, TechAggregate> = BTreeMap::new();
    for finding in findings {
        for signal in finding.tech_signals() {
            let entry = by_key
                .entry(signal.technology.to_lowercase())
                .or_insert_with(|| TechAggregate {
                    name: signal.technology.clone(),
                    strength: 0.0,
                    confidence: 0.0,
                    sources: BTreeSet::new(),
                });
            // Smallest spelling wins so the name does not depend on order.
            if signal.technology < entry.name {
                entry.name = signal.technology.clone();
            }
            entry.strength += signal.confidence;
            entry.confidence = entry.confidence.max(signal.confidence);
            entry.sources.insert(finding.evidence().clone());
        }
    }
    let mut stack: Vec<TechAggregate> = by_key.into_values().collect();
    stack.sort_by(|a, b| {
        b.strength
            .total_cmp(&a.strength)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
    stack
}

fn source_names(sources: &BTreeSet<EvidenceId>, store: &EvidenceStore) -> String {
    let mut names: Vec<String> = sources
        .iter()
        .take(NAMED_SOURCES)
        .map(|id| {
            store
                .get(id)
                .map(|r| r.display_name().to_string())
                .unwrap_or_else(|| id.subject_id().to_string())
        })
        .collect();
    if sources.len() > NAMED_SOURCES {
        names.push(format!("{} more", sources.len() - NAMED_SOURCES));
    }
    join_human(&names)
}

fn tech_claims(stack: &[TechAggregate], store: &EvidenceStore) -> Vec<DocClaim> {
    stack
        .iter()
        .map(|tech| {
            let claim = Claim::new(
                format!("{} (seen in {})", tech.name, source_names(&tech.sources, store)),
                tech.sources.iter().cloned(),
                tech.confidence,
            );
            DocClaim::from_claim(&claim, ClaimRank::Primary)
        })
        .collect()
}

fn highlight_claims(findings: &[&Finding]) -> Vec<DocClaim> {
    let mut ordered: Vec<&Finding> = findings.to_vec();
    ordered.sort_by(|a, b| {
        b.complexity()
            .cmp(&a.complexity())
            .then_with(|| a.evidence().cmp(b.evidence()))
    });
    ordered
        .into_iter()
        .flat_map(|f| f.claims())
        .filter(|c| c.assertion.is_none())
        .map(|c| DocClaim::from_claim(c, ClaimRank::Primary))
        .collect()
}

fn ecosystem_claims(findings: &[&Finding], store: &EvidenceStore) -> Vec<DocClaim> {
    let records: Vec<_> = store.resolve(findings.iter().map(|f| f.evidence()));
    let mut claims = Vec::new();

    let mut topic_counts: BTreeMap<String, usize> = BTreeMap::new();
    for record in &records {
        let topics = record.meta(META_TOPICS).and_then(MetadataValue::as_list).unwrap_or_default();
        for topic in topics.iter().map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty()) {
            *topic_counts.entry(topic).or_default() += 1;
        }
    }
    let mut topics: Vec<(String, usize)> = topic_counts.into_iter().collect();
    topics.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    topics.truncate(MAX_TOPICS);
    if !topics.is_empty() {
        let names: Vec<String> = topics.iter().map(|(t, _)| t.clone()).collect();
        let refs = records.iter().filter(|r| {
            r.meta(META_TOPICS)
                .and_then(MetadataValue::as_list)
                .is_some_and(|list| list.iter().any(|t| names.contains(&t.trim().to_lowercase())))
        });
        let claim = Claim::new(format!("Topics: {}", names.join(", ")), refs.map(|r| r.id()), 1.0)
            .with_citation(Citation::new(format!("metadata.{META_TOPICS}"), None));
        claims.push(DocClaim::from_claim(&claim, ClaimRank::Primary));
    }

    let mut starred: Vec<_> = records.iter().filter(|r| r.stars() > 0).collect();
    starred.sort_by(|a, b| b.stars().cmp(&a.stars()).then_with(|| a.id().cmp(&b.id())));
    for record in starred.into_iter().take(MAX_STARRED) {
        let claim = Claim::new(
            format!("Stars: {} on {}", record.stars(), record.display_name()),
            [record.id()],
            1.0,
        )
        .with_citation(Citation::new(format!("metadata.{META_STARS}"), None));
        claims.push(DocClaim::from_claim(&claim, ClaimRank::Primary));
    }
    claims
}

/// "<subject>: <winning role values>" from unhedged primary role claims.
fn headline(document: &PersonaDocument) -> Option<String> {
    let roles = document.section(SectionKind::PrimaryRoles)?;
    let mut seen = BTreeSet::new();
    let values: Vec<String> = roles
        .claims
        .iter()
        .filter(|c| c.is_primary() && !c.hedged)
        .filter_map(|c| c.assertion.as_ref())
        .filter(|a| seen.insert(a.normalized_value()))
        .map(|a| a.value.clone())
        .collect();
    if values.is_empty() {
        return None;
    }
    let values = join_human(&values);
    Some(match &document.global_metadata.subject {
        Some(subject) => format!("{subject}: {values}"),
        None => values,
    })
}
