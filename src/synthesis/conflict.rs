//! Conflict policy for contradictory role assertions.
//!
//! Claims asserting the same role (say, primary language) with different
//! values are grouped by value. The value with the highest aggregate
//! confidence wins. Aggregates closer than [`TIE_EPSILON`] are broken by the
//! configured [`TieBreak`], then by the value itself.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::evidence::EvidenceStore;
use crate::tasks::{Claim, TechRole};
use crate::utilities::errors::ConfigError;

/// Aggregates closer than this are a tie.
pub const TIE_EPSILON: f64 = 1e-9;

/// How equally confident role values are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Most recently updated underlying evidence wins.
    #[default]
    Recency,
    /// Most starred underlying evidence wins.
    Popularity,
}

impl fmt::Display for TieBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recency => f.write_str("recency"),
            Self::Popularity => f.write_str("popularity"),
        }
    }
}

impl FromStr for TieBreak {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "recency" => Ok(Self::Recency),
            "popularity" | "stars" => Ok(Self::Popularity),
            other => Err(ConfigError::InvalidValue {
                key: "tie_break".to_string(),
                value: other.to_string(),
                reason: "expected recency or popularity".to_string(),
            }),
        }
    }
}

/// One candidate value for a role.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleCandidate {
    /// Lowercased value shared by every claim in the group.
    pub value: String,
    /// Sum of the confidences of the claims asserting it.
    pub aggregate: f64,
    /// Latest update among the underlying evidence.
    pub latest: Option<DateTime<Utc>>,
    /// Highest star count among the underlying evidence.
    pub stars: i64,
    pub claim_count: usize,
}

/// Outcome for one role: candidates best first.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleResolution {
    pub role: TechRole,
    pub candidates: Vec<RoleCandidate>,
}

impl RoleResolution {
    /// The winning value.
    pub fn winner(&self) -> Option<&RoleCandidate> {
        self.candidates.first()
    }

    /// Whether `value` (any case) is the winner.
    pub fn is_winner(&self, value: &str) -> bool {
        self.winner()
            .is_some_and(|w| w.value == value.to_lowercase())
    }

    /// Aggregate of `value`, zero when unknown.
    pub fn aggregate_of(&self, value: &str) -> f64 {
        let value = value.to_lowercase();
        self.candidates
            .iter()
            .find(|c| c.value == value)
            .map(|c| c.aggregate)
            .unwrap_or(0.0)
    }
}

fn compare(a: &RoleCandidate, b: &RoleCandidate, tie_break: TieBreak) -> Ordering {
    if (a.aggregate - b.aggregate).abs() >= TIE_EPSILON {
        return b.aggregate.total_cmp(&a.aggregate);
    }
    let tie = match tie_break {
        TieBreak::Recency => b.latest.cmp(&a.latest),
        TieBreak::Popularity => b.stars.cmp(&a.stars),
    };
    tie.then_with(|| a.value.cmp(&b.value))
}

/// Group role-asserting claims and rank each role's values.
///
/// The result depends only on the set of claims, never on their order.
pub fn resolve_roles<'a>(
    claims: impl IntoIterator<Item = &'a Claim>,
    store: &EvidenceStore,
    tie_break: TieBreak,
) -> BTreeMap<TechRole, RoleResolution> {
    let mut groups: BTreeMap<TechRole, BTreeMap<String, RoleCandidate>> = BTreeMap::new();

    for claim in claims {
        let Some(assertion) = &claim.assertion else {
            continue;
        };
        let value = assertion.normalized_value();
        let candidate = groups
            .entry(assertion.role)
            .or_default()
            .entry(value.clone())
            .or_insert_with(|| RoleCandidate {
                value,
                aggregate: 0.0,
                latest: None,
                stars: 0,
                claim_count: 0,
            });
        candidate.aggregate += claim.confidence;
        candidate.claim_count += 1;
        for record in store.resolve(&claim.evidence_refs) {
            candidate.latest = candidate.latest.max(record.updated_at());
            candidate.stars = candidate.stars.max(record.stars());
        }
    }

    groups
        .into_iter()
        .map(|(role, candidates)| {
            let mut candidates: Vec<RoleCandidate> = candidates.into_values().collect();
            candidates.sort_by(|a, b| compare(a, b, tie_break));
            if candidates.len() > 1 {
                log::debug!(
                    "Role '{}' resolved to '{}' over {} other value(s)",
                    role.label(),
                    candidates[0].value,
                    candidates.len() - 1
                );
            }
            (role, RoleResolution { role, candidates })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::record::{META_STARS, META_UPDATED_AT};
    use crate::evidence::{EvidenceId, EvidenceKind, EvidenceRecord};
    use crate::tasks::RoleAssertion;

    fn store() -> EvidenceStore {
        EvidenceStore::from_records(vec![
            EvidenceRecord::new(EvidenceKind::Repository, "a/old-popular", "x", "")
                .with_metadata(META_STARS, 900_i64)
                .with_metadata(META_UPDATED_AT, "2019-01-01T00:00:00Z"),
            EvidenceRecord::new(EvidenceKind::Repository, "a/new-niche", "y", "")
                .with_metadata(META_STARS, 3_i64)
                .with_metadata(META_UPDATED_AT, "2024-05-01T00:00:00Z"),
        ])
        .unwrap()
    }

    fn lang(value: &str, repo: &str, confidence: f64) -> Claim {
        Claim::new(
            format!("Primary language is {value}"),
            [EvidenceId::repository(repo)],
            confidence,
        )
        .with_assertion(RoleAssertion::new(TechRole::PrimaryLanguage, value))
    }

    #[test]
    fn test_higher_confidence_wins() {
        let claims = vec![lang("Go", "a/new-niche", 0.6), lang("Rust", "a/old-popular", 0.9)];
        let roles = resolve_roles(&claims, &store(), TieBreak::Recency);
        let resolution = &roles[&TechRole::PrimaryLanguage];
        assert!(resolution.is_winner("Rust"));
        assert_eq!(resolution.candidates.len(), 2);
    }

    #[test]
    fn test_aggregate_sums_across_findings() {
        let claims = vec![
            lang("Go", "a/new-niche", 0.5),
            lang("go", "a/old-popular", 0.5),
            lang("Rust", "a/old-popular", 0.9),
        ];
        let roles = resolve_roles(&claims, &store(), TieBreak::Recency);
        let resolution = &roles[&TechRole::PrimaryLanguage];
        assert!(resolution.is_winner("GO"));
        assert!((resolution.aggregate_of("go") - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_tie_break_is_configurable() {
        let claims = vec![lang("Go", "a/new-niche", 0.7), lang("Rust", "a/old-popular", 0.7)];
        let by_recency = resolve_roles(&claims, &store(), TieBreak::Recency);
        assert!(by_recency[&TechRole::PrimaryLanguage].is_winner("go"));
        let by_stars = resolve_roles(&claims, &store(), TieBreak::Popularity);
        assert!(by_stars[&TechRole::PrimaryLanguage].is_winner("rust"));
    }

    #[test]
    fn test_resolution_ignores_claim_order() {
        let mut claims = vec![
            lang("Go", "a/new-niche", 0.7),
            lang("Rust", "a/old-popular", 0.7),
            lang("Zig", "a/new-niche", 0.2),
        ];
        let forward = resolve_roles(&claims, &store(), TieBreak::Recency);
        claims.reverse();
        let backward = resolve_roles(&claims, &store(), TieBreak::Recency);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_claims_without_assertion_are_ignored() {
        let claims = vec![Claim::new("Has a README", [EvidenceId::repository("a/new-niche")], 0.9)];
        assert!(resolve_roles(&claims, &store(), TieBreak::Recency).is_empty());
    }

    #[test]
    fn test_tie_break_parse() {
        assert_eq!("Popularity".parse::<TieBreak>().unwrap(), TieBreak::Popularity);
        assert!("coin-flip".parse::<TieBreak>().is_err());
    }
}
