//! Ingestion of a GitHub GraphQL profile payload into an [`EvidenceStore`].
//!
//! Expected shape (`data` wrapper optional):
//!
//! ```json
//! {"data": {"user": {
//!     "login": "octocat", "name": "...", "bio": "...",
//!     "followers": {"totalCount": 10},
//!     "pinnedItems": {"nodes": [ <repo>, ... ]},
//!     "repositories": {"nodes": [ <repo>, ... ]}
//! }}}
//! ```
//!
//! A repository appearing both pinned and in the repository list becomes one
//! record flagged `pinned`.

use std::collections::BTreeMap;

use serde_json::Value;

use super::record::{
    EvidenceKind, EvidenceRecord, MetadataValue, META_AVATAR_URL, META_COMPANY, META_CONTRIBUTIONS,
    META_DESCRIPTION, META_FOLLOWERS, META_LANGUAGES, META_LOCATION, META_LOGIN, META_NAME,
    META_PINNED, META_PRIMARY_LANGUAGE, META_STARS, META_TOPICS, META_TWITTER, META_UPDATED_AT,
    META_WEBSITE,
};
use super::store::EvidenceStore;
use crate::utilities::errors::EvidenceError;

const GITHUB_BASE: &str = "https://github.com";

fn text(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn count(value: &Value, pointer: &str) -> Option<i64> {
    value.pointer(pointer).and_then(Value::as_i64)
}

fn names(value: &Value, pointer: &str, field: &str) -> Vec<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .map(|nodes| {
            nodes
                .iter()
                .filter_map(|n| text(n, field))
                .collect()
        })
        .unwrap_or_default()
}

fn nodes<'a>(user: &'a Value, pointer: &str) -> impl Iterator<Item = &'a Value> {
    user.pointer(pointer)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        // Nameless items cannot be identified.
        .filter(|n| n.get("name").and_then(Value::as_str).is_some())
}

/// Build an evidence store from a GitHub profile payload.
pub fn ingest_github_payload(payload: &Value) -> Result<EvidenceStore, EvidenceError> {
    let user = payload
        .pointer("/data/user")
        .or_else(|| payload.get("user"))
        .filter(|u| u.is_object())
        .ok_or_else(|| EvidenceError::InvalidPayload {
            message: "missing data.user object".to_string(),
        })?;
    let login = text(user, "/login").ok_or_else(|| EvidenceError::InvalidPayload {
        message: "user.login is missing".to_string(),
    })?;

    let mut builder = EvidenceStore::builder();
    builder.insert(profile_record(user, &login))?;

    // Keyed by name so pinned items and the repository list merge.
    let mut repos: BTreeMap<String, EvidenceRecord> = BTreeMap::new();
    let pinned = nodes(user, "/pinnedItems/nodes").map(|n| repository_record(n, &login, true));
    let listed = nodes(user, "/repositories/nodes").map(|n| repository_record(n, &login, false));
    for record in pinned.chain(listed) {
        let key = record.subject_id().to_string();
        let merged = match repos.remove(&key) {
            Some(existing) => merge_records(existing, record),
            None => record,
        };
        repos.insert(key, merged);
    }

    log::info!(
        "Ingested profile '{}' with {} repositories",
        login,
        repos.len()
    );
    for record in repos.into_values() {
        builder.insert(record)?;
    }
    Ok(builder.build())
}

/// Fill gaps in `primary` from `other`. Entries already on `primary` win.
fn merge_records(primary: EvidenceRecord, other: EvidenceRecord) -> EvidenceRecord {
    let raw_content = if primary.raw_content().trim().is_empty() {
        other.raw_content()
    } else {
        primary.raw_content()
    };
    let mut merged = EvidenceRecord::new(
        primary.kind(),
        primary.subject_id(),
        raw_content,
        primary.source_uri(),
    );
    for (key, value) in other.metadata().iter().chain(primary.metadata()) {
        merged = merged.with_metadata(key.clone(), value.clone());
    }
    merged
}

fn profile_record(user: &Value, login: &str) -> EvidenceRecord {
    let uri = text(user, "/url").unwrap_or_else(|| format!("{GITHUB_BASE}/{login}"));
    let mut record = EvidenceRecord::new(
        EvidenceKind::Profile,
        login,
        text(user, "/bio").unwrap_or_default(),
        uri,
    );
    let fields = [
        (META_NAME, text(user, "/name")),
        (META_LOGIN, Some(login.to_string())),
        (META_COMPANY, text(user, "/company")),
        (META_LOCATION, text(user, "/location")),
        (META_WEBSITE, text(user, "/websiteUrl")),
        (META_TWITTER, text(user, "/twitterUsername")),
        (META_AVATAR_URL, text(user, "/avatarUrl")),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            record = record.with_metadata(key, value);
        }
    }
    if let Some(followers) = count(user, "/followers/totalCount") {
        record = record.with_metadata(META_FOLLOWERS, followers);
    }
    if let Some(total) = count(
        user,
        "/contributionsCollection/contributionCalendar/totalContributions",
    ) {
        record = record.with_metadata(META_CONTRIBUTIONS, total);
    }
    record
}

fn repository_record(node: &Value, login: &str, pinned: bool) -> EvidenceRecord {
    let name = text(node, "/name").unwrap_or_default();
    let subject = text(node, "/nameWithOwner").unwrap_or_else(|| format!("{login}/{name}"));
    let uri = text(node, "/url").unwrap_or_else(|| format!("{GITHUB_BASE}/{subject}"));

    let mut record = EvidenceRecord::new(
        EvidenceKind::Repository,
        subject,
        text(node, "/readme/text").unwrap_or_default(),
        uri,
    )
    .with_metadata(META_PINNED, pinned);

    if let Some(description) = text(node, "/description") {
        record = record.with_metadata(META_DESCRIPTION, description);
    }
    if let Some(stars) = count(node, "/stargazerCount") {
        record = record.with_metadata(META_STARS, stars);
    }
    if let Some(forks) = count(node, "/forkCount") {
        record = record.with_metadata("forks", forks);
    }
    if let Some(updated) = text(node, "/pushedAt").or_else(|| text(node, "/updatedAt")) {
        record = record.with_metadata(META_UPDATED_AT, updated);
    }
    if let Some(language) = text(node, "/primaryLanguage/name") {
        record = record.with_metadata(META_PRIMARY_LANGUAGE, language);
    }
    let languages = names(node, "/languages/nodes", "/name");
    if !languages.is_empty() {
        record = record.with_metadata(META_LANGUAGES, MetadataValue::List(languages));
    }
    let topics = names(node, "/repositoryTopics/nodes", "/topic/name");
    if !topics.is_empty() {
        record = record.with_metadata(META_TOPICS, MetadataValue::List(topics));
    }
    record
}
