//! Evidence records: the immutable raw facts every claim must trace back to.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utilities::errors::EvidenceError;
use crate::utilities::string_utils::tokenize;

/// Metadata key holding a repository's one-line description.
pub const META_DESCRIPTION: &str = "description";
/// Metadata key holding the star count.
pub const META_STARS: &str = "stars";
/// Metadata key holding the last push / update timestamp (RFC 3339).
pub const META_UPDATED_AT: &str = "updated_at";
/// Metadata key marking a pinned repository.
pub const META_PINNED: &str = "pinned";
/// Metadata key holding the primary language.
pub const META_PRIMARY_LANGUAGE: &str = "primary_language";
/// Metadata key holding all detected languages.
pub const META_LANGUAGES: &str = "languages";
/// Metadata key holding repository topics.
pub const META_TOPICS: &str = "topics";

// Profile metadata keys.
pub const META_NAME: &str = "name";
pub const META_LOGIN: &str = "login";
pub const META_COMPANY: &str = "company";
pub const META_LOCATION: &str = "location";
pub const META_WEBSITE: &str = "website";
pub const META_TWITTER: &str = "twitter";
pub const META_AVATAR_URL: &str = "avatar_url";
pub const META_FOLLOWERS: &str = "followers";
pub const META_CONTRIBUTIONS: &str = "contributions_last_year";

/// What a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceKind {
    /// The developer's own profile (bio, company, followers ...).
    Profile,
    /// A single repository.
    Repository,
}

impl fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Profile => write!(f, "profile"),
            Self::Repository => write!(f, "repository"),
        }
    }
}

impl FromStr for EvidenceKind {
    type Err = EvidenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "profile" => Ok(Self::Profile),
            "repository" => Ok(Self::Repository),
            other => Err(EvidenceError::InvalidId {
                value: other.to_string(),
            }),
        }
    }
}

/// Identity of an evidence record: `(subject_id, kind)`.
///
/// Serialized as the string `"<kind>:<subject_id>"`, e.g.
/// `"repository:octocat/hello-world"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct EvidenceId {
    kind: EvidenceKind,
    subject_id: String,
}

impl EvidenceId {
    /// Create an identifier.
    pub fn new(kind: EvidenceKind, subject_id: impl Into<String>) -> Self {
        Self {
            kind,
            subject_id: subject_id.into(),
        }
    }

    /// Identifier of a repository record.
    pub fn repository(subject_id: impl Into<String>) -> Self {
        Self::new(EvidenceKind::Repository, subject_id)
    }

    /// Identifier of a profile record.
    pub fn profile(subject_id: impl Into<String>) -> Self {
        Self::new(EvidenceKind::Profile, subject_id)
    }

    /// The subject (login or `owner/name`).
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// The record kind.
    pub fn kind(&self) -> EvidenceKind {
        self.kind
    }
}

impl fmt::Display for EvidenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.subject_id)
    }
}

impl FromStr for EvidenceId {
    type Err = EvidenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EvidenceError::InvalidId {
            value: s.to_string(),
        };
        let (kind, subject) = s.split_once(':').ok_or_else(invalid)?;
        if subject.is_empty() {
            return Err(invalid());
        }
        let kind = kind.parse::<EvidenceKind>().map_err(|_| invalid())?;
        Ok(Self::new(kind, subject))
    }
}

impl From<EvidenceId> for String {
    fn from(id: EvidenceId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for EvidenceId {
    type Error = EvidenceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A scalar (or short list of scalars) attached to a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

impl MetadataValue {
    /// Integer view, if the value is numeric.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            // Saturating cast; star counts never approach the limits.
            Self::Float(f) if f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    /// Text view, if the value is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean view, if the value is a bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// List view, if the value is a list.
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Parse an RFC 3339 timestamp stored as text.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        self.as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Whether the value carries no information.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            Self::List(items) => items.iter().all(|s| s.trim().is_empty()),
            _ => false,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::List(items) => write!(f, "{}", items.join(", ")),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<String>> for MetadataValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

/// Where in a record a statement was taken from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EvidenceField<'a> {
    /// The README / bio markdown.
    RawContent,
    /// The record's source URI.
    SourceUri,
    /// A metadata entry.
    Metadata(&'a str),
}

impl<'a> EvidenceField<'a> {
    /// Parse a citation field name: `raw_content`, `source_uri` or
    /// `metadata.<key>`.
    pub fn parse(field: &'a str) -> Option<Self> {
        match field {
            "raw_content" | "rawContent" | "readme" => Some(Self::RawContent),
            "source_uri" | "sourceUri" | "url" => Some(Self::SourceUri),
            other => other
                .strip_prefix("metadata.")
                .filter(|key| !key.is_empty())
                .map(Self::Metadata),
        }
    }
}

/// Raw per-profile or per-repository facts gathered upstream.
///
/// Immutable once constructed; downstream stages hold `Arc` references to the
/// copy owned by the [`EvidenceStore`](super::store::EvidenceStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    #[serde(rename = "subjectId", alias = "subject_id")]
    subject_id: String,
    kind: EvidenceKind,
    #[serde(rename = "rawContent", alias = "raw_content", default)]
    raw_content: String,
    #[serde(default)]
    metadata: BTreeMap<String, MetadataValue>,
    #[serde(rename = "sourceUri", alias = "source_uri", default)]
    source_uri: String,
}

impl EvidenceRecord {
    /// Create a record with no metadata.
    pub fn new(
        kind: EvidenceKind,
        subject_id: impl Into<String>,
        raw_content: impl Into<String>,
        source_uri: impl Into<String>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            kind,
            raw_content: raw_content.into(),
            metadata: BTreeMap::new(),
            source_uri: source_uri.into(),
        }
    }

    /// Builder: attach a metadata entry. Blank values are skipped.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        let value = value.into();
        if !value.is_blank() {
            self.metadata.insert(key.into(), value);
        }
        self
    }

    pub fn id(&self) -> EvidenceId {
        EvidenceId::new(self.kind, self.subject_id.clone())
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn kind(&self) -> EvidenceKind {
        self.kind
    }

    pub fn raw_content(&self) -> &str {
        &self.raw_content
    }

    pub fn metadata(&self) -> &BTreeMap<String, MetadataValue> {
        &self.metadata
    }

    pub fn source_uri(&self) -> &str {
        &self.source_uri
    }

    /// Look up a metadata entry.
    pub fn meta(&self, key: &str) -> Option<&MetadataValue> {
        self.metadata.get(key)
    }

    /// Short display name: the repository name without owner.
    pub fn display_name(&self) -> &str {
        self.subject_id
            .rsplit('/')
            .next()
            .unwrap_or(&self.subject_id)
    }

    /// The repository description, if any.
    pub fn description(&self) -> Option<&str> {
        self.meta(META_DESCRIPTION)
            .and_then(MetadataValue::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    pub fn stars(&self) -> i64 {
        self.meta(META_STARS).and_then(MetadataValue::as_i64).unwrap_or(0)
    }

    pub fn is_pinned(&self) -> bool {
        self.meta(META_PINNED).and_then(MetadataValue::as_bool).unwrap_or(false)
    }

    /// Last update of the underlying subject, used for recency tie-breaks.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.meta(META_UPDATED_AT).and_then(MetadataValue::as_datetime)
    }

    /// Whether a sub-agent has anything to reason about.
    pub fn is_analyzable(&self) -> bool {
        !self.raw_content.trim().is_empty() || self.description().is_some()
    }

    /// Text of a single field, used to check cited quotes.
    pub fn field_text(&self, field: &EvidenceField<'_>) -> Option<String> {
        match field {
            EvidenceField::RawContent => {
                Some(self.raw_content.clone()).filter(|s| !s.trim().is_empty())
            }
            EvidenceField::SourceUri => {
                Some(self.source_uri.clone()).filter(|s| !s.trim().is_empty())
            }
            EvidenceField::Metadata(key) => self.meta(key).map(ToString::to_string),
        }
    }

    /// Token set over what the record asserts: raw content and metadata
    /// values. Keys, identity and source URI only name things.
    pub fn token_corpus(&self) -> BTreeSet<String> {
        let mut corpus: BTreeSet<String> = tokenize(&self.raw_content).into_iter().collect();
        for value in self.metadata.values() {
            corpus.extend(tokenize(&value.to_string()));
        }
        corpus
    }

    /// Tokens of metadata keys and of the subject id.
    pub fn label_tokens(&self) -> BTreeSet<String> {
        let mut labels: BTreeSet<String> = tokenize(&self.subject_id).into_iter().collect();
        for key in self.metadata.keys() {
            labels.extend(tokenize(key));
        }
        labels
    }
}
