//! Read-only evidence store for one run.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use super::normalizer::ingest_github_payload;
use super::record::{EvidenceId, EvidenceKind, EvidenceRecord};
use crate::utilities::errors::EvidenceError;

/// Mapping from evidence identifier to record. Immutable once built; shared
/// between stages behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct EvidenceStore {
    records: BTreeMap<EvidenceId, Arc<EvidenceRecord>>,
}

impl EvidenceStore {
    pub fn builder() -> EvidenceStoreBuilder {
        EvidenceStoreBuilder::default()
    }

    /// Build a store from records; identities must be unique.
    pub fn from_records(
        records: impl IntoIterator<Item = EvidenceRecord>,
    ) -> Result<Self, EvidenceError> {
        let mut builder = Self::builder();
        for record in records {
            builder.insert(record)?;
        }
        Ok(builder.build())
    }

    /// Load evidence from JSON. Accepts a list of records, an object with a
    /// `records` list, or a GitHub GraphQL profile payload.
    pub fn from_json(value: &Value) -> Result<Self, EvidenceError> {
        let records = match value {
            Value::Array(_) => value,
            Value::Object(map) if map.contains_key("records") => &map["records"],
            Value::Object(map) if map.contains_key("data") || map.contains_key("user") => {
                return ingest_github_payload(value);
            }
            _ => {
                return Err(EvidenceError::InvalidPayload {
                    message: "expected a record list or a profile payload".to_string(),
                })
            }
        };
        let records: Vec<EvidenceRecord> =
            serde_json::from_value(records.clone()).map_err(|e| EvidenceError::InvalidPayload {
                message: e.to_string(),
            })?;
        Self::from_records(records)
    }

    pub fn get(&self, id: &EvidenceId) -> Option<&Arc<EvidenceRecord>> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &EvidenceId) -> bool {
        self.records.contains_key(id)
    }

    /// Records for the ids that resolve; unknown ids are skipped.
    pub fn resolve<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a EvidenceId>,
    ) -> Vec<Arc<EvidenceRecord>> {
        ids.into_iter()
            .filter_map(|id| self.records.get(id).cloned())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EvidenceRecord>> {
        self.records.values()
    }

    pub fn repositories(&self) -> impl Iterator<Item = &Arc<EvidenceRecord>> {
        self.iter().filter(|r| r.kind() == EvidenceKind::Repository)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &Arc<EvidenceRecord>> {
        self.iter().filter(|r| r.kind() == EvidenceKind::Profile)
    }

    /// The profile record, if the store has one.
    pub fn profile(&self) -> Option<&Arc<EvidenceRecord>> {
        self.profiles().next()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Accumulates records before the store is frozen.
#[derive(Debug, Default)]
pub struct EvidenceStoreBuilder {
    records: BTreeMap<EvidenceId, Arc<EvidenceRecord>>,
}

impl EvidenceStoreBuilder {
    /// Add a record. A second record with the same identity is an error.
    pub fn insert(&mut self, record: EvidenceRecord) -> Result<&mut Self, EvidenceError> {
        let id = record.id();
        if self.records.contains_key(&id) {
            return Err(EvidenceError::DuplicateRecord { id: id.to_string() });
        }
        self.records.insert(id, Arc::new(record));
        Ok(self)
    }

    pub fn build(self) -> EvidenceStore {
        log::debug!("Evidence store frozen with {} records", self.records.len());
        EvidenceStore {
            records: self.records,
        }
    }
}
