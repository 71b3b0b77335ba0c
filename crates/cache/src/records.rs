use std::collections::HashMap;

use chrono::{DateTime, Utc};
use normalizer::{RepoId, ResourceType};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::document::CacheDocument;

/// Deduplicated, read-only view of a cache key.
#[derive(Debug, Clone)]
pub struct RecordSet {
    repository: RepoId,
    resource: ResourceType,
    fetched_at: DateTime<Utc>,
    records: Vec<Value>,
    raw_len: usize,
    digest: String,
}

impl RecordSet {
    pub fn from_document(doc: &CacheDocument) -> Self {
        let records = dedup(doc.resource_type, &doc.records);
        let dropped = doc.records.len() - records.len();
        if dropped > 0 {
            tracing::debug!(
                repo = %doc.repository,
                resource = %doc.resource_type,
                dropped,
                "collapsed duplicate cache records"
            );
        }
        let digest = digest(&records);
        Self {
            repository: doc.repository.clone(),
            resource: doc.resource_type,
            fetched_at: doc.fetched_at,
            records,
            raw_len: doc.records.len(),
            digest,
        }
    }

    pub fn repository(&self) -> &RepoId {
        &self.repository
    }

    pub fn resource(&self) -> ResourceType {
        self.resource
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn records(&self) -> &[Value] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Raw records on disk before deduplication.
    pub fn raw_len(&self) -> usize {
        self.raw_len
    }

    /// Hex SHA-256 over the deduplicated records.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn summary(&self) -> RecordSetSummary {
        RecordSetSummary {
            repository: self.repository.clone(),
            resource: self.resource,
            fetched_at: self.fetched_at,
            records: self.records.len(),
            digest: self.digest.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RecordSetSummary {
    pub repository: RepoId,
    pub resource: ResourceType,
    pub fetched_at: DateTime<Utc>,
    pub records: usize,
    pub digest: String,
}

/// Collapses records sharing a natural id. The surviving value is the last one
/// written; it keeps the position of the first occurrence. Records without a
/// natural id cannot be deduplicated and are dropped.
pub fn dedup(resource: ResourceType, raw: &[Value]) -> Vec<Value> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(raw.len());
    let mut out: Vec<Value> = Vec::with_capacity(raw.len());
    let mut missing = 0usize;

    for record in raw {
        let Some(id) = resource.natural_id(record) else {
            missing += 1;
            continue;
        };
        match positions.get(&id) {
            Some(&index) => out[index] = record.clone(),
            None => {
                positions.insert(id, out.len());
                out.push(record.clone());
            }
        }
    }

    if missing > 0 {
        warn!(resource = %resource, missing, "dropped cache records without a natural id");
    }
    out
}

pub fn digest(records: &[Value]) -> String {
    let mut hasher = Sha256::new();
    for record in records {
        hasher.update(record.to_string().as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}
