use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use normalizer::{RepoId, ResourceType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub repository: RepoId,
    pub resource: ResourceType,
}

impl CacheKey {
    pub fn new(repository: &RepoId, resource: ResourceType) -> Self {
        Self {
            repository: repository.clone(),
            resource,
        }
    }

    /// `<root>/<owner>/<name>/<resource>.json`, lowercased so that ids
    /// differing only in case share one document.
    pub fn path(&self, root: &Path) -> PathBuf {
        root.join(self.repository.owner().to_ascii_lowercase())
            .join(self.repository.name().to_ascii_lowercase())
            .join(format!("{}.json", self.resource.as_str()))
    }

    pub fn temp_path(&self, root: &Path) -> PathBuf {
        self.path(root).with_extension("json.tmp")
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.repository, self.resource)
    }
}

/// On-disk form of one key. `records` holds every raw batch in the order it
/// was written; readers see the deduplicated view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheDocument {
    pub repository: RepoId,
    pub resource_type: ResourceType,
    pub fetched_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appended_at: Option<DateTime<Utc>>,
    pub records: Vec<Value>,
}

impl CacheDocument {
    pub fn new(key: &CacheKey, records: Vec<Value>) -> Self {
        Self {
            repository: key.repository.clone(),
            resource_type: key.resource,
            fetched_at: Utc::now(),
            appended_at: None,
            records,
        }
    }

    pub fn append(&mut self, batch: Vec<Value>) {
        self.records.extend(batch);
        self.appended_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_layout_is_owner_name_resource() {
        let repo: RepoId = "Octo/Widgets".parse().unwrap();
        let key = CacheKey::new(&repo, ResourceType::PullRequests);
        let path = key.path(Path::new("/tmp/cache"));
        assert_eq!(path, PathBuf::from("/tmp/cache/octo/widgets/pull_requests.json"));
        assert_eq!(
            key.temp_path(Path::new("/tmp/cache")),
            PathBuf::from("/tmp/cache/octo/widgets/pull_requests.json.tmp")
        );
    }

    #[test]
    fn document_serializes_expected_fields() {
        let repo: RepoId = "octo/widgets".parse().unwrap();
        let key = CacheKey::new(&repo, ResourceType::Commits);
        let doc = CacheDocument::new(&key, vec![serde_json::json!({"sha": "a"})]);
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["repository"], "octo/widgets");
        assert_eq!(value["resource_type"], "commits");
        assert!(value.get("fetched_at").is_some());
        assert!(value.get("appended_at").is_none());
        assert_eq!(value["records"][0]["sha"], "a");
    }
}
