use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use gh_fetcher::{FetchError, RemoteFetcher};
use normalizer::{RepoId, ResourceType};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};

use crate::document::{CacheDocument, CacheKey};
use crate::error::{CacheError, Result};
use crate::metrics;
use crate::records::RecordSet;

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    appends: AtomicU64,
    invalidations: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub fetches: u64,
    pub appends: u64,
    pub invalidations: u64,
}

/// File-backed store keyed by (repository, resource type).
///
/// ```text
/// <root>/<owner>/<name>/repository.json
/// <root>/<owner>/<name>/pull_requests.json
/// <root>/<owner>/<name>/commits.json
/// ```
///
/// All operations on one key are serialized by a per-key lock, so a key is
/// fetched at most once however many callers race for it. Documents are
/// written to a sibling temp file and renamed into place.
pub struct CacheStore {
    root: PathBuf,
    locks: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
    loaded: RwLock<HashMap<CacheKey, Arc<RecordSet>>>,
    counters: Counters,
}

impl CacheStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| CacheError::io(&root, e))?;
        info!(root = %root.display(), "cache store opened");
        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
            loaded: RwLock::new(HashMap::new()),
            counters: Counters::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the cached view for the key, running `fetch` and persisting its
    /// result only when nothing is cached yet.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        repository: &RepoId,
        resource: ResourceType,
        fetch: F,
    ) -> Result<Arc<RecordSet>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = std::result::Result<Vec<Value>, FetchError>> + Send,
    {
        let key = CacheKey::new(repository, resource);
        let _guard = self.lock_key(&key).await;

        if let Some(set) = self.lookup(&key).await? {
            self.record_hit(&key);
            return Ok(set);
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        metrics::MISSES
            .with_label_values(&[resource.as_str()])
            .inc();
        debug!(key = %key, "cache miss, fetching");

        let records = fetch().await?;
        let doc = CacheDocument::new(&key, records);
        self.write(&key, &doc).await?;
        self.counters.fetches.fetch_add(1, Ordering::Relaxed);
        metrics::COMMITS
            .with_label_values(&[resource.as_str()])
            .inc();

        let set = Arc::new(RecordSet::from_document(&doc));
        info!(key = %key, records = set.len(), raw = set.raw_len(), "cache entry committed");
        self.loaded.write().await.insert(key, set.clone());
        Ok(set)
    }

    pub async fn get_or_fetch_from<R>(
        &self,
        fetcher: &R,
        repository: &RepoId,
        resource: ResourceType,
    ) -> Result<Arc<RecordSet>>
    where
        R: RemoteFetcher + ?Sized,
    {
        self.get_or_fetch(repository, resource, || fetcher.fetch_all(repository, resource))
            .await
    }

    /// Read-only access for consumers that must never trigger a fetch.
    pub async fn get(&self, repository: &RepoId, resource: ResourceType) -> Result<Arc<RecordSet>> {
        let key = CacheKey::new(repository, resource);
        let _guard = self.lock_key(&key).await;
        match self.lookup(&key).await? {
            Some(set) => {
                self.record_hit(&key);
                Ok(set)
            }
            None => Err(CacheError::IncompleteCache {
                repository: repository.clone(),
                resource,
            }),
        }
    }

    pub async fn contains(&self, repository: &RepoId, resource: ResourceType) -> bool {
        let key = CacheKey::new(repository, resource);
        if self.loaded.read().await.contains_key(&key) {
            return true;
        }
        tokio::fs::try_exists(key.path(&self.root))
            .await
            .unwrap_or(false)
    }

    /// Adds a batch to the key. Existing raw records are kept; the
    /// deduplicated view lets the newest copy of a record win.
    pub async fn append(
        &self,
        repository: &RepoId,
        resource: ResourceType,
        batch: Vec<Value>,
    ) -> Result<Arc<RecordSet>> {
        let key = CacheKey::new(repository, resource);
        let _guard = self.lock_key(&key).await;

        let doc = match self.read_document(&key).await? {
            Some(mut doc) => {
                doc.append(batch);
                doc
            }
            None => CacheDocument::new(&key, batch),
        };
        self.write(&key, &doc).await?;
        self.counters.appends.fetch_add(1, Ordering::Relaxed);
        metrics::APPENDS
            .with_label_values(&[resource.as_str()])
            .inc();

        let set = Arc::new(RecordSet::from_document(&doc));
        debug!(key = %key, records = set.len(), raw = set.raw_len(), "batch appended");
        self.loaded.write().await.insert(key, set.clone());
        Ok(set)
    }

    /// Removes the key so the next `get_or_fetch` goes to the remote again.
    /// Returns whether anything was cached.
    pub async fn invalidate(&self, repository: &RepoId, resource: ResourceType) -> Result<bool> {
        let key = CacheKey::new(repository, resource);
        let guard = self.lock_key(&key).await;
        let result = self.remove_entry(&key).await;
        self.release_lock(&key, guard).await;
        result
    }

    async fn remove_entry(&self, key: &CacheKey) -> Result<bool> {
        let resource = key.resource;
        let was_loaded = self.loaded.write().await.remove(key).is_some();
        let path = key.path(&self.root);
        let removed = match tokio::fs::remove_file(&path).await {
            Ok(()) => true,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => false,
            Err(err) => return Err(CacheError::io(&path, err)),
        };

        let existed = was_loaded || removed;
        if existed {
            self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
            metrics::INVALIDATIONS
                .with_label_values(&[resource.as_str()])
                .inc();
            info!(key = %key, "cache entry invalidated");
        }
        Ok(existed)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            fetches: self.counters.fetches.load(Ordering::Relaxed),
            appends: self.counters.appends.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
        }
    }

    /// Ends the cache lifetime and logs what it did.
    pub fn close(self) -> CacheStats {
        let stats = self.stats();
        info!(
            root = %self.root.display(),
            hits = stats.hits,
            misses = stats.misses,
            fetches = stats.fetches,
            appends = stats.appends,
            invalidations = stats.invalidations,
            "cache store closed"
        );
        stats
    }

    async fn lock_key(&self, key: &CacheKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Forgets the key's lock unless another caller already holds a handle
    /// to it. `guard` is released afterwards.
    async fn release_lock(&self, key: &CacheKey, guard: OwnedMutexGuard<()>) {
        let mut locks = self.locks.lock().await;
        // one reference in the map, one in `guard`
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 2) {
            locks.remove(key);
        }
        drop(guard);
    }

    fn record_hit(&self, key: &CacheKey) {
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        metrics::HITS
            .with_label_values(&[key.resource.as_str()])
            .inc();
        debug!(key = %key, "cache hit");
    }

    /// Memory first, then disk. Caller holds the key lock.
    async fn lookup(&self, key: &CacheKey) -> Result<Option<Arc<RecordSet>>> {
        if let Some(set) = self.loaded.read().await.get(key) {
            return Ok(Some(set.clone()));
        }
        let Some(doc) = self.read_document(key).await? else {
            return Ok(None);
        };
        let set = Arc::new(RecordSet::from_document(&doc));
        self.loaded.write().await.insert(key.clone(), set.clone());
        Ok(Some(set))
    }

    async fn read_document(&self, key: &CacheKey) -> Result<Option<CacheDocument>> {
        let path = key.path(&self.root);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(CacheError::io(&path, err)),
        };
        let doc = serde_json::from_slice(&bytes)
            .map_err(|source| CacheError::Corrupt { path, source })?;
        Ok(Some(doc))
    }

    async fn write(&self, key: &CacheKey, doc: &CacheDocument) -> Result<()> {
        let path = key.path(&self.root);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CacheError::io(parent, e))?;
        }
        let tmp = key.temp_path(&self.root);
        let bytes = serde_json::to_vec_pretty(doc)?;
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| CacheError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| CacheError::io(&path, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn lock_entries(store: &CacheStore) -> usize {
        store.locks.lock().await.len()
    }

    #[tokio::test]
    async fn invalidate_forgets_the_key_lock() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CacheStore::open(dir.path()).await.expect("store");
        let repo: RepoId = "octo/widgets".parse().unwrap();

        store
            .get_or_fetch(&repo, ResourceType::Commits, || async {
                Ok(vec![json!({"sha": "a"})])
            })
            .await
            .expect("fetch");
        assert_eq!(lock_entries(&store).await, 1);

        assert!(store.invalidate(&repo, ResourceType::Commits).await.expect("invalidate"));
        assert_eq!(lock_entries(&store).await, 0);

        assert!(!store.invalidate(&repo, ResourceType::Commits).await.expect("again"));
        assert_eq!(lock_entries(&store).await, 0);
    }

    #[tokio::test]
    async fn lock_held_by_a_waiter_is_kept() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = CacheStore::open(dir.path()).await.expect("store");
        let key = CacheKey::new(&"octo/widgets".parse().unwrap(), ResourceType::Commits);

        let guard = store.lock_key(&key).await;
        let waiter = store.locks.lock().await.get(&key).cloned().expect("entry");
        store.release_lock(&key, guard).await;
        assert_eq!(lock_entries(&store).await, 1);

        drop(waiter);
        let guard = store.lock_key(&key).await;
        store.release_lock(&key, guard).await;
        assert_eq!(lock_entries(&store).await, 0);
    }
}
