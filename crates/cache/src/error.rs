use std::path::{Path, PathBuf};

use gh_fetcher::FetchError;
use normalizer::{RepoId, ResourceType};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A key was read before anything was ever fetched for it.
    #[error("no cached {resource} for {repository} and no fetch function supplied")]
    IncompleteCache {
        repository: RepoId,
        resource: ResourceType,
    },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("cache io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt cache document {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cache serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CacheError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T, E = CacheError> = std::result::Result<T, E>;
