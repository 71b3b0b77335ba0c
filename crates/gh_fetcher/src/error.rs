use http::StatusCode;
use normalizer::{RepoId, ResourceType};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Retry budget exhausted, or the remote refused our credentials.
    #[error("{resource} for {repository} unavailable after {attempts} attempt(s): {reason}")]
    RemoteUnavailable {
        repository: RepoId,
        resource: ResourceType,
        attempts: u32,
        reason: String,
    },
    /// Non-retryable client error such as 404 for a deleted repository.
    #[error("unexpected status {status} for {endpoint}")]
    Rejected { status: StatusCode, endpoint: String },
    #[error("cannot decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    pub fn is_remote_unavailable(&self) -> bool {
        matches!(self, FetchError::RemoteUnavailable { .. })
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            FetchError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}
