pub mod models;
pub mod payloads;
pub mod transform;

pub use models::{
    Author, Commit, PullRequest, PullRequestState, RepoId, Repository, ResourceType,
};
pub use payloads::{CommitPayload, PullRequestPayload, RepoPayload, UserRef};
pub use transform::{
    decode_commit, decode_pull_request, decode_repository, normalize_commit,
    normalize_pull_request, normalize_repo,
};

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("invalid repository identifier: {0}")]
    InvalidRepoId(String),
    #[error("pull request {repository}#{number} is merged but has no merge commit")]
    MergedWithoutCommit { repository: String, number: u64 },
    #[error("pull request #{number} has unknown state {state}")]
    UnknownState { number: u64, state: String },
    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),
}
