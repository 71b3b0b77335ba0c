use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::NormalizeError;

/// `owner/name` repository identifier. Comparison ignores ASCII case, matching
/// how GitHub resolves repository names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoId {
    owner: String,
    name: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self, NormalizeError> {
        let owner = owner.into();
        let name = name.into();
        let valid = |part: &str| {
            !part.is_empty()
                && part != "."
                && part != ".."
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if !valid(&owner) || !valid(&name) {
            return Err(NormalizeError::InvalidRepoId(format!("{owner}/{name}")));
        }
        Ok(Self { owner, name })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Lowercased `owner/name`, the identity used for hashing and ordering.
    pub fn key(&self) -> String {
        self.full_name().to_ascii_lowercase()
    }
}

impl FromStr for RepoId {
    type Err = NormalizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches(".git");
        let trimmed = trimmed
            .strip_prefix("https://github.com/")
            .unwrap_or(trimmed);
        match trimmed.split_once('/') {
            Some((owner, name)) if !name.contains('/') => RepoId::new(owner, name),
            _ => Err(NormalizeError::InvalidRepoId(s.to_string())),
        }
    }
}

impl TryFrom<String> for RepoId {
    type Error = NormalizeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RepoId> for String {
    fn from(value: RepoId) -> Self {
        value.full_name()
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl PartialEq for RepoId {
    fn eq(&self, other: &Self) -> bool {
        self.owner.eq_ignore_ascii_case(&other.owner) && self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl Eq for RepoId {}

impl Hash for RepoId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for RepoId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RepoId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Remote resources the pipeline knows how to fetch and cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Repository,
    PullRequests,
    Commits,
}

impl ResourceType {
    pub const ALL: [ResourceType; 3] = [
        ResourceType::Repository,
        ResourceType::PullRequests,
        ResourceType::Commits,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Repository => "repository",
            ResourceType::PullRequests => "pull_requests",
            ResourceType::Commits => "commits",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "repository" | "repo" => Some(ResourceType::Repository),
            "pull_requests" | "pulls" | "prs" => Some(ResourceType::PullRequests),
            "commits" => Some(ResourceType::Commits),
            _ => None,
        }
    }

    /// Natural identifier of a raw record: PR number, commit SHA or repository id.
    pub fn natural_id(&self, record: &Value) -> Option<String> {
        match self {
            ResourceType::PullRequests => record.get("number")?.as_u64().map(|n| n.to_string()),
            ResourceType::Commits => record
                .get("sha")?
                .as_str()
                .filter(|sha| !sha.is_empty())
                .map(str::to_string),
            ResourceType::Repository => match record.get("id") {
                Some(Value::Number(id)) => Some(id.to_string()),
                _ => record
                    .get("full_name")?
                    .as_str()
                    .map(|name| name.to_ascii_lowercase()),
            },
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Repository {
    pub id: RepoId,
    pub github_id: Option<i64>,
    pub default_branch: String,
    pub parent: Option<RepoId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Author {
    pub login: String,
    pub user_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PullRequestState {
    Open,
    Closed,
    Merged {
        merge_commit: String,
        merged_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PullRequest {
    pub repository: RepoId,
    pub number: u64,
    pub state: PullRequestState,
    pub author: Option<Author>,
    pub labels: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl PullRequest {
    pub fn is_merged(&self) -> bool {
        matches!(self.state, PullRequestState::Merged { .. })
    }

    pub fn merge_commit(&self) -> Option<&str> {
        match &self.state {
            PullRequestState::Merged { merge_commit, .. } => Some(merge_commit.as_str()),
            _ => None,
        }
    }

    pub fn merged_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            PullRequestState::Merged { merged_at, .. } => Some(*merged_at),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Commit {
    pub sha: String,
    pub parents: Vec<String>,
    pub author_name: Option<String>,
    pub author_login: Option<String>,
    pub authored_at: Option<DateTime<Utc>>,
    pub message: String,
}
