use serde_json::Value;

use crate::models::{Author, Commit, PullRequest, PullRequestState, RepoId, Repository};
use crate::payloads::{CommitPayload, PullRequestPayload, RepoPayload, UserRef};
use crate::NormalizeError;

pub fn normalize_repo(payload: &RepoPayload) -> Result<Repository, NormalizeError> {
    let id: RepoId = payload.full_name.parse()?;
    let parent = match &payload.parent {
        Some(parent) if payload.fork => Some(parent.full_name.parse()?),
        _ => None,
    };
    Ok(Repository {
        id,
        github_id: Some(payload.id),
        default_branch: payload
            .default_branch
            .clone()
            .unwrap_or_else(|| "main".to_string()),
        parent,
        created_at: payload.created_at,
    })
}

pub fn normalize_pull_request(
    payload: &PullRequestPayload,
    repository: &RepoId,
) -> Result<PullRequest, NormalizeError> {
    let state = match (payload.merged_at, payload.merge_commit_sha.as_deref()) {
        (Some(merged_at), Some(sha)) if !sha.is_empty() => PullRequestState::Merged {
            merge_commit: sha.to_string(),
            merged_at,
        },
        (Some(_), _) => {
            return Err(NormalizeError::MergedWithoutCommit {
                repository: repository.to_string(),
                number: payload.number,
            })
        }
        (None, _) => match payload.state.as_str() {
            "open" => PullRequestState::Open,
            "closed" => PullRequestState::Closed,
            other => {
                return Err(NormalizeError::UnknownState {
                    number: payload.number,
                    state: other.to_string(),
                })
            }
        },
    };

    Ok(PullRequest {
        repository: repository.clone(),
        number: payload.number,
        state,
        author: payload.user.as_ref().map(author_from),
        labels: payload.labels.iter().map(|l| l.name.clone()).collect(),
        created_at: payload.created_at,
    })
}

pub fn normalize_commit(payload: &CommitPayload) -> Commit {
    let signature = payload.commit.author.as_ref();
    Commit {
        sha: payload.sha.clone(),
        parents: payload.parents.iter().map(|p| p.sha.clone()).collect(),
        author_name: signature.and_then(|s| s.name.clone()),
        author_login: payload.author.as_ref().map(|a| a.login.clone()),
        authored_at: signature.and_then(|s| s.date),
        message: payload.commit.message.clone(),
    }
}

pub fn decode_repository(raw: &Value) -> Result<Repository, NormalizeError> {
    let payload: RepoPayload = serde_json::from_value(raw.clone())?;
    normalize_repo(&payload)
}

pub fn decode_pull_request(raw: &Value, repository: &RepoId) -> Result<PullRequest, NormalizeError> {
    let payload: PullRequestPayload = serde_json::from_value(raw.clone())?;
    normalize_pull_request(&payload, repository)
}

pub fn decode_commit(raw: &Value) -> Result<Commit, NormalizeError> {
    let payload: CommitPayload = serde_json::from_value(raw.clone())?;
    Ok(normalize_commit(&payload))
}

fn author_from(user: &UserRef) -> Author {
    Author {
        login: user.login.clone(),
        user_type: user.user_type.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn repo() -> RepoId {
        "octo/widgets".parse().unwrap()
    }

    #[test]
    fn merged_pull_request_carries_merge_commit() {
        let raw = json!({
            "number": 7,
            "state": "closed",
            "user": {"login": "dependabot[bot]", "type": "Bot"},
            "labels": [{"name": "dependencies"}],
            "created_at": "2025-01-02T00:00:00Z",
            "merged_at": "2025-01-03T00:00:00Z",
            "merge_commit_sha": "abc123"
        });
        let pr = decode_pull_request(&raw, &repo()).unwrap();
        assert!(pr.is_merged());
        assert_eq!(pr.merge_commit(), Some("abc123"));
        assert_eq!(pr.labels, vec!["dependencies".to_string()]);
        assert_eq!(pr.author.unwrap().user_type.as_deref(), Some("Bot"));
    }

    #[test]
    fn closed_pull_request_drops_test_merge_sha() {
        let raw = json!({
            "number": 8,
            "state": "closed",
            "created_at": "2025-01-02T00:00:00Z",
            "merged_at": null,
            "merge_commit_sha": "deadbeef"
        });
        let pr = decode_pull_request(&raw, &repo()).unwrap();
        assert_eq!(pr.state, PullRequestState::Closed);
        assert_eq!(pr.merge_commit(), None);
    }

    #[test]
    fn merged_without_sha_is_rejected() {
        let raw = json!({
            "number": 9,
            "state": "closed",
            "created_at": "2025-01-02T00:00:00Z",
            "merged_at": "2025-01-03T00:00:00Z",
            "merge_commit_sha": null
        });
        let err = decode_pull_request(&raw, &repo()).unwrap_err();
        assert!(matches!(err, NormalizeError::MergedWithoutCommit { number: 9, .. }));
    }

    #[test]
    fn fork_parent_is_only_recorded_for_forks() {
        let raw = json!({
            "id": 1,
            "full_name": "alice/widgets",
            "fork": true,
            "default_branch": "trunk",
            "created_at": "2024-05-01T00:00:00Z",
            "parent": {"full_name": "octo/widgets"}
        });
        let repository = decode_repository(&raw).unwrap();
        assert_eq!(repository.parent, Some(repo()));
        assert_eq!(repository.default_branch, "trunk");

        let mut not_fork = raw.clone();
        not_fork["fork"] = json!(false);
        assert_eq!(decode_repository(&not_fork).unwrap().parent, None);
    }

    #[test]
    fn commit_reads_author_signature() {
        let raw = json!({
            "sha": "c0ffee",
            "parents": [{"sha": "b0b"}],
            "commit": {
                "author": {"name": "Ada", "date": "2025-02-01T10:00:00Z"},
                "message": "fix: things"
            },
            "author": null
        });
        let commit = decode_commit(&raw).unwrap();
        assert_eq!(commit.parents, vec!["b0b".to_string()]);
        assert_eq!(commit.author_name.as_deref(), Some("Ada"));
        assert!(commit.author_login.is_none());
        assert!(commit.authored_at.is_some());
    }
}
