use std::collections::BTreeMap;

use normalizer::RepoId;
use serde::Serialize;

use crate::agents::{AgentDetector, Authorship};
use crate::corpus::ProjectData;

/// One merged pull request and the commit it landed as.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MergedCommit {
    pub number: u64,
    pub merge_commit: String,
    pub author: Option<String>,
    pub authorship: Authorship,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AuthorshipSummary {
    pub repository: RepoId,
    pub total: usize,
    pub developer: usize,
    pub agent: usize,
    pub developer_share: f64,
    pub agent_share: f64,
    pub dataset_agents: usize,
    pub heuristic_agents: usize,
    /// Merged commits per agent name.
    pub agents: BTreeMap<String, usize>,
}

impl AuthorshipSummary {
    pub fn empty(repository: RepoId) -> Self {
        Self {
            repository,
            total: 0,
            developer: 0,
            agent: 0,
            developer_share: 0.0,
            agent_share: 0.0,
            dataset_agents: 0,
            heuristic_agents: 0,
            agents: BTreeMap::new(),
        }
    }
}

pub fn merged_commits(project: &ProjectData, detector: &AgentDetector) -> Vec<MergedCommit> {
    let mut out: Vec<MergedCommit> = project
        .merged_pull_requests()
        .filter_map(|pr| {
            let merge_commit = pr.merge_commit()?.to_string();
            Some(MergedCommit {
                number: pr.number,
                merge_commit,
                author: pr.author.as_ref().map(|a| a.login.clone()),
                authorship: detector.classify(pr),
            })
        })
        .collect();
    out.sort_by_key(|c| c.number);
    out
}

pub fn summarize(repository: &RepoId, commits: &[MergedCommit]) -> AuthorshipSummary {
    let mut summary = AuthorshipSummary::empty(repository.clone());
    for commit in commits {
        summary.total += 1;
        match &commit.authorship {
            Authorship::Developer => summary.developer += 1,
            Authorship::Agent { name, source } => {
                summary.agent += 1;
                if source.is_heuristic() {
                    summary.heuristic_agents += 1;
                } else {
                    summary.dataset_agents += 1;
                }
                *summary.agents.entry(name.clone()).or_insert(0) += 1;
            }
        }
    }
    if summary.total > 0 {
        summary.developer_share = summary.developer as f64 / summary.total as f64;
        summary.agent_share = summary.agent as f64 / summary.total as f64;
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::DetectionSource;

    fn commit(number: u64, authorship: Authorship) -> MergedCommit {
        MergedCommit {
            number,
            merge_commit: format!("sha{number}"),
            author: None,
            authorship,
        }
    }

    #[test]
    fn shares_and_sources_add_up() {
        let repo: RepoId = "octo/widgets".parse().unwrap();
        let commits = vec![
            commit(1, Authorship::Developer),
            commit(
                2,
                Authorship::Agent {
                    name: "Copilot".into(),
                    source: DetectionSource::Dataset,
                },
            ),
            commit(
                3,
                Authorship::Agent {
                    name: "dependabot[bot]".into(),
                    source: DetectionSource::AppLogin,
                },
            ),
            commit(4, Authorship::Developer),
        ];
        let summary = summarize(&repo, &commits);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.developer, 2);
        assert_eq!(summary.agent, 2);
        assert_eq!(summary.dataset_agents, 1);
        assert_eq!(summary.heuristic_agents, 1);
        assert!((summary.agent_share - 0.5).abs() < 1e-9);
        assert_eq!(summary.agents.get("Copilot"), Some(&1));
    }

    #[test]
    fn empty_project_has_zero_shares() {
        let repo: RepoId = "octo/empty".parse().unwrap();
        let summary = summarize(&repo, &[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.agent_share, 0.0);
    }
}
