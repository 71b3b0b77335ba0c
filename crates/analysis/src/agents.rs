use std::collections::HashMap;
use std::path::Path;

use common::config::AgentsConfig;
use normalizer::{PullRequest, RepoId};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AnalysisError, Result};

const KNOWN_BOTS: &[&str] = &[
    "dependabot",
    "renovate",
    "snyk-bot",
    "imgbot",
    "github-actions",
    "codecov",
];

const BOT_LABELS: &[&str] = &["bot", "automated-pr", "dependencies", "auto-generated"];

macro_rules! lazy_regex {
    ($name:ident = $pattern:expr) => {
        static $name: once_cell::sync::Lazy<Regex> =
            once_cell::sync::Lazy::new(|| Regex::new($pattern).expect("invalid regex"));
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    Dataset,
    ApiType,
    AppLogin,
    KnownBot,
    Label,
}

impl DetectionSource {
    pub fn is_heuristic(&self) -> bool {
        !matches!(self, DetectionSource::Dataset)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Authorship {
    Developer,
    Agent { name: String, source: DetectionSource },
}

impl Authorship {
    pub fn is_agent(&self) -> bool {
        matches!(self, Authorship::Agent { .. })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetEntry {
    pub repository: RepoId,
    pub number: u64,
    pub agent: String,
}

/// Pull requests already attributed to an agent by an external dataset.
#[derive(Debug, Clone, Default)]
pub struct AgentDataset {
    entries: HashMap<(RepoId, u64), String>,
}

impl AgentDataset {
    pub fn from_entries(entries: impl IntoIterator<Item = DatasetEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|e| ((e.repository, e.number), e.agent))
            .collect();
        Self { entries }
    }

    /// Reads a JSON array of `{repository, number, agent}` objects.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|source| AnalysisError::DatasetIo {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: Vec<DatasetEntry> =
            serde_json::from_slice(&bytes).map_err(|source| AnalysisError::DatasetFormat {
                path: path.to_path_buf(),
                source,
            })?;
        info!(path = %path.display(), entries = entries.len(), "agent dataset loaded");
        Ok(Self::from_entries(entries))
    }

    pub fn agent_for(&self, repository: &RepoId, number: u64) -> Option<&str> {
        self.entries
            .get(&(repository.clone(), number))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Classifies pull requests as developer or agent work. Dataset truth is
/// consulted first, then the heuristics in decreasing confidence.
pub struct AgentDetector {
    dataset: AgentDataset,
    known_bots: Option<Regex>,
    labels: Vec<String>,
}

impl Default for AgentDetector {
    fn default() -> Self {
        Self::new(AgentDataset::default(), &[], &[])
    }
}

impl AgentDetector {
    pub fn new(dataset: AgentDataset, extra_logins: &[String], extra_labels: &[String]) -> Self {
        let logins: Vec<String> = KNOWN_BOTS
            .iter()
            .map(|s| s.to_string())
            .chain(extra_logins.iter().map(|s| s.trim().to_ascii_lowercase()))
            .filter(|s| !s.is_empty())
            .collect();
        let pattern = logins
            .iter()
            .map(|login| regex::escape(login))
            .collect::<Vec<_>>()
            .join("|");
        let known_bots = match Regex::new(&pattern) {
            Ok(re) => Some(re),
            Err(err) => {
                warn!(error = %err, "cannot compile known bot pattern");
                None
            }
        };
        let labels = BOT_LABELS
            .iter()
            .map(|s| s.to_string())
            .chain(extra_labels.iter().map(|s| s.trim().to_ascii_lowercase()))
            .collect();
        Self {
            dataset,
            known_bots,
            labels,
        }
    }

    pub fn from_config(config: &AgentsConfig) -> Result<Self> {
        let dataset = match &config.dataset_path {
            Some(path) => AgentDataset::load(path)?,
            None => AgentDataset::default(),
        };
        Ok(Self::new(dataset, &config.known_logins, &config.labels))
    }

    pub fn classify(&self, pr: &PullRequest) -> Authorship {
        if let Some(agent) = self.dataset.agent_for(&pr.repository, pr.number) {
            return Authorship::Agent {
                name: agent.to_string(),
                source: DetectionSource::Dataset,
            };
        }

        if let Some(author) = &pr.author {
            let login = author.login.to_ascii_lowercase();
            if author.user_type.as_deref() == Some("Bot") {
                return agent(&author.login, DetectionSource::ApiType);
            }
            lazy_regex!(APP_LOGIN_RE = r"\[bot\]$");
            if APP_LOGIN_RE.is_match(&login) {
                return agent(&author.login, DetectionSource::AppLogin);
            }
            if self
                .known_bots
                .as_ref()
                .is_some_and(|re| re.is_match(&login))
            {
                return agent(&author.login, DetectionSource::KnownBot);
            }
        }

        let labelled = pr
            .labels
            .iter()
            .map(|l| l.to_ascii_lowercase())
            .any(|l| self.labels.iter().any(|bot| *bot == l));
        if labelled {
            return Authorship::Agent {
                name: "suspected agent".to_string(),
                source: DetectionSource::Label,
            };
        }

        Authorship::Developer
    }
}

fn agent(login: &str, source: DetectionSource) -> Authorship {
    Authorship::Agent {
        name: login.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use normalizer::{Author, PullRequestState};

    fn pr(login: &str, user_type: Option<&str>, labels: &[&str]) -> PullRequest {
        PullRequest {
            repository: "octo/widgets".parse().unwrap(),
            number: 7,
            state: PullRequestState::Merged {
                merge_commit: "abc".into(),
                merged_at: Utc::now(),
            },
            author: Some(Author {
                login: login.to_string(),
                user_type: user_type.map(str::to_string),
            }),
            labels: labels.iter().map(|s| s.to_string()).collect(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn dataset_wins_over_heuristics() {
        let dataset = AgentDataset::from_entries(vec![DatasetEntry {
            repository: "Octo/Widgets".parse().unwrap(),
            number: 7,
            agent: "Copilot".into(),
        }]);
        let detector = AgentDetector::new(dataset, &[], &[]);
        assert_eq!(
            detector.classify(&pr("dependabot[bot]", Some("Bot"), &[])),
            Authorship::Agent {
                name: "Copilot".into(),
                source: DetectionSource::Dataset
            }
        );
    }

    #[test]
    fn heuristics_in_order() {
        let detector = AgentDetector::default();
        let source = |p: PullRequest| match detector.classify(&p) {
            Authorship::Agent { source, .. } => Some(source),
            Authorship::Developer => None,
        };
        assert_eq!(source(pr("someapp", Some("Bot"), &[])), Some(DetectionSource::ApiType));
        assert_eq!(source(pr("Some-App[bot]", Some("User"), &[])), Some(DetectionSource::AppLogin));
        assert_eq!(source(pr("renovate-runner", None, &[])), Some(DetectionSource::KnownBot));
        assert_eq!(source(pr("alice", None, &["Dependencies"])), Some(DetectionSource::Label));
        assert_eq!(source(pr("alice", Some("User"), &["bug"])), None);
    }

    #[test]
    fn configured_logins_and_labels_extend_defaults() {
        let detector = AgentDetector::new(
            AgentDataset::default(),
            &["Release-Please".to_string()],
            &["ai-generated".to_string()],
        );
        assert!(detector.classify(&pr("release-please", None, &[])).is_agent());
        assert!(detector.classify(&pr("bob", None, &["AI-Generated"])).is_agent());
    }
}
