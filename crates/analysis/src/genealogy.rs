use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use normalizer::{Commit, RepoId};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::corpus::Corpus;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum GenealogyError {
    #[error("{child} shares no commit with its parent {parent}")]
    NoCommonAncestor { child: RepoId, parent: RepoId },
    #[error("edge would close a cycle: {}", format_path(.path))]
    CycleDetected { path: Vec<RepoId> },
    #[error("{child} already descends from {existing}, refusing {proposed}")]
    ConflictingParent {
        child: RepoId,
        existing: RepoId,
        proposed: RepoId,
    },
}

fn format_path(path: &[RepoId]) -> String {
    path.iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GenealogyEdge {
    pub child: RepoId,
    pub parent: RepoId,
    pub divergence_sha: String,
}

/// Child-to-parent edges. Each child has at most one parent and no walk
/// along parents ever revisits a repository.
#[derive(Debug, Clone, Default)]
pub struct GenealogyForest {
    edges: BTreeMap<RepoId, GenealogyEdge>,
}

impl GenealogyForest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, edge: GenealogyEdge) -> Result<(), GenealogyError> {
        if let Some(existing) = self.edges.get(&edge.child) {
            if existing.parent == edge.parent {
                return Ok(());
            }
            return Err(GenealogyError::ConflictingParent {
                child: edge.child.clone(),
                existing: existing.parent.clone(),
                proposed: edge.parent.clone(),
            });
        }

        let mut path = vec![edge.child.clone(), edge.parent.clone()];
        let mut cursor = &edge.parent;
        loop {
            if *cursor == edge.child {
                return Err(GenealogyError::CycleDetected { path });
            }
            match self.edges.get(cursor) {
                Some(next) => {
                    path.push(next.parent.clone());
                    cursor = &next.parent;
                }
                None => break,
            }
        }

        self.edges.insert(edge.child.clone(), edge);
        Ok(())
    }

    pub fn parent_of(&self, repository: &RepoId) -> Option<&GenealogyEdge> {
        self.edges.get(repository)
    }

    /// Parent, grandparent and so on up to the root.
    pub fn ancestors<'a>(&'a self, repository: &'a RepoId) -> Ancestors<'a> {
        Ancestors {
            forest: self,
            cursor: repository,
            remaining: self.edges.len(),
        }
    }

    pub fn edges(&self) -> impl Iterator<Item = &GenealogyEdge> {
        self.edges.values()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn roots(&self) -> BTreeSet<&RepoId> {
        self.edges
            .values()
            .filter(|edge| !self.edges.contains_key(&edge.parent))
            .map(|edge| &edge.parent)
            .collect()
    }
}

pub struct Ancestors<'a> {
    forest: &'a GenealogyForest,
    cursor: &'a RepoId,
    remaining: usize,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a RepoId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let edge = self.forest.edges.get(self.cursor)?;
        self.remaining -= 1;
        self.cursor = &edge.parent;
        Some(&edge.parent)
    }
}

/// Shared commit with the latest authored timestamp. Ties, and commits
/// without a timestamp, fall back to the lexicographically smallest SHA.
pub fn divergence_commit(child: &[Commit], parent: &[Commit]) -> Option<String> {
    let parent_times: HashMap<&str, Option<DateTime<Utc>>> = parent
        .iter()
        .map(|c| (c.sha.as_str(), c.authored_at))
        .collect();

    let mut best: Option<(Option<DateTime<Utc>>, &str)> = None;
    for commit in child {
        let Some(parent_time) = parent_times.get(commit.sha.as_str()) else {
            continue;
        };
        let at = commit.authored_at.or(*parent_time);
        let candidate = (at, commit.sha.as_str());
        best = match best {
            None => Some(candidate),
            Some(current) => {
                let newer = candidate.0 > current.0;
                let same_time_smaller = candidate.0 == current.0 && candidate.1 < current.1;
                if newer || same_time_smaller {
                    Some(candidate)
                } else {
                    Some(current)
                }
            }
        };
    }
    best.map(|(_, sha)| sha.to_string())
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkippedRepository {
    pub repository: RepoId,
    pub parent: RepoId,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct GenealogyReport {
    pub forest: GenealogyForest,
    pub skipped: Vec<SkippedRepository>,
}

/// Links every fork in `repositories` to its parent. A fork whose history
/// shares nothing with the parent is skipped; a cycle aborts the build.
pub fn build(corpus: &Corpus, repositories: &[RepoId]) -> Result<GenealogyReport, GenealogyError> {
    let mut report = GenealogyReport::default();
    let mut unique: BTreeSet<&RepoId> = BTreeSet::new();
    for repo in repositories {
        match corpus.get(repo) {
            Some(project) => {
                unique.insert(project.id());
            }
            None => debug!(repo = %repo, "not in corpus, no genealogy"),
        }
    }

    for repo in unique {
        let Some(project) = corpus.get(repo) else {
            continue;
        };
        let Some(parent_ref) = project.parent() else {
            continue;
        };

        // Edges point at the parent's corpus key so ancestor walks resolve.
        let parent_project = corpus.get(parent_ref);
        let parent = parent_project.map(|p| p.id()).unwrap_or(parent_ref);
        let parent_commits = parent_project
            .map(|p| p.commits.as_slice())
            .unwrap_or_default();
        match divergence_commit(&project.commits, parent_commits) {
            Some(sha) => {
                debug!(child = %repo, parent = %parent, divergence = %sha, "genealogy edge");
                report.forest.insert(GenealogyEdge {
                    child: repo.clone(),
                    parent: parent.clone(),
                    divergence_sha: sha,
                })?;
            }
            None => {
                let err = GenealogyError::NoCommonAncestor {
                    child: repo.clone(),
                    parent: parent.clone(),
                };
                let reason = if corpus.contains(parent) {
                    err.to_string()
                } else {
                    format!("{err} (parent history unavailable)")
                };
                warn!(child = %repo, parent = %parent, "no common ancestor, skipping");
                report.skipped.push(SkippedRepository {
                    repository: repo.clone(),
                    parent: parent.clone(),
                    reason,
                });
            }
        }
    }

    info!(
        edges = report.forest.len(),
        skipped = report.skipped.len(),
        "genealogy built"
    );
    Ok(report)
}
