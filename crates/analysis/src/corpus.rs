use std::collections::{BTreeMap, HashSet};

use cache::{CacheStore, RecordSet, RecordSetSummary};
use normalizer::{
    decode_commit, decode_pull_request, decode_repository, Commit, NormalizeError, PullRequest,
    RepoId, Repository, ResourceType,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Normalized view of one repository, decoded from its cache entries.
#[derive(Debug, Clone)]
pub struct ProjectData {
    /// The identifier the data was requested and cached under.
    pub id: RepoId,
    /// Metadata as GitHub recorded it. Its `id` is the canonical name, which
    /// differs from `id` after a rename or transfer. `None` when the cache
    /// entry holds no decodable repository record.
    pub repository: Option<Repository>,
    pub pull_requests: Vec<PullRequest>,
    pub commits: Vec<Commit>,
    /// Cache records that failed to decode.
    pub skipped_records: usize,
    pub sources: Vec<RecordSetSummary>,
}

impl ProjectData {
    /// Reads the repository and commits, plus pull requests when asked. Every
    /// key must already be cached; a missing one is `IncompleteCache`.
    pub async fn from_cache(
        store: &CacheStore,
        repository: &RepoId,
        with_pull_requests: bool,
    ) -> Result<Self> {
        let repo_set = store.get(repository, ResourceType::Repository).await?;
        let commit_set = store.get(repository, ResourceType::Commits).await?;
        let pr_set = if with_pull_requests {
            Some(store.get(repository, ResourceType::PullRequests).await?)
        } else {
            None
        };

        let mut skipped = 0usize;
        let record = decode_all(&repo_set, &mut skipped, decode_repository)
            .into_iter()
            .next();
        match &record {
            None => warn!(repo = %repository, "repository metadata missing from cache entry"),
            Some(record) if record.id != *repository => info!(
                repo = %repository,
                canonical = %record.id,
                "repository is known to GitHub under another name"
            ),
            Some(_) => {}
        }
        let commits = decode_all(&commit_set, &mut skipped, decode_commit);
        let pull_requests = match &pr_set {
            Some(set) => decode_all(set, &mut skipped, |raw| decode_pull_request(raw, repository)),
            None => Vec::new(),
        };

        let mut sources = vec![repo_set.summary(), commit_set.summary()];
        if let Some(set) = &pr_set {
            sources.push(set.summary());
        }

        Ok(Self {
            id: repository.clone(),
            repository: record,
            pull_requests,
            commits,
            skipped_records: skipped,
            sources,
        })
    }

    pub fn id(&self) -> &RepoId {
        &self.id
    }

    /// Name GitHub reports for the repository, when it differs from `id`.
    pub fn canonical(&self) -> Option<&RepoId> {
        self.repository
            .as_ref()
            .map(|r| &r.id)
            .filter(|canonical| **canonical != self.id)
    }

    pub fn parent(&self) -> Option<&RepoId> {
        self.repository.as_ref()?.parent.as_ref()
    }

    pub fn commit_shas(&self) -> HashSet<&str> {
        self.commits.iter().map(|c| c.sha.as_str()).collect()
    }

    pub fn merged_pull_requests(&self) -> impl Iterator<Item = &PullRequest> {
        self.pull_requests.iter().filter(|pr| pr.is_merged())
    }
}

fn decode_all<T>(
    set: &RecordSet,
    skipped: &mut usize,
    decode: impl Fn(&Value) -> Result<T, NormalizeError>,
) -> Vec<T> {
    let mut out = Vec::with_capacity(set.len());
    for raw in set.records() {
        match decode(raw) {
            Ok(value) => out.push(value),
            Err(err) => {
                *skipped += 1;
                warn!(
                    repo = %set.repository(),
                    resource = %set.resource(),
                    error = %err,
                    "skipping undecodable record"
                );
            }
        }
    }
    out
}

/// All projects known to one analysis run, keyed by the requested
/// identifier. Lookups by a project's canonical name resolve to it as well.
#[derive(Debug, Default, Clone)]
pub struct Corpus {
    projects: BTreeMap<RepoId, ProjectData>,
    aliases: BTreeMap<RepoId, RepoId>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, project: ProjectData) {
        debug!(
            repo = %project.id(),
            commits = project.commits.len(),
            pull_requests = project.pull_requests.len(),
            "project added to corpus"
        );
        if let Some(canonical) = project.canonical() {
            self.aliases.insert(canonical.clone(), project.id().clone());
        }
        self.projects.insert(project.id().clone(), project);
    }

    pub fn get(&self, repository: &RepoId) -> Option<&ProjectData> {
        self.projects.get(repository).or_else(|| {
            self.aliases
                .get(repository)
                .and_then(|key| self.projects.get(key))
        })
    }

    pub fn contains(&self, repository: &RepoId) -> bool {
        self.get(repository).is_some()
    }

    pub fn projects(&self) -> impl Iterator<Item = &ProjectData> {
        self.projects.values()
    }

    pub fn repositories(&self) -> impl Iterator<Item = &RepoId> {
        self.projects.keys()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

impl FromIterator<ProjectData> for Corpus {
    fn from_iter<I: IntoIterator<Item = ProjectData>>(iter: I) -> Self {
        let mut corpus = Corpus::new();
        for project in iter {
            corpus.insert(project);
        }
        corpus
    }
}
