use std::collections::{BTreeSet, HashSet};

use analysis::{
    analyze_all, build, merged_commits, summarize, AgentDetector, AuthorshipSummary,
    BalanceFilter, Corpus, ProjectData, ProjectFilter,
};
use cache::{CacheError, CacheStore};
use chrono::Utc;
use common::config::PipelineConfig;
use common::{AppConfig, AppError, Result};
use futures::stream::{self, StreamExt};
use gh_fetcher::{FetchError, RemoteFetcher};
use normalizer::{RepoId, ResourceType};
use prometheus::HistogramTimer;
use tracing::{info, instrument, warn};

use crate::metrics::{self, ActiveRepoGuard};
use crate::report::{
    BalanceResult, FailureStage, PipelineReport, RenamedRepository, RepoFailure,
};
use crate::seeds::parse_refresh_key;

const LINEAGE_RESOURCES: [ResourceType; 2] = [ResourceType::Repository, ResourceType::Commits];

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_concurrent_repos: usize,
    pub max_lineage_depth: usize,
    pub refresh: Vec<String>,
}

impl From<&PipelineConfig> for PipelineSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_concurrent_repos: config.max_concurrent_repos,
            max_lineage_depth: config.max_lineage_depth,
            refresh: config.refresh.clone(),
        }
    }
}

/// One analysis run over a seed list. Every read goes through the cache
/// store; the remote fetcher is only ever invoked by it on a miss.
pub struct Pipeline<'a> {
    store: &'a CacheStore,
    fetcher: &'a dyn RemoteFetcher,
    settings: PipelineSettings,
    filter: ProjectFilter,
    balance: Option<BalanceFilter>,
    detector: AgentDetector,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        store: &'a CacheStore,
        fetcher: &'a dyn RemoteFetcher,
        settings: PipelineSettings,
        filter: ProjectFilter,
        detector: AgentDetector,
    ) -> Self {
        Self {
            store,
            fetcher,
            settings,
            filter,
            balance: None,
            detector,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        store: &'a CacheStore,
        fetcher: &'a dyn RemoteFetcher,
        detector: AgentDetector,
    ) -> Self {
        Self::new(
            store,
            fetcher,
            PipelineSettings::from(&config.pipeline),
            ProjectFilter::from_config(&config.filter),
            detector,
        )
        .with_balance(config.filter.balance.map(BalanceFilter::from))
    }

    pub fn with_balance(mut self, balance: Option<BalanceFilter>) -> Self {
        self.balance = balance;
        self
    }

    #[instrument(skip_all, fields(seeds = seeds.len()))]
    pub async fn run(&self, seeds: &[RepoId]) -> Result<PipelineReport> {
        metrics::RUNS_TOTAL.inc();
        metrics::SEED_REPOS.set(seeds.len() as i64);
        let mut failures = Vec::new();

        self.refresh().await?;

        let timer = stage_timer("fetch");
        let fetched = self.warm(seeds, &mut failures).await;
        timer.observe_duration();

        let timer = stage_timer("load");
        let mut corpus = Corpus::new();
        for repo in &fetched {
            let project = ProjectData::from_cache(self.store, repo, true)
                .await
                .map_err(AppError::cache)?;
            corpus.insert(project);
        }
        timer.observe_duration();

        let timer = stage_timer("filter");
        let decisions = self.filter.decisions(&corpus, &fetched);
        let kept: Vec<RepoId> = decisions
            .iter()
            .filter(|decision| decision.kept)
            .map(|decision| decision.repository.clone())
            .collect();
        let authorship: Vec<AuthorshipSummary> = kept
            .iter()
            .filter_map(|repo| corpus.get(repo))
            .map(|project| summarize(project.id(), &merged_commits(project, &self.detector)))
            .collect();
        let balance: Vec<BalanceResult> = match &self.balance {
            Some(filter) => authorship
                .iter()
                .map(|summary| BalanceResult {
                    repository: summary.repository.clone(),
                    balanced: filter.accepts(summary),
                })
                .collect(),
            None => Vec::new(),
        };
        let study: Vec<RepoId> = if self.balance.is_some() {
            balance
                .iter()
                .filter(|result| result.balanced)
                .map(|result| result.repository.clone())
                .collect()
        } else {
            kept.clone()
        };
        timer.observe_duration();
        info!(
            fetched = fetched.len(),
            kept = kept.len(),
            study = study.len(),
            "filters applied"
        );

        let timer = stage_timer("lineage");
        let ancestors = self.load_lineage(&study, &mut corpus, &mut failures).await?;
        timer.observe_duration();

        let timer = stage_timer("genealogy");
        let mut scope = study.clone();
        scope.extend(ancestors);
        let genealogy = build(&corpus, &scope).map_err(AppError::genealogy)?;
        timer.observe_duration();

        let timer = stage_timer("density");
        let clone_density = analyze_all(&study, &corpus, &genealogy.forest);
        timer.observe_duration();

        let sources = corpus
            .projects()
            .flat_map(|project| project.sources.iter().cloned())
            .collect();
        let renamed = corpus
            .projects()
            .filter_map(|project| {
                Some(RenamedRepository {
                    requested: project.id().clone(),
                    canonical: project.canonical()?.clone(),
                })
            })
            .collect();

        Ok(PipelineReport {
            generated_at: Utc::now(),
            seeds: seeds.to_vec(),
            filter: decisions,
            kept,
            authorship,
            balance,
            study,
            genealogy: genealogy.forest.edges().cloned().collect(),
            skipped: genealogy.skipped,
            clone_density,
            failures,
            renamed,
            cache: self.store.stats(),
            sources,
        })
    }

    async fn refresh(&self) -> Result<()> {
        for key in &self.settings.refresh {
            for (repo, resource) in parse_refresh_key(key)? {
                let removed = self
                    .store
                    .invalidate(&repo, resource)
                    .await
                    .map_err(AppError::cache)?;
                info!(repo = %repo, resource = %resource, removed, "refresh requested");
            }
        }
        Ok(())
    }

    /// Makes sure every seed is fully cached. Seeds that cannot be fetched are
    /// reported and left out; the rest keep their seed order.
    async fn warm(&self, seeds: &[RepoId], failures: &mut Vec<RepoFailure>) -> Vec<RepoId> {
        let unique: Vec<&RepoId> = {
            let mut seen = HashSet::new();
            seeds.iter().filter(|repo| seen.insert(*repo)).collect()
        };
        let mut outcomes: Vec<_> = stream::iter(unique.into_iter().enumerate())
            .map(|(idx, repo)| async move {
                let _active = ActiveRepoGuard::new();
                let result = self.fetch_resources(repo, &ResourceType::ALL).await;
                (idx, repo.clone(), result)
            })
            .buffer_unordered(self.settings.max_concurrent_repos.max(1))
            .collect()
            .await;
        outcomes.sort_by_key(|(idx, _, _)| *idx);

        let mut fetched = Vec::with_capacity(outcomes.len());
        for (_, repo, result) in outcomes {
            match result {
                Ok(()) => {
                    record_outcome(FailureStage::Fetch, "success");
                    fetched.push(repo);
                }
                Err(err) => {
                    record_outcome(FailureStage::Fetch, "error");
                    warn!(repo = %repo, error = %err, "failed to fetch repository");
                    failures.push(failure(repo, FailureStage::Fetch, &err));
                }
            }
        }
        fetched
    }

    /// Walks parent links outward from the study set, fetching ancestors the
    /// corpus does not hold yet. Returns every ancestor present afterwards.
    async fn load_lineage(
        &self,
        study: &[RepoId],
        corpus: &mut Corpus,
        failures: &mut Vec<RepoFailure>,
    ) -> Result<Vec<RepoId>> {
        let mut visited: HashSet<RepoId> = study.iter().cloned().collect();
        let mut ancestors = Vec::new();
        let mut frontier: Vec<RepoId> = study.to_vec();

        for depth in 1..=self.settings.max_lineage_depth {
            let parents: BTreeSet<RepoId> = frontier
                .iter()
                .filter_map(|repo| corpus.get(repo)?.parent())
                // a parent already loaded under another name is walked by its corpus key
                .map(|parent| corpus.get(parent).map_or(parent, |p| p.id()).clone())
                .filter(|parent| !visited.contains(parent))
                .collect();
            if parents.is_empty() {
                break;
            }
            visited.extend(parents.iter().cloned());

            let missing: Vec<&RepoId> = parents.iter().filter(|p| !corpus.contains(p)).collect();
            let outcomes: Vec<_> = stream::iter(missing)
                .map(|repo| async move {
                    let _active = ActiveRepoGuard::new();
                    let result = self.fetch_resources(repo, &LINEAGE_RESOURCES).await;
                    (repo.clone(), result)
                })
                .buffer_unordered(self.settings.max_concurrent_repos.max(1))
                .collect()
                .await;

            for (repo, result) in outcomes {
                match result {
                    Ok(()) => {
                        record_outcome(FailureStage::Lineage, "success");
                        let project = ProjectData::from_cache(self.store, &repo, false)
                            .await
                            .map_err(AppError::cache)?;
                        corpus.insert(project);
                    }
                    Err(err) => {
                        record_outcome(FailureStage::Lineage, "error");
                        warn!(repo = %repo, depth, error = %err, "failed to fetch ancestor");
                        failures.push(failure(repo, FailureStage::Lineage, &err));
                    }
                }
            }

            frontier = parents.into_iter().filter(|p| corpus.contains(p)).collect();
            ancestors.extend(frontier.iter().cloned());
        }

        info!(ancestors = ancestors.len(), "lineage loaded");
        Ok(ancestors)
    }

    async fn fetch_resources(
        &self,
        repo: &RepoId,
        resources: &[ResourceType],
    ) -> cache::Result<()> {
        for resource in resources {
            self.store
                .get_or_fetch_from(self.fetcher, repo, *resource)
                .await?;
        }
        Ok(())
    }
}

fn stage_timer(stage: &str) -> HistogramTimer {
    metrics::STAGE_DURATION
        .with_label_values(&[stage])
        .start_timer()
}

fn record_outcome(stage: FailureStage, outcome: &str) {
    metrics::REPOS_PROCESSED_TOTAL
        .with_label_values(&[stage.as_str(), outcome])
        .inc();
}

fn failure(repository: RepoId, stage: FailureStage, err: &CacheError) -> RepoFailure {
    RepoFailure {
        repository,
        stage,
        kind: failure_kind(err).to_string(),
        error: err.to_string(),
    }
}

fn failure_kind(err: &CacheError) -> &'static str {
    match err {
        CacheError::Fetch(FetchError::RemoteUnavailable { .. }) => "remote_unavailable",
        CacheError::Fetch(FetchError::Rejected { .. }) => "rejected",
        CacheError::Fetch(FetchError::Decode { .. }) => "decode",
        CacheError::Fetch(FetchError::InvalidRequest(_)) => "invalid_request",
        CacheError::IncompleteCache { .. } => "incomplete_cache",
        CacheError::Io { .. } | CacheError::Corrupt { .. } | CacheError::Json(_) => "cache",
    }
}
