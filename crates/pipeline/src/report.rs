use std::path::Path;

use analysis::{AuthorshipSummary, CloneDensityRecord, FilterDecision, GenealogyEdge, SkippedRepository};
use cache::{CacheStats, RecordSetSummary};
use chrono::{DateTime, Utc};
use common::{AppError, Result};
use normalizer::RepoId;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Fetch,
    Lineage,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::Fetch => "fetch",
            FailureStage::Lineage => "lineage",
        }
    }
}

/// A repository that dropped out of the run. Others carry on.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RepoFailure {
    pub repository: RepoId,
    pub stage: FailureStage,
    pub kind: String,
    pub error: String,
}

/// A repository GitHub reports under a name other than the one requested.
/// Its data stays keyed by `requested`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RenamedRepository {
    pub requested: RepoId,
    pub canonical: RepoId,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BalanceResult {
    pub repository: RepoId,
    pub balanced: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub generated_at: DateTime<Utc>,
    pub seeds: Vec<RepoId>,
    pub filter: Vec<FilterDecision>,
    pub kept: Vec<RepoId>,
    pub authorship: Vec<AuthorshipSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub balance: Vec<BalanceResult>,
    pub study: Vec<RepoId>,
    pub genealogy: Vec<GenealogyEdge>,
    pub skipped: Vec<SkippedRepository>,
    pub clone_density: Vec<CloneDensityRecord>,
    pub failures: Vec<RepoFailure>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub renamed: Vec<RenamedRepository>,
    pub cache: CacheStats,
    pub sources: Vec<RecordSetSummary>,
}

impl PipelineReport {
    pub fn density_for(&self, repository: &RepoId) -> Option<&CloneDensityRecord> {
        self.clone_density
            .iter()
            .find(|record| &record.repository == repository)
    }

    pub fn failure_for(&self, repository: &RepoId) -> Option<&RepoFailure> {
        self.failures
            .iter()
            .find(|failure| &failure.repository == repository)
    }
}

pub async fn write_report(path: &Path, report: &PipelineReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AppError::io(parent, e))?;
    }
    let body = serde_json::to_vec_pretty(report).map_err(|err| AppError::Other(err.into()))?;
    tokio::fs::write(path, body)
        .await
        .map_err(|e| AppError::io(path, e))
}
