use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use common::config::{ActivityMetricConfig, BalanceConfig, FilterConfig, PeriodConfig};
use normalizer::RepoId;
use serde::Serialize;
use tracing::debug;

use crate::authorship::AuthorshipSummary;
use crate::corpus::{Corpus, ProjectData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Month,
    Quarter,
    Year,
}

/// Calendar bucket in UTC. `index` is the month (1-12), quarter (1-4) or 0 for years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeriodKey {
    pub year: i32,
    pub index: u32,
    period: Period,
}

impl Period {
    pub fn key(&self, at: DateTime<Utc>) -> PeriodKey {
        let index = match self {
            Period::Month => at.month(),
            Period::Quarter => (at.month() - 1) / 3 + 1,
            Period::Year => 0,
        };
        PeriodKey {
            year: at.year(),
            index,
            period: *self,
        }
    }
}

impl From<PeriodConfig> for Period {
    fn from(value: PeriodConfig) -> Self {
        match value {
            PeriodConfig::Month => Period::Month,
            PeriodConfig::Quarter => Period::Quarter,
            PeriodConfig::Year => Period::Year,
        }
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.period {
            Period::Month => write!(f, "{}-{:02}", self.year, self.index),
            Period::Quarter => write!(f, "{}-Q{}", self.year, self.index),
            Period::Year => write!(f, "{}", self.year),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityMetric {
    MergedPullRequests,
    Commits,
}

impl From<ActivityMetricConfig> for ActivityMetric {
    fn from(value: ActivityMetricConfig) -> Self {
        match value {
            ActivityMetricConfig::MergedPullRequests => ActivityMetric::MergedPullRequests,
            ActivityMetricConfig::Commits => ActivityMetric::Commits,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FilterDecision {
    pub repository: RepoId,
    pub kept: bool,
    pub busiest_period: Option<String>,
    pub busiest_count: u32,
}

/// Minimum-activity threshold: a repository passes when any single period
/// exceeds `min_activity`. A repository with no activity never passes, even
/// at a threshold of 0.
#[derive(Debug, Clone, Copy)]
pub struct ProjectFilter {
    pub metric: ActivityMetric,
    pub period: Period,
    pub min_activity: u32,
}

impl ProjectFilter {
    pub fn new(metric: ActivityMetric, period: Period, min_activity: u32) -> Self {
        Self {
            metric,
            period,
            min_activity,
        }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(config.metric.into(), config.period.into(), config.min_activity)
    }

    pub fn activity(&self, project: &ProjectData) -> BTreeMap<PeriodKey, u32> {
        let timestamps: Vec<DateTime<Utc>> = match self.metric {
            ActivityMetric::MergedPullRequests => project
                .merged_pull_requests()
                .filter_map(|pr| pr.merged_at())
                .collect(),
            ActivityMetric::Commits => project.commits.iter().filter_map(|c| c.authored_at).collect(),
        };
        let mut counts = BTreeMap::new();
        for at in timestamps {
            *counts.entry(self.period.key(at)).or_insert(0u32) += 1;
        }
        counts
    }

    pub fn evaluate(&self, project: &ProjectData) -> FilterDecision {
        let counts = self.activity(project);
        // Earliest period wins ties so the decision is stable.
        let busiest = counts
            .iter()
            .fold(None::<(&PeriodKey, u32)>, |best, (key, &count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((key, count)),
            });
        let busiest_count = busiest.map(|(_, count)| count).unwrap_or(0);
        FilterDecision {
            repository: project.id().clone(),
            kept: busiest_count > self.min_activity,
            busiest_period: busiest.map(|(key, _)| key.to_string()),
            busiest_count,
        }
    }

    /// Keeps the repositories that pass, in input order. Repositories absent
    /// from the corpus do not pass.
    pub fn filter(&self, corpus: &Corpus, repositories: &[RepoId]) -> Vec<RepoId> {
        self.decisions(corpus, repositories)
            .into_iter()
            .filter(|d| d.kept)
            .map(|d| d.repository)
            .collect()
    }

    pub fn decisions(&self, corpus: &Corpus, repositories: &[RepoId]) -> Vec<FilterDecision> {
        repositories
            .iter()
            .map(|repo| match corpus.get(repo) {
                Some(project) => {
                    let decision = self.evaluate(project);
                    debug!(
                        repo = %repo,
                        kept = decision.kept,
                        busiest = decision.busiest_count,
                        "activity filter"
                    );
                    decision
                }
                None => FilterDecision {
                    repository: repo.clone(),
                    kept: false,
                    busiest_period: None,
                    busiest_count: 0,
                },
            })
            .collect()
    }
}

/// Keeps repositories whose merged work is split between developers and agents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceFilter {
    pub min_agent_share: f64,
    pub max_agent_share: f64,
    pub min_total: usize,
}

impl From<BalanceConfig> for BalanceFilter {
    fn from(value: BalanceConfig) -> Self {
        Self {
            min_agent_share: value.min_agent_share,
            max_agent_share: value.max_agent_share,
            min_total: value.min_total_prs,
        }
    }
}

impl BalanceFilter {
    pub fn accepts(&self, summary: &AuthorshipSummary) -> bool {
        summary.total >= self.min_total
            && summary.agent_share >= self.min_agent_share
            && summary.agent_share <= self.max_agent_share
    }
}
