use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

pub static RUNS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("pipeline_runs_total", "Pipeline runs started").expect("pipeline runs")
});

pub static SEED_REPOS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "pipeline_seed_repositories",
        "Seed repositories loaded for the most recent run"
    )
    .expect("pipeline seed repositories")
});

pub static ACTIVE_REPOS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "pipeline_active_repositories",
        "Repositories currently being fetched into the cache"
    )
    .expect("pipeline active repositories")
});

pub static REPOS_PROCESSED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "pipeline_repositories_processed_total",
        "Repositories processed grouped by stage and outcome",
        &["stage", "outcome"]
    )
    .expect("pipeline repositories processed")
});

pub static STAGE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "pipeline_stage_duration_seconds",
        "Duration of pipeline stages",
        &["stage"],
        vec![0.01, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0]
    )
    .expect("pipeline stage duration")
});

pub struct ActiveRepoGuard;

impl Default for ActiveRepoGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveRepoGuard {
    pub fn new() -> Self {
        ACTIVE_REPOS.inc();
        Self
    }
}

impl Drop for ActiveRepoGuard {
    fn drop(&mut self) {
        ACTIVE_REPOS.dec();
    }
}
