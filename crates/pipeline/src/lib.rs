pub mod metrics;
pub mod report;
pub mod runner;
pub mod seeds;

pub use report::{
    write_report, BalanceResult, FailureStage, PipelineReport, RenamedRepository, RepoFailure,
};
pub use runner::{Pipeline, PipelineSettings};
pub use seeds::{load_seed_repos, parse_refresh_key, parse_seed_repos};
