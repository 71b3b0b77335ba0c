use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub github: GithubConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(".")
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Config::builder()
            .add_source(
                File::with_name(
                    path.as_ref()
                        .join("config/default")
                        .to_string_lossy()
                        .as_ref(),
                )
                .required(false),
            )
            .add_source(
                File::with_name(
                    path.as_ref()
                        .join("config/local")
                        .to_string_lossy()
                        .as_ref(),
                )
                .required(false),
            )
            .add_source(Environment::default().separator("__"))
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GithubToken {
    pub id: String,
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubConfig {
    #[serde(default)]
    pub tokens: Vec<GithubToken>,
    pub user_agent: String,
    #[serde(default = "GithubConfig::default_api_base")]
    pub api_base: String,
}

impl GithubConfig {
    fn default_api_base() -> String {
        "https://api.github.com/".to_string()
    }

    /// Configured tokens, or a single `GITHUB_TOKEN` token when none are listed.
    /// An empty result means requests go out unauthenticated.
    pub fn resolved_tokens(&self) -> Vec<GithubToken> {
        if !self.tokens.is_empty() {
            return self.tokens.clone();
        }
        match std::env::var("GITHUB_TOKEN") {
            Ok(secret) if !secret.trim().is_empty() => vec![GithubToken {
                id: "env".to_string(),
                secret: secret.trim().to_string(),
            }],
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    #[serde(default = "FetcherConfig::default_page_size")]
    pub page_size: u32,
    #[serde(default = "FetcherConfig::default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "FetcherConfig::default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "FetcherConfig::default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "FetcherConfig::default_jitter_frac")]
    pub jitter_frac: f32,
    #[serde(default = "FetcherConfig::default_page_timeout_secs")]
    pub page_timeout_secs: u64,
    #[serde(default = "FetcherConfig::default_max_inflight")]
    pub max_inflight: usize,
    #[serde(default = "FetcherConfig::default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "FetcherConfig::default_max_rate_limit_wait_secs")]
    pub max_rate_limit_wait_secs: u64,
    #[serde(default)]
    pub commits_until: Option<DateTime<Utc>>,
}

impl FetcherConfig {
    const fn default_page_size() -> u32 {
        100
    }

    const fn default_max_attempts() -> u32 {
        5
    }

    const fn default_backoff_base_ms() -> u64 {
        500
    }

    const fn default_backoff_max_ms() -> u64 {
        60_000
    }

    const fn default_jitter_frac() -> f32 {
        0.2
    }

    const fn default_page_timeout_secs() -> u64 {
        30
    }

    const fn default_max_inflight() -> usize {
        8
    }

    const fn default_max_pages() -> u32 {
        1000
    }

    const fn default_max_rate_limit_wait_secs() -> u64 {
        3600
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            page_size: Self::default_page_size(),
            max_attempts: Self::default_max_attempts(),
            backoff_base_ms: Self::default_backoff_base_ms(),
            backoff_max_ms: Self::default_backoff_max_ms(),
            jitter_frac: Self::default_jitter_frac(),
            page_timeout_secs: Self::default_page_timeout_secs(),
            max_inflight: Self::default_max_inflight(),
            max_pages: Self::default_max_pages(),
            max_rate_limit_wait_secs: Self::default_max_rate_limit_wait_secs(),
            commits_until: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "CacheConfig::default_dir")]
    pub dir: PathBuf,
}

impl CacheConfig {
    fn default_dir() -> PathBuf {
        PathBuf::from("cache")
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: Self::default_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "PipelineConfig::default_seed_repos_path")]
    pub seed_repos_path: PathBuf,
    #[serde(default = "PipelineConfig::default_output_path")]
    pub output_path: PathBuf,
    #[serde(default = "PipelineConfig::default_max_concurrent_repos")]
    pub max_concurrent_repos: usize,
    #[serde(default = "PipelineConfig::default_max_lineage_depth")]
    pub max_lineage_depth: usize,
    /// Keys to invalidate before the run: `owner/name` (every resource) or
    /// `owner/name:resource`.
    #[serde(default)]
    pub refresh: Vec<String>,
}

impl PipelineConfig {
    fn default_seed_repos_path() -> PathBuf {
        PathBuf::from("config/repos.json")
    }

    fn default_output_path() -> PathBuf {
        PathBuf::from("results/report.json")
    }

    const fn default_max_concurrent_repos() -> usize {
        4
    }

    const fn default_max_lineage_depth() -> usize {
        8
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed_repos_path: Self::default_seed_repos_path(),
            output_path: Self::default_output_path(),
            max_concurrent_repos: Self::default_max_concurrent_repos(),
            max_lineage_depth: Self::default_max_lineage_depth(),
            refresh: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityMetricConfig {
    MergedPullRequests,
    Commits,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PeriodConfig {
    Month,
    Quarter,
    Year,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "FilterConfig::default_metric")]
    pub metric: ActivityMetricConfig,
    #[serde(default = "FilterConfig::default_period")]
    pub period: PeriodConfig,
    #[serde(default = "FilterConfig::default_min_activity")]
    pub min_activity: u32,
    #[serde(default)]
    pub balance: Option<BalanceConfig>,
}

impl FilterConfig {
    const fn default_metric() -> ActivityMetricConfig {
        ActivityMetricConfig::MergedPullRequests
    }

    const fn default_period() -> PeriodConfig {
        PeriodConfig::Quarter
    }

    const fn default_min_activity() -> u32 {
        10
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            metric: Self::default_metric(),
            period: Self::default_period(),
            min_activity: Self::default_min_activity(),
            balance: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct BalanceConfig {
    #[serde(default = "BalanceConfig::default_min_agent_share")]
    pub min_agent_share: f64,
    #[serde(default = "BalanceConfig::default_max_agent_share")]
    pub max_agent_share: f64,
    #[serde(default = "BalanceConfig::default_min_total_prs")]
    pub min_total_prs: usize,
}

impl BalanceConfig {
    const fn default_min_agent_share() -> f64 {
        0.35
    }

    const fn default_max_agent_share() -> f64 {
        0.65
    }

    const fn default_min_total_prs() -> usize {
        60
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentsConfig {
    #[serde(default)]
    pub known_logins: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub dataset_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Full,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    #[serde(default = "LoggingConfig::default_format")]
    pub format: LogFormat,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }

    const fn default_format() -> LogFormat {
        LogFormat::Compact
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            format: Self::default_format(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObservabilityConfig {
    /// Prometheus text exposition file written at the end of a run.
    #[serde(default)]
    pub metrics_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_defaults_from_minimal_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("config")).expect("config dir");
        std::fs::write(
            dir.path().join("config/default.toml"),
            "[github]\nuser_agent = \"aidev-test\"\n\n[filter]\nperiod = \"month\"\nmin_activity = 3\n",
        )
        .expect("write config");

        let config = AppConfig::load_from_path(dir.path()).expect("load config");
        assert_eq!(config.github.user_agent, "aidev-test");
        assert_eq!(config.github.api_base, "https://api.github.com/");
        assert_eq!(config.fetcher.page_size, 100);
        assert_eq!(config.fetcher.max_attempts, 5);
        assert_eq!(config.filter.period, PeriodConfig::Month);
        assert_eq!(config.filter.metric, ActivityMetricConfig::MergedPullRequests);
        assert_eq!(config.filter.min_activity, 3);
        assert!(config.filter.balance.is_none());
        assert_eq!(config.pipeline.max_lineage_depth, 8);
    }

    #[test]
    fn balance_defaults_follow_study_thresholds() {
        let balance: BalanceConfig = serde_json::from_str("{}").expect("balance");
        assert_eq!(balance.min_agent_share, 0.35);
        assert_eq!(balance.max_agent_share, 0.65);
        assert_eq!(balance.min_total_prs, 60);
    }
}
