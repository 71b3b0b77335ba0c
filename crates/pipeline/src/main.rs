use analysis::AgentDetector;
use anyhow::{Context, Result};
use cache::CacheStore;
use common::{config::AppConfig, logging, metrics};
use gh_fetcher::GithubFetcherBuilder;
use pipeline::{load_seed_repos, write_report, Pipeline};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    logging::init_logging(&config.logging);

    let fetcher = GithubFetcherBuilder::from_config(&config).build()?;
    let store = CacheStore::open(&config.cache.dir).await?;
    let seeds = load_seed_repos(&config.pipeline.seed_repos_path)
        .await
        .context("loading seed repositories")?;
    info!(count = seeds.len(), "loaded seed repositories");
    let detector = AgentDetector::from_config(&config.agents).context("loading agent dataset")?;

    let report = Pipeline::from_config(&config, &store, &fetcher, detector)
        .run(&seeds)
        .await?;
    write_report(&config.pipeline.output_path, &report).await?;
    info!(
        path = %config.pipeline.output_path.display(),
        study = report.study.len(),
        edges = report.genealogy.len(),
        failures = report.failures.len(),
        "report written"
    );

    store.close();
    if let Some(path) = &config.observability.metrics_path {
        metrics::write_textfile(path)?;
    }
    Ok(())
}
