use std::collections::HashSet;
use std::path::Path;

use common::{AppError, Result};
use normalizer::{RepoId, ResourceType};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SeedEntry {
    FullName(String),
    Split { owner: String, name: String },
}

/// Reads the seed list: a JSON array of `"owner/name"` strings or
/// `{owner, name}` objects. Duplicates are dropped, first occurrence wins.
pub async fn load_seed_repos(path: &Path) -> Result<Vec<RepoId>> {
    let data = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AppError::io(path, e))?;
    parse_seed_repos(&data)
}

pub fn parse_seed_repos(data: &str) -> Result<Vec<RepoId>> {
    let entries: Vec<SeedEntry> = serde_json::from_str(data)
        .map_err(|err| AppError::InvalidInput(format!("seed list: {err}")))?;
    let mut seen = HashSet::new();
    let mut repos = Vec::with_capacity(entries.len());
    for entry in entries {
        let parsed = match entry {
            SeedEntry::FullName(full_name) => full_name.parse::<RepoId>(),
            SeedEntry::Split { owner, name } => RepoId::new(owner, name),
        };
        let repo = parsed.map_err(|err| AppError::InvalidInput(err.to_string()))?;
        if seen.insert(repo.clone()) {
            repos.push(repo);
        } else {
            warn!(repo = %repo, "duplicate seed repository ignored");
        }
    }
    Ok(repos)
}

/// `owner/name` targets every resource, `owner/name:resource` just one.
pub fn parse_refresh_key(key: &str) -> Result<Vec<(RepoId, ResourceType)>> {
    let (repo, resource) = match key.rsplit_once(':') {
        Some((repo, resource)) if !resource.contains('/') => (repo, Some(resource)),
        _ => (key, None),
    };
    let repo: RepoId = repo
        .parse()
        .map_err(|err: normalizer::NormalizeError| AppError::InvalidInput(err.to_string()))?;
    match resource {
        None => Ok(ResourceType::ALL.iter().map(|r| (repo.clone(), *r)).collect()),
        Some(name) => {
            let resource = ResourceType::parse(name).ok_or_else(|| {
                AppError::InvalidInput(format!("unknown resource `{name}` in refresh key {key}"))
            })?;
            Ok(vec![(repo, resource)])
        }
    }
}
