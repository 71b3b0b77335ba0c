use std::fmt::Debug;
use std::path::PathBuf;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cache error: {0}")]
    Cache(#[source] anyhow::Error),
    #[error("genealogy error: {0}")]
    Genealogy(#[source] anyhow::Error),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn cache(err: impl Into<anyhow::Error>) -> Self {
        Self::Cache(err.into())
    }

    pub fn genealogy(err: impl Into<anyhow::Error>) -> Self {
        Self::Genealogy(err.into())
    }
}
