use std::path::PathBuf;

use cache::CacheError;

use crate::genealogy::GenealogyError;

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Genealogy(#[from] GenealogyError),
    #[error("cannot read agent dataset {path}: {source}")]
    DatasetIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid agent dataset {path}: {source}")]
    DatasetFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T, E = AnalysisError> = std::result::Result<T, E>;
