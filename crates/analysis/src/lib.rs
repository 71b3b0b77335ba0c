pub mod agents;
pub mod authorship;
pub mod corpus;
pub mod density;
pub mod error;
pub mod filter;
pub mod genealogy;

pub use agents::{AgentDataset, AgentDetector, Authorship, DetectionSource};
pub use authorship::{merged_commits, summarize, AuthorshipSummary, MergedCommit};
pub use corpus::{Corpus, ProjectData};
pub use density::{analyze, analyze_all, CloneDensityRecord};
pub use error::{AnalysisError, Result};
pub use filter::{ActivityMetric, BalanceFilter, FilterDecision, Period, ProjectFilter};
pub use genealogy::{
    build, divergence_commit, GenealogyEdge, GenealogyError, GenealogyForest, GenealogyReport,
    SkippedRepository,
};
