pub mod document;
pub mod error;
pub mod metrics;
pub mod records;
pub mod store;

pub use document::{CacheDocument, CacheKey};
pub use error::{CacheError, Result};
pub use records::{RecordSet, RecordSetSummary};
pub use store::{CacheStats, CacheStore};
