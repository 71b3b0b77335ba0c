pub mod backoff;
pub mod error;
pub mod fetcher;
pub mod metrics;
pub mod model;
pub mod token;
pub mod transport;

pub use backoff::RetryPolicy;
pub use error::FetchError;
pub use fetcher::{GithubFetcher, GithubFetcherBuilder, RemoteFetcher};
pub use transport::{HttpExec, ReqwestExecutor};
