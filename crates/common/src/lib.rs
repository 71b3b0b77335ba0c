pub mod config;
pub mod errors;
pub mod logging;
pub mod metrics;

pub use crate::config::AppConfig;
pub use crate::errors::{AppError, Result};
