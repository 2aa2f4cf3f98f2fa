//! Feed-Trawl: a resilient timeline crawler
//!
//! This crate walks cursor-paginated item timelines (posts, likes, collections, music
//! listings) on a rate-limited upstream API and turns them into a deduplicated,
//! time-filtered, quantity-bounded sequence of records.

pub mod config;
pub mod crawler;
pub mod endpoint;
pub mod output;
pub mod record;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Feed-Trawl operations
#[derive(Debug, Error)]
pub enum TrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Signer error: {0}")]
    Signer(#[from] crawler::SignerError),

    #[error("Target error: {0}")]
    Target(#[from] endpoint::TargetError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Record error: {0}")]
    Record(#[from] record::RecordError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid date in config: {0}")]
    InvalidDate(String),
}

/// Result type alias for Feed-Trawl operations
pub type Result<T> = std::result::Result<T, TrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlEngine, CrawlOutcome, CrawlRequest};
pub use endpoint::{EndpointDescriptor, EndpointKind, RequestVariantCatalog};
pub use record::{DedupScope, Record};
pub use state::{Cursor, TerminationReason};
