//! Tidemark: a resumable document crawler
//!
//! This crate crawls references through a chain of pipelines, tracks every
//! reference in a persistent ledger and sends new, modified and deleted
//! documents to a committer in batches. An interrupted crawl resumes where it
//! stopped; a finished one becomes the baseline for change detection on the
//! next session.

pub mod committer;
pub mod config;
pub mod crawler;
pub mod doc;
pub mod event;
pub mod fetch;
pub mod filter;
pub mod ledger;
pub mod pipeline;
pub mod spoil;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for tidemark operations
#[derive(Debug, Error)]
pub enum TidemarkError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Committer error: {0}")]
    Committer(#[from] committer::CommitterError),

    #[error("Fetch error for {reference}: {message}")]
    Fetch { reference: String, message: String },

    #[error("Processing error for {reference}: {message}")]
    Processing { reference: String, message: String },

    #[error("Workers did not stop within {timeout_secs}s")]
    ShutdownTimeout { timeout_secs: u64 },

    #[error("Task '{task_id}' failed: {message}")]
    Task { task_id: String, message: String },

    #[error("Processing interrupted by a stop request")]
    Interrupted,

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TidemarkError {
    /// Returns true for failures scoped to a single document
    ///
    /// Such failures put the document in the `Error` state; everything else
    /// stops the crawl.
    pub fn is_document_error(&self) -> bool {
        matches!(self, Self::Fetch { .. } | Self::Processing { .. })
    }
}

impl From<fetch::FetchError> for TidemarkError {
    fn from(e: fetch::FetchError) -> Self {
        match e {
            fetch::FetchError::Http { reference, source } => Self::Fetch {
                reference,
                message: source.to_string(),
            },
            fetch::FetchError::Failed { reference, message } => {
                Self::Fetch { reference, message }
            }
        }
    }
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

    #[error("Invalid filter: {0}")]
    InvalidPattern(String),
}

/// Result type alias for tidemark operations
pub type Result<T> = std::result::Result<T, TidemarkError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlSession, CrawlerBuilder, CrawlerContext, SessionOutcome};
pub use doc::{CrawlDoc, DocContext};
pub use state::{CrawlStage, CrawlState, ProcessingStage};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_errors() {
        let fetch = TidemarkError::Fetch {
            reference: "http://a".to_string(),
            message: "connection refused".to_string(),
        };
        assert!(fetch.is_document_error());

        let processing = TidemarkError::Processing {
            reference: "http://a".to_string(),
            message: "bad body".to_string(),
        };
        assert!(processing.is_document_error());

        assert!(!TidemarkError::Interrupted.is_document_error());
        assert!(!TidemarkError::ShutdownTimeout { timeout_secs: 1 }.is_document_error());
    }

    #[test]
    fn test_fetch_error_conversion() {
        let err: TidemarkError = fetch::FetchError::Failed {
            reference: "http://a".to_string(),
            message: "boom".to_string(),
        }
        .into();
        assert!(err.is_document_error());
        assert_eq!(err.to_string(), "Fetch error for http://a: boom");
    }
}
