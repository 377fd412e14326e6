//! Committers: where crawled documents end up
//!
//! This module handles:
//! - The requests a crawl produces (upserts and deletions)
//! - The [`Committer`] trait implemented by sinks
//! - Durable batching of requests in front of a sink ([`BatchCommitQueue`])

mod batch;
mod jsonl;

pub use batch::{BatchCommitQueue, COMMITTER_QUEUE};
pub use jsonl::JsonLinesCommitter;

use crate::doc::Properties;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while committing
#[derive(Debug, Error)]
pub enum CommitterError {
    #[error("Failed to write batch: {0}")]
    Write(String),

    #[error("Failed to serialize request: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for committer operations
pub type CommitterResult<T> = Result<T, CommitterError>;

/// A change to apply to the target repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum CommitterRequest {
    Upsert {
        reference: String,
        metadata: Properties,
        content: Vec<u8>,
    },
    Delete {
        reference: String,
        metadata: Properties,
    },
}

impl CommitterRequest {
    pub fn reference(&self) -> &str {
        match self {
            Self::Upsert { reference, .. } | Self::Delete { reference, .. } => reference,
        }
    }

    pub fn metadata(&self) -> &Properties {
        match self {
            Self::Upsert { metadata, .. } | Self::Delete { metadata, .. } => metadata,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }
}

/// A sink receiving batches of requests
#[async_trait]
pub trait Committer: Send + Sync {
    /// Applies a batch of requests
    ///
    /// The batch is only dropped from the buffer once this returns `Ok`.
    async fn commit_batch(&self, batch: &[CommitterRequest]) -> CommitterResult<()>;

    /// Removes everything this committer stored
    async fn clean(&self) -> CommitterResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accessors() {
        let upsert = CommitterRequest::Upsert {
            reference: "http://a".to_string(),
            metadata: Properties::new(),
            content: b"body".to_vec(),
        };
        assert_eq!(upsert.reference(), "http://a");
        assert!(!upsert.is_delete());

        let delete = CommitterRequest::Delete {
            reference: "http://b".to_string(),
            metadata: Properties::new(),
        };
        assert_eq!(delete.reference(), "http://b");
        assert!(delete.is_delete());
    }

    #[test]
    fn test_request_is_tagged() {
        let delete = CommitterRequest::Delete {
            reference: "http://b".to_string(),
            metadata: Properties::new(),
        };
        let json = serde_json::to_value(&delete).unwrap();
        assert_eq!(json["operation"], "delete");
        assert_eq!(json["reference"], "http://b");

        let back: CommitterRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back, delete);
    }
}
