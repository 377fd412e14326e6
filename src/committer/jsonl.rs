//! JSON lines committer
//!
//! Appends one JSON object per request to a file. Content is written as text
//! (invalid UTF-8 is replaced).

use crate::committer::{Committer, CommitterRequest, CommitterResult};
use crate::doc::Properties;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

#[derive(Debug, Serialize)]
struct CommitLine<'a> {
    operation: &'static str,
    reference: &'a str,
    metadata: &'a Properties,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    committed_at: DateTime<Utc>,
}

impl<'a> CommitLine<'a> {
    fn from_request(request: &'a CommitterRequest, committed_at: DateTime<Utc>) -> Self {
        match request {
            CommitterRequest::Upsert {
                reference,
                metadata,
                content,
            } => Self {
                operation: "upsert",
                reference,
                metadata,
                content: Some(String::from_utf8_lossy(content).into_owned()),
                committed_at,
            },
            CommitterRequest::Delete {
                reference,
                metadata,
            } => Self {
                operation: "delete",
                reference,
                metadata,
                content: None,
                committed_at,
            },
        }
    }
}

/// Appends committed requests to a JSON lines file
#[derive(Debug, Clone)]
pub struct JsonLinesCommitter {
    path: PathBuf,
}

impl JsonLinesCommitter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Committer for JsonLinesCommitter {
    async fn commit_batch(&self, batch: &[CommitterRequest]) -> CommitterResult<()> {
        let now = Utc::now();
        let mut buffer = String::new();
        for request in batch {
            buffer.push_str(&serde_json::to_string(&CommitLine::from_request(request, now))?);
            buffer.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(buffer.as_bytes()).await?;
        file.flush().await?;

        tracing::debug!("Wrote {} requests to {}", batch.len(), self.path.display());
        Ok(())
    }

    async fn clean(&self) -> CommitterResult<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
