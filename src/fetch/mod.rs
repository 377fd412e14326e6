//! Fetching documents
//!
//! The pipelines only know the [`Fetcher`] trait: given a reference and a
//! directive, return a [`FetchResponse`] whose `state` already classifies the
//! outcome. Protocol details stay in implementations such as [`HttpFetcher`].

mod http;

pub use http::{build_http_client, HttpFetcher};

use crate::doc::Properties;
use crate::state::CrawlState;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Which part of a document a fetch retrieves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchDirective {
    /// Headers only (cheap probe)
    Metadata,

    /// Full body
    Document,
}

impl fmt::Display for FetchDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Metadata => write!(f, "METADATA"),
            Self::Document => write!(f, "DOCUMENT"),
        }
    }
}

/// How a crawler uses a fetch directive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchSupport {
    /// A failed fetch ends the document's processing
    Required,

    /// A failed fetch may let processing continue
    Optional,

    /// Never fetched
    Disabled,
}

impl FetchSupport {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

impl fmt::Display for FetchSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => write!(f, "REQUIRED"),
            Self::Optional => write!(f, "OPTIONAL"),
            Self::Disabled => write!(f, "DISABLED"),
        }
    }
}

/// Result of fetching one directive of a reference
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    /// Classification of the outcome (`New` for a successful fetch)
    pub state: CrawlState,

    pub status_code: Option<u16>,
    pub reason_phrase: Option<String>,
    pub headers: Properties,

    /// Body bytes, only for the document directive
    pub body: Option<Vec<u8>>,

    /// Reference the fetch ended on when it was redirected
    pub final_reference: Option<String>,

    /// References discovered in the document
    pub child_references: Vec<String>,
}

impl FetchResponse {
    pub fn new(state: CrawlState) -> Self {
        Self {
            state,
            status_code: None,
            reason_phrase: None,
            headers: Properties::new(),
            body: None,
            final_reference: None,
            child_references: Vec::new(),
        }
    }

    /// A successful fetch
    pub fn ok() -> Self {
        Self::new(CrawlState::New).with_status(200, "OK")
    }

    pub fn with_status(mut self, code: u16, reason: impl Into<String>) -> Self {
        self.status_code = Some(code);
        self.reason_phrase = Some(reason.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.child_references
            .extend(children.into_iter().map(Into::into));
        self
    }

    pub fn redirected_to(mut self, reference: impl Into<String>) -> Self {
        self.final_reference = Some(reference.into());
        self
    }

    /// Status summary for logs and events, e.g. `404 Not Found`
    pub fn status_line(&self) -> String {
        match (self.status_code, &self.reason_phrase) {
            (Some(code), Some(reason)) => format!("{} {}", code, reason),
            (Some(code), None) => code.to_string(),
            (None, Some(reason)) => reason.clone(),
            (None, None) => self.state.to_string(),
        }
    }
}

/// Errors raised by fetchers
///
/// A fetch error is a per-document failure: the document ends in the
/// `Error` state and the crawl goes on.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error for {reference}: {source}")]
    Http {
        reference: String,
        source: reqwest::Error,
    },

    #[error("Could not fetch {reference}: {message}")]
    Failed { reference: String, message: String },
}

/// Retrieves documents from their source
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches one directive of a reference
    ///
    /// Bad statuses are reported through `FetchResponse::state`; `Err` is
    /// reserved for failures to talk to the source at all.
    async fn fetch(
        &self,
        reference: &str,
        directive: FetchDirective,
    ) -> Result<FetchResponse, FetchError>;
}
