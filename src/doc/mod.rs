//! Crawl document types
//!
//! A `DocContext` is the persistent record of a reference: it is what the ledger
//! stores between sessions and what checksums are compared against. A `CrawlDoc`
//! wraps it with everything a worker needs while the document moves through the
//! pipelines (fetched metadata, content, the cached snapshot from the previous
//! session).

use crate::fetch::FetchDirective;
use crate::state::CrawlState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Multi-valued document metadata (header name -> values)
pub type Properties = BTreeMap<String, Vec<String>>;

/// Metadata key flagging documents reprocessed as orphans
pub const ORPHAN_METADATA_KEY: &str = "tidemark.is-crawl-orphan";

/// Persistent record of a reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocContext {
    /// Unique identity of the document
    pub reference: String,

    /// Number of hops from a start reference
    pub depth: u32,

    /// Lifecycle state, `None` until a stage decides one
    pub state: Option<CrawlState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_checksum: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_checksum: Option<String>,

    /// Reference before a redirect re-keyed this document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_reference: Option<String>,

    /// References visited before landing on this one, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redirect_trail: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_reference: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawl_date: Option<DateTime<Utc>>,
}

impl DocContext {
    /// Creates a context for a start reference (depth 0)
    pub fn new(reference: impl Into<String>) -> Self {
        Self::with_depth(reference, 0)
    }

    pub fn with_depth(reference: impl Into<String>, depth: u32) -> Self {
        Self {
            reference: reference.into(),
            depth,
            state: None,
            meta_checksum: None,
            content_checksum: None,
            original_reference: None,
            redirect_trail: Vec::new(),
            parent_reference: None,
            content_type: None,
            crawl_date: None,
        }
    }

    /// Creates a context for a reference discovered while processing `self`
    pub fn child(&self, reference: impl Into<String>) -> Self {
        let mut child = Self::with_depth(reference, self.depth + 1);
        child.parent_reference = Some(self.reference.clone());
        child
    }

    /// Returns the state, or `BadStatus` when no stage ever assigned one
    pub fn state_or_bad_status(&self) -> CrawlState {
        self.state.unwrap_or(CrawlState::BadStatus)
    }

    /// Returns true if the state is set and good
    pub fn is_good_state(&self) -> bool {
        self.state.map(|s| s.is_good_state()).unwrap_or(false)
    }

    /// Returns true if the state is set and new or modified
    pub fn is_new_or_modified(&self) -> bool {
        self.state.map(|s| s.is_new_or_modified()).unwrap_or(false)
    }

    /// Fills fields this session did not produce from a previous-session snapshot
    ///
    /// The reference, depth and state are never touched.
    pub fn copy_missing_from(&mut self, cached: &DocContext) {
        if self.meta_checksum.is_none() {
            self.meta_checksum = cached.meta_checksum.clone();
        }
        if self.content_checksum.is_none() {
            self.content_checksum = cached.content_checksum.clone();
        }
        if self.content_type.is_none() {
            self.content_type = cached.content_type.clone();
        }
        if self.crawl_date.is_none() {
            self.crawl_date = cached.crawl_date;
        }
        if self.parent_reference.is_none() {
            self.parent_reference = cached.parent_reference.clone();
        }
    }
}

/// A document being processed by a worker
#[derive(Debug, Clone)]
pub struct CrawlDoc {
    /// Record that is stored in the ledger once processing ends
    pub context: DocContext,

    /// Snapshot of the same reference from the previous session
    pub cached: Option<DocContext>,

    /// Metadata gathered from fetch responses
    pub metadata: Properties,

    /// Document body, once the document directive fetched it
    pub content: Option<Vec<u8>>,

    /// References discovered while fetching this document
    pub child_references: Vec<String>,

    /// Whether this document is reprocessed during orphan handling
    pub orphan: bool,

    executed: Vec<FetchDirective>,
}

impl CrawlDoc {
    pub fn new(context: DocContext, cached: Option<DocContext>, orphan: bool) -> Self {
        let mut metadata = Properties::new();
        if orphan {
            metadata.insert(ORPHAN_METADATA_KEY.to_string(), vec!["true".to_string()]);
        }
        Self {
            context,
            cached,
            metadata,
            content: None,
            child_references: Vec::new(),
            orphan,
            executed: Vec::new(),
        }
    }

    pub fn reference(&self) -> &str {
        &self.context.reference
    }

    /// Records that a directive fetched successfully
    pub fn mark_directive_executed(&mut self, directive: FetchDirective) {
        if !self.executed.contains(&directive) {
            self.executed.push(directive);
        }
    }

    /// Returns true if the directive already fetched successfully for this document
    pub fn is_directive_executed(&self, directive: FetchDirective) -> bool {
        self.executed.contains(&directive)
    }

    /// Adds metadata values, keeping existing ones
    pub fn add_metadata(&mut self, key: impl Into<String>, values: Vec<String>) {
        self.metadata.entry(key.into()).or_default().extend(values);
    }

    /// Returns the first value of a metadata field, matched case-insensitively
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata_values(key).and_then(|v| v.first().map(String::as_str))
    }

    /// Returns all values of a metadata field, matched case-insensitively
    pub fn metadata_values(&self, key: &str) -> Option<&[String]> {
        self.metadata
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_slice())
    }

    /// Returns the content as text, replacing invalid UTF-8
    pub fn content_text(&self) -> Option<String> {
        self.content
            .as_ref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}
