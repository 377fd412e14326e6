//! Crawler events
//!
//! Every rejection, lifecycle transition and committer batch is announced as
//! a `CrawlerEvent`. Listeners subscribe through the `EventListener` trait;
//! the bus also logs each event at debug level so a crawl is observable even
//! without listeners.

use crate::doc::DocContext;
use std::fmt;
use std::sync::Arc;

/// Kinds of events fired during a crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // ===== Crawler Lifecycle =====
    CrawlerInitBegin,
    CrawlerInitEnd,
    CrawlerCrawlBegin,
    CrawlerCrawlEnd,
    CrawlerOrphansBegin,
    CrawlerOrphansEnd,
    CrawlerRunThreadBegin,
    CrawlerRunThreadEnd,
    CrawlerStopBegin,
    CrawlerStopEnd,
    CrawlerCleanBegin,
    CrawlerCleanEnd,
    CrawlerError,

    // ===== Document Progress =====
    DocumentQueued,
    DocumentMetadataFetched,
    DocumentFetched,
    DocumentProcessed,
    DocumentCommittedUpsert,
    DocumentCommittedDelete,

    // ===== Rejections =====
    RejectedFilter,
    RejectedUnmodified,
    RejectedDuplicate,
    RejectedNotFound,
    RejectedBadStatus,
    RejectedTooDeep,
    RejectedError,

    // ===== Committer =====
    CommitterBatchBegin,
    CommitterBatchEnd,
    CommitterBatchError,
    CommitterClean,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CrawlerInitBegin => "CRAWLER_INIT_BEGIN",
            Self::CrawlerInitEnd => "CRAWLER_INIT_END",
            Self::CrawlerCrawlBegin => "CRAWLER_CRAWL_BEGIN",
            Self::CrawlerCrawlEnd => "CRAWLER_CRAWL_END",
            Self::CrawlerOrphansBegin => "CRAWLER_ORPHANS_BEGIN",
            Self::CrawlerOrphansEnd => "CRAWLER_ORPHANS_END",
            Self::CrawlerRunThreadBegin => "CRAWLER_RUN_THREAD_BEGIN",
            Self::CrawlerRunThreadEnd => "CRAWLER_RUN_THREAD_END",
            Self::CrawlerStopBegin => "CRAWLER_STOP_BEGIN",
            Self::CrawlerStopEnd => "CRAWLER_STOP_END",
            Self::CrawlerCleanBegin => "CRAWLER_CLEAN_BEGIN",
            Self::CrawlerCleanEnd => "CRAWLER_CLEAN_END",
            Self::CrawlerError => "CRAWLER_ERROR",
            Self::DocumentQueued => "DOCUMENT_QUEUED",
            Self::DocumentMetadataFetched => "DOCUMENT_METADATA_FETCHED",
            Self::DocumentFetched => "DOCUMENT_FETCHED",
            Self::DocumentProcessed => "DOCUMENT_PROCESSED",
            Self::DocumentCommittedUpsert => "DOCUMENT_COMMITTED_UPSERT",
            Self::DocumentCommittedDelete => "DOCUMENT_COMMITTED_DELETE",
            Self::RejectedFilter => "REJECTED_FILTER",
            Self::RejectedUnmodified => "REJECTED_UNMODIFIED",
            Self::RejectedDuplicate => "REJECTED_DUPLICATE",
            Self::RejectedNotFound => "REJECTED_NOTFOUND",
            Self::RejectedBadStatus => "REJECTED_BAD_STATUS",
            Self::RejectedTooDeep => "REJECTED_TOO_DEEP",
            Self::RejectedError => "REJECTED_ERROR",
            Self::CommitterBatchBegin => "COMMITTER_BATCH_BEGIN",
            Self::CommitterBatchEnd => "COMMITTER_BATCH_END",
            Self::CommitterBatchError => "COMMITTER_BATCH_ERROR",
            Self::CommitterClean => "COMMITTER_CLEAN",
        }
    }

    /// Returns true for events signalling that a document was not committed
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::RejectedFilter
                | Self::RejectedUnmodified
                | Self::RejectedDuplicate
                | Self::RejectedNotFound
                | Self::RejectedBadStatus
                | Self::RejectedTooDeep
                | Self::RejectedError
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An event fired by the crawler
#[derive(Debug, Clone)]
pub struct CrawlerEvent {
    pub kind: EventKind,

    /// Id of the crawler that fired the event
    pub source: String,

    /// Document the event is about, if any
    pub doc: Option<DocContext>,

    /// What triggered the event (a filter, the original of a duplicate, ...)
    pub subject: Option<String>,

    pub message: Option<String>,
}

impl CrawlerEvent {
    pub fn new(kind: EventKind, source: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
            doc: None,
            subject: None,
            message: None,
        }
    }

    pub fn with_doc(mut self, doc: &DocContext) -> Self {
        self.doc = Some(doc.clone());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Reference of the attached document, if any
    pub fn reference(&self) -> Option<&str> {
        self.doc.as_ref().map(|d| d.reference.as_str())
    }
}

/// Receives crawler events
///
/// Listeners are called synchronously on the worker that fired the event and
/// must not block.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &CrawlerEvent);
}

/// Dispatches events to registered listeners
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Vec<Arc<dyn EventListener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&mut self, listener: Arc<dyn EventListener>) {
        self.listeners.push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Fires an event to every listener
    pub fn fire(&self, event: CrawlerEvent) {
        match (event.reference(), &event.message) {
            (Some(reference), Some(message)) => {
                tracing::debug!("{}: {} ({})", event.kind, reference, message)
            }
            (Some(reference), None) => tracing::debug!("{}: {}", event.kind, reference),
            (None, Some(message)) => tracing::debug!("{}: {}", event.kind, message),
            (None, None) => tracing::debug!("{}", event.kind),
        }

        for listener in &self.listeners {
            listener.on_event(&event);
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
