//! Shared crawler state
//!
//! A `CrawlerContext` holds everything workers share: configuration, the
//! ledger, collaborators behind traits, and the stop flag. It is built once
//! per crawl by [`CrawlerBuilder`] and handed around as `Arc<CrawlerContext>`.

use crate::committer::{BatchCommitQueue, Committer, CommitterRequest, JsonLinesCommitter};
use crate::config::Config;
use crate::crawler::metrics::CrawlMetrics;
use crate::doc::DocContext;
use crate::event::{CrawlerEvent, EventBus, EventKind, EventListener};
use crate::fetch::{build_http_client, FetchDirective, FetchSupport, Fetcher, HttpFetcher};
use crate::filter::OnMatchFilter;
use crate::ledger::DocumentLedger;
use crate::pipeline::{DocumentChecksummer, DocumentProcessor, MetadataChecksummer, Pipelines};
use crate::spoil::SpoiledReferenceStrategizer;
use crate::storage::{shared, MemoryStorage, SharedStorage};
use crate::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// State shared by every worker of a crawl
pub struct CrawlerContext {
    pub config: Config,
    pub storage: SharedStorage,
    pub ledger: DocumentLedger,
    pub events: EventBus,
    pub fetcher: Arc<dyn Fetcher>,
    pub committer: BatchCommitQueue,
    pub strategizer: SpoiledReferenceStrategizer,
    pub pipelines: Pipelines,

    pub reference_filters: Vec<OnMatchFilter>,
    pub metadata_filters: Vec<OnMatchFilter>,
    pub document_filters: Vec<OnMatchFilter>,

    pub metadata_checksummer: Option<MetadataChecksummer>,
    pub document_checksummer: Option<DocumentChecksummer>,

    pub pre_processors: Vec<Arc<dyn DocumentProcessor>>,
    pub post_processors: Vec<Arc<dyn DocumentProcessor>>,

    pub metrics: Arc<CrawlMetrics>,

    stopping: AtomicBool,
    queue_initialized: AtomicBool,
}

impl CrawlerContext {
    /// Crawler id, used as event source
    pub fn id(&self) -> &str {
        &self.config.crawler.id
    }

    /// Creates an event sourced from this crawler
    pub fn event(&self, kind: EventKind) -> CrawlerEvent {
        CrawlerEvent::new(kind, self.id())
    }

    pub fn fire(&self, event: CrawlerEvent) {
        self.events.fire(event);
    }

    /// Configured support of a fetch directive
    pub fn fetch_support(&self, directive: FetchDirective) -> FetchSupport {
        match directive {
            FetchDirective::Metadata => self.config.crawler.metadata_fetch_support,
            FetchDirective::Document => self.config.crawler.document_fetch_support,
        }
    }

    // ===== Stop =====

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Requests a cooperative stop
    ///
    /// Workers finish the stage they are in and exit; the session does not
    /// reach its end so the next run resumes.
    pub fn stop(&self) {
        if !self.stopping.swap(true, Ordering::SeqCst) {
            tracing::info!("Stopping crawler \"{}\"...", self.id());
            self.fire(self.event(EventKind::CrawlerStopBegin));
        }
    }

    // ===== Queue initialization =====

    /// Returns true once every start reference was queued
    pub fn is_queue_initialized(&self) -> bool {
        self.queue_initialized.load(Ordering::SeqCst)
    }

    pub fn set_queue_initialized(&self, initialized: bool) {
        self.queue_initialized.store(initialized, Ordering::SeqCst);
    }

    // ===== Commit =====

    /// Sends a request to the committer
    ///
    /// # Arguments
    ///
    /// * `request` - The upsert or deletion
    /// * `doc` - The record the request was made from, attached to the event
    pub async fn commit(&self, request: CommitterRequest, doc: &DocContext) -> Result<()> {
        let kind = if request.is_delete() {
            EventKind::DocumentCommittedDelete
        } else {
            EventKind::DocumentCommittedUpsert
        };
        self.committer.push(request).await?;
        self.fire(self.event(kind).with_doc(doc));
        Ok(())
    }
}

impl std::fmt::Debug for CrawlerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrawlerContext")
            .field("id", &self.id())
            .field("stopping", &self.is_stopping())
            .field("queue_initialized", &self.is_queue_initialized())
            .finish()
    }
}

/// Builds a [`CrawlerContext`]
///
/// Collaborators that are not set fall back to what the configuration
/// describes: an in-memory storage, an HTTP fetcher and a JSON lines
/// committer.
///
/// # Example
///
/// ```no_run
/// use tidemark::config::load_config;
/// use tidemark::crawler::CrawlerBuilder;
/// use std::path::Path;
///
/// let config = load_config(Path::new("config.toml")).unwrap();
/// let crawler = CrawlerBuilder::new(config).build().unwrap();
/// ```
pub struct CrawlerBuilder {
    config: Config,
    storage: Option<SharedStorage>,
    fetcher: Option<Arc<dyn Fetcher>>,
    committer: Option<Arc<dyn Committer>>,
    strategizer: Option<SpoiledReferenceStrategizer>,
    listeners: Vec<Arc<dyn EventListener>>,
    pre_processors: Vec<Arc<dyn DocumentProcessor>>,
    post_processors: Vec<Arc<dyn DocumentProcessor>>,
}

impl CrawlerBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            storage: None,
            fetcher: None,
            committer: None,
            strategizer: None,
            listeners: Vec::new(),
            pre_processors: Vec::new(),
            post_processors: Vec::new(),
        }
    }

    pub fn storage(mut self, storage: SharedStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn committer(mut self, committer: Arc<dyn Committer>) -> Self {
        self.committer = Some(committer);
        self
    }

    /// Replaces the strategizer built from `[spoiled-references]`
    pub fn strategizer(mut self, strategizer: SpoiledReferenceStrategizer) -> Self {
        self.strategizer = Some(strategizer);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn pre_processor(mut self, processor: Arc<dyn DocumentProcessor>) -> Self {
        self.pre_processors.push(processor);
        self
    }

    pub fn post_processor(mut self, processor: Arc<dyn DocumentProcessor>) -> Self {
        self.post_processors.push(processor);
        self
    }

    /// Builds the context
    ///
    /// # Returns
    ///
    /// * `Ok(Arc<CrawlerContext>)` - The shared crawler state
    /// * `Err(TidemarkError)` - The default HTTP client could not be built
    pub fn build(self) -> Result<Arc<CrawlerContext>> {
        let config = self.config;
        let crawler_config = &config.crawler;

        let storage = self
            .storage
            .unwrap_or_else(|| shared(MemoryStorage::new()));

        let fetcher: Arc<dyn Fetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => {
                let client = build_http_client(
                    config.user_agent.as_ref(),
                    Duration::from_secs(crawler_config.fetch_timeout_secs),
                )?;
                Arc::new(HttpFetcher::new(client))
            }
        };

        let committer: Arc<dyn Committer> = self.committer.unwrap_or_else(|| {
            Arc::new(JsonLinesCommitter::new(&config.committer.output_path))
        });

        let metrics = Arc::new(CrawlMetrics::new(crawler_config.progress_interval));
        let mut events = EventBus::new();
        events.add_listener(metrics.clone());
        for listener in self.listeners {
            events.add_listener(listener);
        }

        let committer = BatchCommitQueue::new(
            storage.clone(),
            committer,
            events.clone(),
            crawler_config.id.clone(),
            config.committer.batch_size,
        );

        let strategizer = self
            .strategizer
            .unwrap_or_else(|| SpoiledReferenceStrategizer::from_config(&config.spoiled_references));

        let metadata_checksummer = (!crawler_config.metadata_checksum_fields.is_empty())
            .then(|| MetadataChecksummer::new(crawler_config.metadata_checksum_fields.clone()));
        let document_checksummer = crawler_config.document_checksum.then_some(DocumentChecksummer);

        let to_filters = |filters: &[crate::config::FilterConfig]| -> Vec<OnMatchFilter> {
            filters.iter().map(|f| f.to_filter()).collect()
        };
        let reference_filters = to_filters(&config.reference_filters);
        let metadata_filters = to_filters(&config.metadata_filters);
        let document_filters = to_filters(&config.document_filters);

        Ok(Arc::new(CrawlerContext {
            ledger: DocumentLedger::new(storage.clone()),
            storage,
            events,
            fetcher,
            committer,
            strategizer,
            pipelines: Pipelines::default(),
            reference_filters,
            metadata_filters,
            document_filters,
            metadata_checksummer,
            document_checksummer,
            pre_processors: self.pre_processors,
            post_processors: self.post_processors,
            metrics,
            stopping: AtomicBool::new(false),
            queue_initialized: AtomicBool::new(false),
            config,
        }))
    }
}
