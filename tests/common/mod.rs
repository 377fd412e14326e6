//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tidemark::committer::{Committer, CommitterError, CommitterRequest, CommitterResult};
use tidemark::config::{Config, CrawlerConfig};
use tidemark::crawler::{
    CrawlSession, CrawlerBuilder, CrawlerContext, LocalTaskExecutor, SessionOutcome,
};
use tidemark::event::{CrawlerEvent, EventKind, EventListener};
use tidemark::fetch::{FetchDirective, FetchError, FetchResponse, Fetcher};
use tidemark::state::CrawlState;
use tidemark::storage::SharedStorage;

/// Serves canned responses; unknown references are not found
#[derive(Default)]
pub struct StubFetcher {
    responses: Mutex<HashMap<String, FetchResponse>>,
    directive_responses: Mutex<HashMap<(String, FetchDirective), FetchResponse>>,
    delays: Mutex<HashMap<String, Duration>>,
    fetched: Mutex<Vec<(String, FetchDirective)>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the response of a reference, for every directive
    pub fn respond(&self, reference: &str, response: FetchResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert(reference.to_string(), response);
    }

    /// Sets the response of a reference for one directive only
    pub fn respond_to(&self, reference: &str, directive: FetchDirective, response: FetchResponse) {
        self.directive_responses
            .lock()
            .unwrap()
            .insert((reference.to_string(), directive), response);
    }

    /// Makes every fetch of a reference take the given time
    pub fn delay(&self, reference: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(reference.to_string(), delay);
    }

    /// A page with a body and links
    pub fn page(&self, reference: &str, body: &str, children: &[&str]) {
        self.respond(
            reference,
            FetchResponse::ok()
                .with_header("content-type", "text/plain")
                .with_body(body)
                .with_children(children.iter().copied()),
        );
    }

    pub fn not_found(&self, reference: &str) {
        self.respond(
            reference,
            FetchResponse::new(CrawlState::NotFound).with_status(404, "Not Found"),
        );
    }

    pub fn bad_status(&self, reference: &str) {
        self.respond(
            reference,
            FetchResponse::new(CrawlState::BadStatus).with_status(500, "Internal Server Error"),
        );
    }

    pub fn clear_fetched(&self) {
        self.fetched.lock().unwrap().clear();
    }

    pub fn fetched(&self) -> Vec<(String, FetchDirective)> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn fetch_count(&self, reference: &str) -> usize {
        self.fetched
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| r == reference)
            .count()
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(
        &self,
        reference: &str,
        directive: FetchDirective,
    ) -> Result<FetchResponse, FetchError> {
        self.fetched
            .lock()
            .unwrap()
            .push((reference.to_string(), directive));
        let delay = self.delays.lock().unwrap().get(reference).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let response = self
            .directive_responses
            .lock()
            .unwrap()
            .get(&(reference.to_string(), directive))
            .cloned()
            .or_else(|| self.responses.lock().unwrap().get(reference).cloned());
        Ok(response.unwrap_or_else(|| {
            FetchResponse::new(CrawlState::NotFound).with_status(404, "Not Found")
        }))
    }
}

/// Records every committed request
#[derive(Default)]
pub struct RecordingCommitter {
    requests: Mutex<Vec<CommitterRequest>>,
    fail: AtomicBool,
}

impl RecordingCommitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<CommitterRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn upserts(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter(|r| !r.is_delete())
            .map(|r| r.reference().to_string())
            .collect()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter(|r| r.is_delete())
            .map(|r| r.reference().to_string())
            .collect()
    }

    pub fn clear(&self) {
        self.requests.lock().unwrap().clear();
    }
}

#[async_trait]
impl Committer for RecordingCommitter {
    async fn commit_batch(&self, batch: &[CommitterRequest]) -> CommitterResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CommitterError::Write("committer unavailable".to_string()));
        }
        self.requests.lock().unwrap().extend_from_slice(batch);
        Ok(())
    }

    async fn clean(&self) -> CommitterResult<()> {
        self.requests.lock().unwrap().clear();
        Ok(())
    }
}

/// Records every fired event
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<CrawlerEvent>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CrawlerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }

    /// References of the events of a kind
    pub fn references(&self, kind: EventKind) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind)
            .filter_map(|e| e.reference().map(str::to_string))
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl EventListener for RecordingListener {
    fn on_event(&self, event: &CrawlerEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Creates a test configuration crawling from the given references
pub fn create_test_config(start_references: &[&str]) -> Config {
    Config {
        crawler: CrawlerConfig {
            id: "test-crawler".to_string(),
            start_references: start_references.iter().map(|r| r.to_string()).collect(),
            num_threads: 2,
            idle_poll_millis: 10,
            shutdown_timeout_secs: 5,
            queue_init_timeout_secs: 5,
            ..CrawlerConfig::default()
        },
        ..Config::default()
    }
}

/// Collaborators of a test crawler, kept across sessions
pub struct Harness {
    pub storage: SharedStorage,
    pub fetcher: Arc<StubFetcher>,
    pub committer: Arc<RecordingCommitter>,
    pub listener: Arc<RecordingListener>,
}

impl Harness {
    pub fn new(storage: SharedStorage) -> Self {
        Self {
            storage,
            fetcher: Arc::new(StubFetcher::new()),
            committer: Arc::new(RecordingCommitter::new()),
            listener: Arc::new(RecordingListener::new()),
        }
    }

    /// Builder wired to the shared collaborators
    pub fn builder(&self, config: Config) -> CrawlerBuilder {
        CrawlerBuilder::new(config)
            .storage(self.storage.clone())
            .fetcher(self.fetcher.clone())
            .committer(self.committer.clone())
            .listener(self.listener.clone())
    }

    /// Builds a crawler for one session on the shared collaborators
    pub fn crawler(&self, config: Config) -> Arc<CrawlerContext> {
        self.builder(config).build().expect("Failed to build crawler")
    }

    /// Runs one session with a fresh crawler
    pub async fn run(&self, config: Config) -> tidemark::Result<SessionOutcome> {
        let crawler = self.crawler(config);
        CrawlSession::new(crawler, Arc::new(LocalTaskExecutor::new()))
            .run()
            .await
    }

    /// Forgets what the previous sessions recorded, keeping the storage
    pub fn reset_records(&self) {
        self.committer.clear();
        self.listener.clear();
        self.fetcher.clear_fetched();
    }
}
