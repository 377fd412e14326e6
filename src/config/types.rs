use crate::fetch::FetchSupport;
use crate::filter::{OnMatch, OnMatchFilter};
use crate::spoil::SpoiledReferenceStrategy;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for tidemark
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: Option<UserAgentConfig>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub committer: CommitterConfig,
    #[serde(rename = "reference-filter", default)]
    pub reference_filters: Vec<FilterConfig>,
    #[serde(rename = "metadata-filter", default)]
    pub metadata_filters: Vec<FilterConfig>,
    #[serde(rename = "document-filter", default)]
    pub document_filters: Vec<FilterConfig>,
    #[serde(rename = "spoiled-references", default)]
    pub spoiled_references: SpoiledReferencesConfig,
}

/// What to do with references left over from the previous session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphansStrategy {
    /// Re-crawl them
    Process,
    /// Send deletions for them
    Delete,
    /// Leave them alone
    Ignore,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Unique crawler id, used as event source
    pub id: String,

    /// References the crawl starts from
    #[serde(rename = "start-references", default)]
    pub start_references: Vec<String>,

    /// Queue start references on a background task
    #[serde(rename = "start-references-async", default)]
    pub start_references_async: bool,

    /// Number of concurrent workers
    #[serde(rename = "num-threads", default = "default_num_threads")]
    pub num_threads: u32,

    /// Maximum depth from a start reference, -1 for unlimited
    #[serde(rename = "max-depth", default = "default_unlimited")]
    pub max_depth: i32,

    /// Maximum documents processed per session, -1 for unlimited
    #[serde(rename = "max-documents", default = "default_unlimited_docs")]
    pub max_documents: i64,

    #[serde(rename = "orphans-strategy", default = "default_orphans_strategy")]
    pub orphans_strategy: OrphansStrategy,

    #[serde(rename = "metadata-fetch-support", default = "default_metadata_support")]
    pub metadata_fetch_support: FetchSupport,

    #[serde(rename = "document-fetch-support", default = "default_document_support")]
    pub document_fetch_support: FetchSupport,

    /// Metadata fields making up the metadata checksum; empty disables it
    #[serde(rename = "metadata-checksum-fields", default)]
    pub metadata_checksum_fields: Vec<String>,

    /// Compute a content checksum to detect unmodified documents
    #[serde(rename = "document-checksum", default = "default_true")]
    pub document_checksum: bool,

    /// Reject documents whose metadata checksum was already seen this session
    #[serde(rename = "metadata-deduplicate", default)]
    pub metadata_deduplicate: bool,

    /// Reject documents whose content checksum was already seen this session
    #[serde(rename = "document-deduplicate", default)]
    pub document_deduplicate: bool,

    /// How long an idle worker sleeps before polling the queue again (milliseconds)
    #[serde(rename = "idle-poll-millis", default = "default_idle_poll_millis")]
    pub idle_poll_millis: u64,

    /// How long workers get to finish after a stop request (seconds)
    #[serde(rename = "shutdown-timeout-secs", default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// How long to wait for background queue initialization (seconds)
    #[serde(rename = "queue-init-timeout-secs", default = "default_queue_init_timeout_secs")]
    pub queue_init_timeout_secs: u64,

    /// Log progress every N processed documents
    #[serde(rename = "progress-interval", default = "default_progress_interval")]
    pub progress_interval: u64,

    /// Timeout of a single fetch (seconds)
    #[serde(rename = "fetch-timeout-secs", default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

fn default_num_threads() -> u32 {
    2
}

fn default_unlimited() -> i32 {
    -1
}

fn default_unlimited_docs() -> i64 {
    -1
}

fn default_orphans_strategy() -> OrphansStrategy {
    OrphansStrategy::Process
}

fn default_metadata_support() -> FetchSupport {
    FetchSupport::Disabled
}

fn default_document_support() -> FetchSupport {
    FetchSupport::Required
}

fn default_true() -> bool {
    true
}

fn default_idle_poll_millis() -> u64 {
    100
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

fn default_queue_init_timeout_secs() -> u64 {
    60
}

fn default_progress_interval() -> u64 {
    10
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            id: "tidemark".to_string(),
            start_references: Vec::new(),
            start_references_async: false,
            num_threads: default_num_threads(),
            max_depth: default_unlimited(),
            max_documents: default_unlimited_docs(),
            orphans_strategy: default_orphans_strategy(),
            metadata_fetch_support: default_metadata_support(),
            document_fetch_support: default_document_support(),
            metadata_checksum_fields: Vec::new(),
            document_checksum: default_true(),
            metadata_deduplicate: false,
            document_deduplicate: false,
            idle_poll_millis: default_idle_poll_millis(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            queue_init_timeout_secs: default_queue_init_timeout_secs(),
            progress_interval: default_progress_interval(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    "./tidemark.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Committer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CommitterConfig {
    /// Number of buffered requests that triggers a flush
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    /// File the JSON lines committer appends to
    #[serde(rename = "output-path", default = "default_output_path")]
    pub output_path: String,
}

fn default_batch_size() -> usize {
    20
}

fn default_output_path() -> String {
    "./committed.jsonl".to_string()
}

impl Default for CommitterConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            output_path: default_output_path(),
        }
    }
}

/// A filter entry
#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    /// Wildcard expression (`*` and `?`), blank matches everything
    #[serde(default)]
    pub expression: String,

    #[serde(rename = "on-match", default)]
    pub on_match: OnMatch,

    /// Metadata field to test (metadata and document filters only)
    #[serde(default)]
    pub field: Option<String>,

    #[serde(rename = "ignore-case", default)]
    pub ignore_case: bool,
}

impl FilterConfig {
    /// Builds the runtime filter
    pub fn to_filter(&self) -> OnMatchFilter {
        OnMatchFilter {
            expression: self.expression.clone(),
            on_match: self.on_match,
            field: self.field.clone(),
            ignore_case: self.ignore_case,
        }
    }
}

/// Spoiled reference strategies
///
/// ```toml
/// [spoiled-references]
/// fallback = "delete"
///
/// [spoiled-references.mappings]
/// not-found = "delete"
/// bad-status = "grace-once"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpoiledReferencesConfig {
    /// State name -> strategy, merged over the defaults
    #[serde(default)]
    pub mappings: BTreeMap<String, SpoiledReferenceStrategy>,

    /// Strategy for states without a mapping
    #[serde(default)]
    pub fallback: Option<SpoiledReferenceStrategy>,
}
