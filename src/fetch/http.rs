//! HTTP fetcher implementation
//!
//! This module fetches references over HTTP(S):
//! - HEAD requests for the metadata directive
//! - GET requests for the document directive
//! - Status classification into crawl states
//! - Redirects followed by the client and reported as the final reference

use crate::config::UserAgentConfig;
use crate::doc::Properties;
use crate::fetch::{FetchDirective, FetchError, FetchResponse, Fetcher};
use crate::state::CrawlState;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client, Response, StatusCode};
use std::time::Duration;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration, or `None` for the default agent
/// * `timeout` - Overall request timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use tidemark::config::UserAgentConfig;
/// use tidemark::fetch::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "Tidemark".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(Some(&config), Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: Option<&UserAgentConfig>,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    // Format: CrawlerName/Version (+ContactURL; ContactEmail)
    let user_agent = match config {
        Some(ua) => format!(
            "{}/{} (+{}; {})",
            ua.crawler_name, ua.crawler_version, ua.contact_url, ua.contact_email
        ),
        None => format!("tidemark/{}", env!("CARGO_PKG_VERSION")),
    };

    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Maps an HTTP status to a crawl state
///
/// | Status | State |
/// |--------|-------|
/// | 2xx | New |
/// | 404, 410 | NotFound |
/// | anything else | BadStatus |
pub fn classify_status(status: StatusCode) -> CrawlState {
    if status.is_success() {
        CrawlState::New
    } else if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        CrawlState::NotFound
    } else {
        CrawlState::BadStatus
    }
}

/// Fetches references over HTTP
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn to_response(reference: &str, response: &Response) -> FetchResponse {
        let status = response.status();
        let mut headers = Properties::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers
                    .entry(name.as_str().to_string())
                    .or_default()
                    .push(value.to_string());
            }
        }

        // Compare parsed URLs so normalization alone ("http://a" -> "http://a/") is not a redirect
        let redirected = reqwest::Url::parse(reference)
            .map(|requested| requested != *response.url())
            .unwrap_or(false);
        let final_reference = redirected.then(|| response.url().to_string());

        FetchResponse {
            state: classify_status(status),
            status_code: Some(status.as_u16()),
            reason_phrase: status.canonical_reason().map(str::to_string),
            headers,
            body: None,
            final_reference,
            child_references: Vec::new(),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        reference: &str,
        directive: FetchDirective,
    ) -> Result<FetchResponse, FetchError> {
        let request = match directive {
            FetchDirective::Metadata => self.client.head(reference),
            FetchDirective::Document => self.client.get(reference),
        };

        let response = request.send().await.map_err(|source| FetchError::Http {
            reference: reference.to_string(),
            source,
        })?;

        let mut fetched = Self::to_response(reference, &response);
        tracing::trace!("{} {} -> {}", directive, reference, fetched.status_line());

        if directive == FetchDirective::Document && fetched.state.is_good_state() {
            let body = response.bytes().await.map_err(|source| FetchError::Http {
                reference: reference.to_string(),
                source,
            })?;
            fetched.body = Some(body.to_vec());
        }

        Ok(fetched)
    }
}
