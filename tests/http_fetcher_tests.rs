//! Integration tests for the HTTP fetcher
//!
//! These tests use wiremock to create mock HTTP servers.

use std::time::Duration;
use tidemark::fetch::{build_http_client, FetchDirective, FetchError, Fetcher, HttpFetcher};
use tidemark::state::CrawlState;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher() -> HttpFetcher {
    let client = build_http_client(None, Duration::from_secs(5)).expect("Failed to build client");
    HttpFetcher::new(client)
}

#[tokio::test]
async fn test_document_fetch_returns_body_and_headers() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/doc"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("hello")
                .insert_header("content-type", "text/plain"),
        )
        .mount(&mock_server)
        .await;

    let reference = format!("{}/doc", mock_server.uri());
    let response = fetcher()
        .fetch(&reference, FetchDirective::Document)
        .await
        .expect("Fetch failed");

    assert_eq!(response.state, CrawlState::New);
    assert_eq!(response.status_code, Some(200));
    assert_eq!(response.body.as_deref(), Some(&b"hello"[..]));
    assert_eq!(
        response.headers.get("content-type"),
        Some(&vec!["text/plain".to_string()])
    );
    assert!(response.final_reference.is_none());
}

#[tokio::test]
async fn test_metadata_fetch_uses_head() {
    let mock_server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/doc"))
        .respond_with(ResponseTemplate::new(200).insert_header("etag", "\"v1\""))
        .expect(1)
        .mount(&mock_server)
        .await;

    let reference = format!("{}/doc", mock_server.uri());
    let response = fetcher()
        .fetch(&reference, FetchDirective::Metadata)
        .await
        .expect("Fetch failed");

    assert_eq!(response.state, CrawlState::New);
    assert!(response.body.is_none());
    assert_eq!(
        response.headers.get("etag"),
        Some(&vec!["\"v1\"".to_string()])
    );
}

#[tokio::test]
async fn test_status_classification() {
    let mock_server = MockServer::start().await;
    for (route, status) in [("/missing", 404), ("/gone", 410), ("/broken", 500)] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status))
            .mount(&mock_server)
            .await;
    }

    let fetcher = fetcher();
    let fetch = |route: &str| {
        let reference = format!("{}{}", mock_server.uri(), route);
        let fetcher = fetcher.clone();
        async move {
            fetcher
                .fetch(&reference, FetchDirective::Document)
                .await
                .expect("Fetch failed")
        }
    };

    let missing = fetch("/missing").await;
    assert_eq!(missing.state, CrawlState::NotFound);
    assert_eq!(missing.status_line(), "404 Not Found");
    assert!(missing.body.is_none());

    assert_eq!(fetch("/gone").await.state, CrawlState::NotFound);
    assert_eq!(fetch("/broken").await.state, CrawlState::BadStatus);
}

#[tokio::test]
async fn test_redirect_reports_final_reference() {
    let mock_server = MockServer::start().await;
    let target = format!("{}/new", mock_server.uri());
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", target.as_str()))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("moved"))
        .mount(&mock_server)
        .await;

    let reference = format!("{}/old", mock_server.uri());
    let response = fetcher()
        .fetch(&reference, FetchDirective::Document)
        .await
        .expect("Fetch failed");

    assert_eq!(response.state, CrawlState::New);
    assert_eq!(response.final_reference.as_deref(), Some(target.as_str()));
    assert_eq!(response.body.as_deref(), Some(&b"moved"[..]));
}

#[tokio::test]
async fn test_unreachable_host_is_an_error() {
    // Nothing listens on the port once the server is dropped
    let uri = {
        let mock_server = MockServer::start().await;
        mock_server.uri()
    };

    let result = fetcher()
        .fetch(&format!("{}/doc", uri), FetchDirective::Document)
        .await;
    assert!(matches!(result, Err(FetchError::Http { .. })));
}
