//! Tests for the HTTP client module

use super::*;
use crate::error::Error;
use crate::types::BackoffType;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_client(max_retries: u32) -> HttpClient {
    let config = HttpClientConfig::builder()
        .max_retries(max_retries)
        .backoff(
            BackoffType::Constant,
            Duration::from_millis(10),
            Duration::from_secs(1),
        )
        .no_rate_limit()
        .build();
    HttpClient::with_config(config).unwrap()
}

// ============================================================================
// Config Tests
// ============================================================================

#[test]
fn test_http_client_config_default() {
    let config = HttpClientConfig::default();
    assert_eq!(config.timeout, Duration::from_secs(60));
    assert_eq!(config.max_retries, 3);
    assert_eq!(config.initial_backoff, Duration::from_secs(1));
    assert!(config.rate_limit.is_some());
}

#[test]
fn test_http_client_config_builder() {
    let config = HttpClientConfig::builder()
        .timeout(Duration::from_secs(90))
        .max_retries(5)
        .backoff(
            BackoffType::Linear,
            Duration::from_millis(200),
            Duration::from_secs(30),
        )
        .user_agent("test-agent/1.0")
        .build();

    assert_eq!(config.timeout, Duration::from_secs(90));
    assert_eq!(config.max_retries, 5);
    assert_eq!(config.backoff_type, BackoffType::Linear);
    assert_eq!(config.initial_backoff, Duration::from_millis(200));
    assert_eq!(config.max_backoff, Duration::from_secs(30));
    assert_eq!(config.user_agent, "test-agent/1.0");
}

// ============================================================================
// Request Tests
// ============================================================================

#[tokio::test]
async fn test_post_xml_sends_xml_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/ia/xml/xmlgw.phtml"))
        .and(header("Content-Type", "application/xml"))
        .and(body_string_contains("<request>"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<response/>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = fast_client(0);
    let body = client
        .post_xml(
            &format!("{}/ia/xml/xmlgw.phtml", mock_server.uri()),
            "<request></request>",
        )
        .await
        .unwrap();

    assert_eq!(body, "<response/>");
}

#[tokio::test]
async fn test_post_xml_client_error_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not found"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = fast_client(3);
    let err = client.post_xml(&mock_server.uri(), "<request/>").await.unwrap_err();

    assert!(matches!(err, Error::HttpStatus { status: 404, .. }));
}

#[tokio::test]
async fn test_post_xml_retries_server_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<response/>"))
        .mount(&mock_server)
        .await;

    let client = fast_client(3);
    let body = client.post_xml(&mock_server.uri(), "<request/>").await.unwrap();
    assert_eq!(body, "<response/>");
}

#[tokio::test]
async fn test_post_xml_rate_limit_retry() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "0")
                .set_body_string("Rate limited"),
        )
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<ok/>"))
        .mount(&mock_server)
        .await;

    let client = fast_client(2);
    let body = client.post_xml(&mock_server.uri(), "<request/>").await.unwrap();
    assert_eq!(body, "<ok/>");
}

#[tokio::test]
async fn test_post_xml_max_retries_exceeded() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Server error"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let client = fast_client(2);
    let err = client.post_xml(&mock_server.uri(), "<request/>").await.unwrap_err();

    match err {
        Error::MaxRetriesExceeded {
            max_retries,
            last_error,
        } => {
            assert_eq!(max_retries, 2);
            assert!(last_error.contains("500"));
        }
        other => panic!("Expected MaxRetriesExceeded, got {other:?}"),
    }
}

#[tokio::test]
async fn test_post_xml_with_rate_limiter() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<ok/>"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let config = HttpClientConfig::builder()
        .rate_limit(RateLimiterConfig::new(100, 10))
        .build();
    let client = HttpClient::with_config(config).unwrap();
    assert!(client.has_rate_limiter());
    assert_eq!(client.rate_limit(), Some(&RateLimiterConfig::new(100, 10)));

    for _ in 0..3 {
        client.post_xml(&mock_server.uri(), "<request/>").await.unwrap();
    }
}

// ============================================================================
// Backoff Tests
// ============================================================================

#[test]
fn test_calculate_backoff_constant() {
    let initial = Duration::from_millis(100);
    let max = Duration::from_secs(10);
    assert_eq!(calculate_backoff(BackoffType::Constant, initial, max, 0), initial);
    assert_eq!(calculate_backoff(BackoffType::Constant, initial, max, 5), initial);
}

#[test]
fn test_calculate_backoff_linear() {
    let initial = Duration::from_millis(100);
    let max = Duration::from_secs(10);
    assert_eq!(
        calculate_backoff(BackoffType::Linear, initial, max, 0),
        Duration::from_millis(100)
    );
    assert_eq!(
        calculate_backoff(BackoffType::Linear, initial, max, 2),
        Duration::from_millis(300)
    );
}

#[test]
fn test_calculate_backoff_exponential_respects_max() {
    let client = HttpClient::with_config(
        HttpClientConfig::builder()
            .backoff(
                BackoffType::Exponential,
                Duration::from_millis(100),
                Duration::from_millis(500),
            )
            .no_rate_limit()
            .build(),
    )
    .unwrap();

    assert_eq!(client.calculate_backoff(0), Duration::from_millis(100));
    assert_eq!(client.calculate_backoff(1), Duration::from_millis(200));
    assert_eq!(client.calculate_backoff(2), Duration::from_millis(400));
    assert_eq!(client.calculate_backoff(10), Duration::from_millis(500));
    assert_eq!(client.calculate_backoff(40), Duration::from_millis(500));
}

#[test]
fn test_http_client_debug() {
    let client = fast_client(0);
    let debug_str = format!("{client:?}");
    assert!(debug_str.contains("HttpClient"));
    assert!(debug_str.contains("has_rate_limiter"));
}
