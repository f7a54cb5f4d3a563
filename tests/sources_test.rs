//! Wiremock and filesystem tests for the data sources and the purge webhook.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use muninn::invalidation::{HttpPurger, PageCacheInvalidator, PurgeScope};
use muninn::sources::{
    DataSource, FallbackSource, FileDataSource, HttpDataSource, RetryPolicy, RetryingDataSource,
    StaticDataSource,
};
use muninn::types::{DataSourceTag, Event, FetchOutcome};
use muninn::{MuninnError, Result};

fn events_json() -> serde_json::Value {
    serde_json::json!([
        {"id": "a", "name": "Jam", "date": "2025-06-21", "venue": "Hall"},
        {"id": 7, "name": "Ceilidh", "date": "2025-07-01", "tags": ["folk"]}
    ])
}

// ============================================================================
// HTTP source
// ============================================================================

#[tokio::test]
async fn http_source_parses_bare_array() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/events.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(events_json()))
        .mount(&server)
        .await;

    let source = HttpDataSource::new(format!("{}/events.json", server.uri())).unwrap();
    let outcome = source.fetch().await.expect("fetch should succeed");

    assert!(outcome.success);
    assert_eq!(outcome.source, DataSourceTag::Remote);
    assert_eq!(outcome.events.len(), 2);
    assert_eq!(outcome.events[0].extra["venue"], "Hall");
    assert_eq!(outcome.events[1].id, "7");
    assert_eq!(outcome.events[1].tags, vec!["folk"]);
}

#[tokio::test]
async fn http_source_parses_wrapped_object_and_sends_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/events"))
        .and(header("authorization", "Bearer upstream-key"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "events": events_json(), "total": 2 })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let source = HttpDataSource::new(format!("{}/api/events", server.uri()))
        .unwrap()
        .bearer_token("upstream-key");
    let outcome = source.fetch().await.unwrap();
    assert_eq!(outcome.events.len(), 2);
}

#[tokio::test]
async fn http_source_maps_server_error_to_transient_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let source = HttpDataSource::new(server.uri()).unwrap();
    let err = source.fetch().await.unwrap_err();

    match &err {
        MuninnError::Upstream { status, message } => {
            assert_eq!(*status, 503);
            assert_eq!(message, "maintenance");
        }
        other => panic!("expected Upstream, got {other:?}"),
    }
    assert!(err.is_transient());
    assert!(err.is_fallback_trigger());
}

#[tokio::test]
async fn http_source_client_error_is_not_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let source = HttpDataSource::new(server.uri()).unwrap();
    let err = source.fetch().await.unwrap_err();
    assert!(matches!(err, MuninnError::Upstream { status: 404, .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn http_source_rejects_malformed_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let source = HttpDataSource::new(server.uri()).unwrap();
    assert!(matches!(source.fetch().await, Err(MuninnError::Json(_))));
}

#[tokio::test]
async fn http_source_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(events_json())
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let source = HttpDataSource::with_timeout(server.uri(), Duration::from_millis(100)).unwrap();
    let err = source.fetch().await.unwrap_err();
    assert!(matches!(err, MuninnError::Timeout(_)));
}

// ============================================================================
// File source
// ============================================================================

#[tokio::test]
async fn file_source_round_trips_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("nested").join("events.json");
    let source = FileDataSource::new(&file);

    let events = vec![Event::new("a", "Jam", "2025-06-21").with_field("venue", "Hall")];
    source.save_snapshot(&events).await.unwrap();
    assert!(file.exists());
    assert!(!file.with_extension("json.tmp").exists());

    let outcome = source.fetch().await.unwrap();
    assert_eq!(outcome.events, events);
    assert_eq!(outcome.source, DataSourceTag::Local);
}

#[tokio::test]
async fn file_source_reads_bare_array_with_custom_tag() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("store.json");
    std::fs::write(&file, events_json().to_string()).unwrap();

    let outcome = FileDataSource::new(&file)
        .with_tag(DataSourceTag::Store)
        .fetch()
        .await
        .unwrap();
    assert_eq!(outcome.events.len(), 2);
    assert_eq!(outcome.source, DataSourceTag::Store);
}

#[tokio::test]
async fn missing_file_is_a_fetch_error() {
    let dir = tempfile::tempdir().unwrap();
    let source = FileDataSource::new(dir.path().join("absent.json"));
    let err = source.fetch().await.unwrap_err();
    assert!(matches!(err, MuninnError::DataFetch(_)));
    assert!(err.is_fallback_trigger());
}

// ============================================================================
// Fallback chain
// ============================================================================

struct Broken;

#[async_trait]
impl DataSource for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    async fn fetch(&self) -> Result<FetchOutcome> {
        Err(MuninnError::Http("connection refused".to_string()))
    }
}

#[tokio::test]
async fn chain_serves_first_working_source_with_warnings() {
    let chain = FallbackSource::new("secondary")
        .with_source(Arc::new(Broken))
        .with_source(Arc::new(StaticDataSource::new(vec![Event::new(
            "a",
            "Jam",
            "2025-06-21",
        )])));
    assert_eq!(chain.len(), 2);

    let outcome = chain.fetch().await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.events.len(), 1);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].starts_with("broken:"));
    assert!(outcome.error.as_deref().unwrap().contains("connection refused"));
}

#[tokio::test]
async fn chain_skips_empty_sources() {
    let chain = FallbackSource::new("secondary")
        .with_source(Arc::new(StaticDataSource::new(Vec::new()).with_name("empty")))
        .with_source(Arc::new(
            StaticDataSource::new(vec![Event::new("a", "Jam", "2025-06-21")])
                .with_tag(DataSourceTag::Store),
        ));

    let outcome = chain.fetch().await.unwrap();
    assert_eq!(outcome.source, DataSourceTag::Store);
}

#[tokio::test]
async fn chain_returns_last_error_when_all_fail() {
    let chain = FallbackSource::new("secondary").with_source(Arc::new(Broken));
    assert!(matches!(chain.fetch().await, Err(MuninnError::Http(_))));

    let empty = FallbackSource::new("nothing");
    assert!(empty.is_empty());
    assert!(matches!(empty.fetch().await, Err(MuninnError::NoSource)));
}

// ============================================================================
// Retry decorator
// ============================================================================

/// Fails `failures` times, then succeeds.
struct Flaky {
    remaining: AtomicU32,
    calls: AtomicU32,
    error: fn() -> MuninnError,
}

impl Flaky {
    fn new(failures: u32, error: fn() -> MuninnError) -> Self {
        Self {
            remaining: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
            error,
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataSource for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn fetch(&self) -> Result<FetchOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.remaining.load(Ordering::SeqCst) > 0 {
            self.remaining.fetch_sub(1, Ordering::SeqCst);
            return Err((self.error)());
        }
        Ok(FetchOutcome::ok(
            vec![Event::new("a", "Jam", "2025-06-21")],
            DataSourceTag::Remote,
        ))
    }
}

#[tokio::test(start_paused = true)]
async fn retry_recovers_from_transient_failures() {
    let inner = Arc::new(Flaky::new(2, || MuninnError::Upstream {
        status: 502,
        message: "bad gateway".into(),
    }));
    let source = RetryingDataSource::new(inner.clone(), RetryPolicy::new(3, Duration::from_secs(1)));

    let started = tokio::time::Instant::now();
    let outcome = source.fetch().await.unwrap();

    assert!(outcome.success);
    assert_eq!(inner.calls(), 3);
    // 1s + 2s of backoff
    assert!(started.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn retry_gives_up_after_max_retries() {
    let inner = Arc::new(Flaky::new(10, || MuninnError::Timeout(Duration::from_secs(15))));
    let source = RetryingDataSource::new(inner.clone(), RetryPolicy::new(2, Duration::from_millis(10)));

    assert!(matches!(source.fetch().await, Err(MuninnError::Timeout(_))));
    assert_eq!(inner.calls(), 3);
}

#[tokio::test]
async fn retry_does_not_repeat_permanent_failures() {
    let inner = Arc::new(Flaky::new(1, || MuninnError::Validation { valid: 0, total: 3 }));
    let source = RetryingDataSource::new(inner.clone(), RetryPolicy::new(3, Duration::from_millis(10)));

    assert!(matches!(source.fetch().await, Err(MuninnError::Validation { .. })));
    assert_eq!(inner.calls(), 1);
}

// ============================================================================
// Purge webhook
// ============================================================================

#[tokio::test]
async fn purger_posts_path_and_scope_with_secret() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/revalidate"))
        .and(header("authorization", "Bearer purge-secret"))
        .and(body_json(serde_json::json!({ "path": "/events", "scope": "page" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let purger = HttpPurger::new(
        format!("{}/api/revalidate", server.uri()),
        Some("purge-secret".to_string()),
    )
    .unwrap();
    purger.purge("/events", PurgeScope::Page).await.unwrap();
}

#[tokio::test]
async fn purger_reports_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad secret"))
        .mount(&server)
        .await;

    let purger = HttpPurger::new(server.uri(), None).unwrap();
    let err = purger.purge("events", PurgeScope::Tag).await.unwrap_err();
    match err {
        MuninnError::Invalidation(message) => {
            assert!(message.contains("401"));
            assert!(message.contains("bad secret"));
        }
        other => panic!("expected Invalidation, got {other:?}"),
    }
}
