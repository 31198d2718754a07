//! End-to-end batch runs against a mock HTTP server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use sluice::batch::{BatchDriver, FetchOutcome, Fetcher, HttpFetcher, WorkItem};
use sluice::config::BatchConfig;
use sluice::error::SluiceError;
use sluice::ratelimit::LeakyBucket;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher() -> Arc<HttpFetcher> {
    Arc::new(HttpFetcher::new(&BatchConfig::default()).expect("Failed to build fetcher"))
}

#[tokio::test]
async fn test_fetcher_maps_statuses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"price": 42})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let fetcher = fetcher();

    let ok = WorkItem::new("ok", format!("{}/ok", server.uri()));
    assert_eq!(
        fetcher.fetch(&ok).await.unwrap(),
        FetchOutcome::Data(json!({"price": 42}))
    );

    let busy = WorkItem::new("busy", format!("{}/busy", server.uri()));
    assert_eq!(fetcher.fetch(&busy).await.unwrap(), FetchOutcome::Throttled);

    let missing = WorkItem::new("missing", format!("{}/missing", server.uri()));
    let err = fetcher.fetch(&missing).await.unwrap_err();
    assert!(matches!(err, SluiceError::Status { status: 404, .. }));
}

#[tokio::test]
async fn test_throttled_requests_are_requeued() {
    let server = MockServer::start().await;
    let count = Arc::new(AtomicUsize::new(0));
    let count_clone = count.clone();

    // The first three requests are over quota, everything after succeeds.
    Mock::given(method("GET"))
        .and(path_regex(r"^/coins/.*"))
        .respond_with(move |req: &wiremock::Request| {
            if count_clone.fetch_add(1, Ordering::SeqCst) < 3 {
                ResponseTemplate::new(429).set_body_string("Too Many Requests")
            } else {
                ResponseTemplate::new(200).set_body_json(json!({"path": req.url.path()}))
            }
        })
        .mount(&server)
        .await;

    let items: Vec<WorkItem> = ["btc", "eth", "sol", "ada", "dot"]
        .iter()
        .map(|id| WorkItem::new(*id, format!("{}/coins/{}", server.uri(), id)))
        .collect();

    let limiter = Arc::new(LeakyBucket::new(100.0, Duration::from_secs(1)).unwrap());
    let driver = BatchDriver::new(limiter.clone(), fetcher(), BatchConfig::default());

    let report = driver.run(items, CancellationToken::new()).await.unwrap();

    assert_eq!(report.responses.len(), 5);
    assert_eq!(report.responses.item_count(), 5);
    assert_eq!(report.throttled, 3);
    assert!(report.failed.is_empty());
    assert!(report.abandoned.is_empty());
    assert_eq!(count.load(Ordering::SeqCst), 8);

    let btc: Vec<_> = report.responses.for_item("btc").collect();
    assert_eq!(btc.len(), 1);
    assert_eq!(btc[0].data, json!({"path": "/coins/btc"}));
    assert_eq!(limiter.waiting(), 0);
}

#[tokio::test]
async fn test_limiter_bounds_request_rate() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(12)
        .mount(&server)
        .await;

    let items: Vec<WorkItem> = (0..12)
        .map(|i| WorkItem::new(format!("item-{}", i), format!("{}/items/{}", server.uri(), i)))
        .collect();

    // 10 per second: the first 10 go straight through, the last 2 need 0.2s of drain.
    let limiter = Arc::new(LeakyBucket::new(10.0, Duration::from_secs(1)).unwrap());
    let driver = BatchDriver::new(limiter, fetcher(), BatchConfig::default());

    let start = Instant::now();
    let report = driver.run(items, CancellationToken::new()).await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(report.responses.len(), 12);
    assert!(elapsed >= Duration::from_millis(150), "elapsed {:?}", elapsed);
}
