//! Integration tests for the crawl engine
//!
//! These tests drive full sessions either against a wiremock server or against a
//! scripted transport that replays canned responses.

use async_trait::async_trait;
use chrono::NaiveDate;
use feed_trawl::crawler::{
    CommandSigner, CrawlEngine, CrawlRequest, CrawlWindow, DayBoundary, DedupSync, DelayRange,
    DiagnosticSink, HttpTransport, PageFetcher, PassthroughSigner, RawResponse, ReqwestTransport,
    RetryPolicy, RetryScheduler, SignalRules, TransportError,
};
use feed_trawl::endpoint::{EndpointDescriptor, EndpointKind};
use feed_trawl::state::{CrawlLimits, TerminationReason};
use feed_trawl::storage::{DedupStore, SqliteStorage};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const POST_PATH: &str = "/aweme/v1/web/aweme/post/";

/// Replays queued responses in order, then answers 503
#[derive(Default)]
struct ScriptedTransport {
    responses: Mutex<VecDeque<RawResponse>>,
    urls: Mutex<Vec<String>>,
    cancel_after_first: Option<CancellationToken>,
}

impl ScriptedTransport {
    fn new(bodies: Vec<RawResponse>) -> Self {
        Self {
            responses: Mutex::new(bodies.into()),
            ..Self::default()
        }
    }

    fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_after_first = Some(token);
        self
    }

    fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(
        &self,
        url: &str,
        _headers: &[(String, String)],
        _timeout: Duration,
    ) -> Result<RawResponse, TransportError> {
        self.urls.lock().unwrap().push(url.to_string());
        if let Some(token) = &self.cancel_after_first {
            token.cancel();
        }
        let next = self.responses.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| RawResponse::new(503, "")))
    }
}

fn item(id: &str, create_time: i64) -> Value {
    json!({ "aweme_id": id, "create_time": create_time, "is_top": 0 })
}

fn page_body(items: Vec<Value>, has_more: bool, cursor: i64) -> String {
    json!({
        "status_code": 0,
        "aweme_list": items,
        "has_more": if has_more { 1 } else { 0 },
        "max_cursor": cursor,
    })
    .to_string()
}

fn ok_page(ids: &[&str], has_more: bool, cursor: i64) -> RawResponse {
    let items = ids.iter().map(|id| item(id, 1_700_000_000)).collect();
    RawResponse::new(200, page_body(items, has_more, cursor))
}

fn quiet_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_timeout: Duration::from_secs(5),
        timeout_step: Duration::ZERO,
        jitter: DelayRange::zero(),
        penalty: DelayRange::zero(),
    }
}

fn create_engine(fetcher: PageFetcher, max_attempts: u32, base_url: &str) -> CrawlEngine {
    CrawlEngine::new(
        fetcher,
        RetryScheduler::new(quiet_policy(max_attempts)),
        Arc::new(PassthroughSigner),
        base_url,
    )
    .with_page_delay(DelayRange::zero())
}

fn scripted_engine(transport: Arc<ScriptedTransport>, max_attempts: u32) -> CrawlEngine {
    let fetcher = PageFetcher::new(transport, SignalRules::default());
    create_engine(fetcher, max_attempts, "https://feed.test")
}

fn post_request(target: &str) -> CrawlRequest {
    CrawlRequest::new(target, EndpointDescriptor::for_kind(EndpointKind::Post))
}

#[tokio::test]
async fn test_full_crawl_over_http() {
    let server = MockServer::start().await;

    let first: Vec<Value> = (1..=5).map(|i| item(&i.to_string(), 1_700_000_000)).collect();
    let second: Vec<Value> = (6..=8).map(|i| item(&i.to_string(), 1_700_000_000)).collect();

    Mock::given(method("GET"))
        .and(path(POST_PATH))
        .and(query_param("sec_user_id", "user1"))
        .and(query_param("max_cursor", "0"))
        .and(header_exists("user-agent"))
        .and(header_exists("cookie"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page_body(first, true, 10)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(POST_PATH))
        .and(query_param("max_cursor", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page_body(second, false, 20)))
        .expect(1)
        .mount(&server)
        .await;

    let client = reqwest::Client::new();
    let fetcher = PageFetcher::new(Arc::new(ReqwestTransport::new(client)), SignalRules::default());
    let engine = create_engine(fetcher, 3, &server.uri());

    let outcome = engine
        .run(post_request("user1"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.reason, TerminationReason::Complete);
    assert_eq!(
        outcome.record_ids(),
        vec!["1", "2", "3", "4", "5", "6", "7", "8"]
    );
    assert_eq!(outcome.fetch_calls, 2);
    assert_eq!(outcome.pages, 2);
    assert_eq!(outcome.degraded, 0);
}

#[tokio::test]
async fn test_failing_first_page_yields_no_data() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(POST_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let client = reqwest::Client::new();
    let fetcher = PageFetcher::new(Arc::new(ReqwestTransport::new(client)), SignalRules::default());
    let engine = create_engine(fetcher, 3, &server.uri());

    let outcome = engine
        .run(post_request("user1"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.reason, TerminationReason::NoData);
    assert!(outcome.records.is_empty());
    assert_eq!(outcome.fetch_calls, 3);
}

#[tokio::test]
async fn test_opaque_body_is_captured() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(POST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>verify you are human</html>"))
        .mount(&server)
        .await;

    let sink = DiagnosticSink::new(dir.path(), 16);
    let expected = sink.path_for("post:user1_cursor_0");

    let client = reqwest::Client::new();
    let fetcher = PageFetcher::new(Arc::new(ReqwestTransport::new(client)), SignalRules::default())
        .with_diagnostics(sink);
    let engine = create_engine(fetcher, 1, &server.uri());

    let outcome = engine
        .run(post_request("user1"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.reason, TerminationReason::NoData);
    assert_eq!(
        expected.file_name().unwrap().to_str().unwrap(),
        "debug_post_user1_cursor_0.txt"
    );
    let captured = std::fs::read_to_string(&expected).unwrap();
    assert_eq!(captured, "<html>verify you");
}

#[tokio::test]
async fn test_failure_streak_stops_degraded_crawl() {
    let transport = Arc::new(ScriptedTransport::new(vec![ok_page(
        &["a", "b"],
        true,
        10,
    )]));
    let engine = scripted_engine(transport.clone(), 2);

    let outcome = engine
        .run(post_request("user1"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.reason, TerminationReason::FailureStreak);
    assert_eq!(outcome.record_ids(), vec!["a", "b"]);
    assert_eq!(outcome.degraded, 3);
    assert_eq!(outcome.pages, 4);
    assert_eq!(outcome.fetch_calls, 7);

    // Pages without a usable cursor move forward by page_size * step
    let urls = transport.urls();
    assert!(urls[1].contains("max_cursor=10&"));
    assert!(urls[3].contains("max_cursor=350010&"));
    assert!(urls[5].contains("max_cursor=700010&"));
}

#[tokio::test]
async fn test_cursor_hint_from_rejected_page() {
    let throttled = RawResponse::new(
        200,
        json!({"status_code": 8, "status_msg": "too many requests", "max_cursor": 20}).to_string(),
    );
    let transport = Arc::new(ScriptedTransport::new(vec![
        ok_page(&["a"], true, 10),
        throttled.clone(),
        throttled,
        ok_page(&["c"], false, 30),
    ]));
    let engine = scripted_engine(transport.clone(), 2);

    let outcome = engine
        .run(post_request("user1"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.reason, TerminationReason::Complete);
    assert_eq!(outcome.record_ids(), vec!["a", "c"]);
    assert_eq!(outcome.degraded, 1);
    assert_eq!(outcome.fetch_calls, 4);
    assert!(transport.urls()[3].contains("max_cursor=20&"));
}

#[tokio::test]
async fn test_retry_recovers_within_page() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        RawResponse::new(200, ""),
        RawResponse::new(200, r#"{"status_code":0}"#),
        ok_page(&["a", "b"], false, 0),
    ]));
    let engine = scripted_engine(transport.clone(), 5);

    let outcome = engine
        .run(post_request("user1"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.reason, TerminationReason::Complete);
    assert_eq!(outcome.record_ids(), vec!["a", "b"]);
    assert_eq!(outcome.fetch_calls, 3);
    assert_eq!(outcome.degraded, 0);
}

#[tokio::test]
async fn test_incremental_sync_stops_at_known_item() {
    let store = Arc::new(SqliteStorage::open_in_memory().unwrap());
    store.insert("post:user1", "old", &json!({})).unwrap();

    let transport = Arc::new(ScriptedTransport::new(vec![ok_page(
        &["new1", "new2", "old", "new3"],
        true,
        10,
    )]));
    let engine = scripted_engine(transport.clone(), 1).with_dedup(DedupSync::new(store.clone()));

    let outcome = engine
        .run(
            post_request("user1").with_increase(true),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.reason, TerminationReason::SyncBoundary);
    assert_eq!(outcome.record_ids(), vec!["new1", "new2"]);
    assert!(store.exists("post:user1", "new1").unwrap());
    assert!(!store.exists("post:user1", "new3").unwrap());
    assert_eq!(transport.urls().len(), 1);
}

#[tokio::test]
async fn test_second_run_only_collects_new_items() {
    let store = Arc::new(SqliteStorage::open_in_memory().unwrap());

    let first = Arc::new(ScriptedTransport::new(vec![ok_page(
        &["3", "2", "1"],
        false,
        0,
    )]));
    let engine = scripted_engine(first, 1).with_dedup(DedupSync::new(store.clone()));
    let outcome = engine
        .run(
            post_request("user1").with_increase(true),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.record_ids(), vec!["3", "2", "1"]);

    let second = Arc::new(ScriptedTransport::new(vec![ok_page(
        &["4", "3", "2", "1"],
        false,
        0,
    )]));
    let engine = scripted_engine(second, 1).with_dedup(DedupSync::new(store.clone()));
    let outcome = engine
        .run(
            post_request("user1").with_increase(true),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.reason, TerminationReason::SyncBoundary);
    assert_eq!(outcome.record_ids(), vec!["4"]);
    assert_eq!(store.count_total().unwrap(), 4);
}

#[tokio::test]
async fn test_pinned_known_item_does_not_stop_sync() {
    let store = Arc::new(SqliteStorage::open_in_memory().unwrap());
    store.insert("post:user1", "pinned", &json!({})).unwrap();

    let mut pinned = item("pinned", 1_600_000_000);
    pinned["is_top"] = json!(1);
    let body = page_body(vec![pinned, item("fresh", 1_700_000_000)], false, 0);

    let transport = Arc::new(ScriptedTransport::new(vec![RawResponse::new(200, body)]));
    let engine = scripted_engine(transport, 1).with_dedup(DedupSync::new(store));

    let outcome = engine
        .run(
            post_request("user1").with_increase(true),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.reason, TerminationReason::Complete);
    assert_eq!(outcome.record_ids(), vec!["pinned", "fresh"]);
}

#[tokio::test]
async fn test_quantity_bound() {
    let transport = Arc::new(ScriptedTransport::new(vec![ok_page(
        &["1", "2", "3", "4", "5"],
        true,
        10,
    )]));
    let engine = scripted_engine(transport.clone(), 1);

    let request = post_request("user1").with_limits(CrawlLimits {
        max_items: 3,
        ..CrawlLimits::default()
    });
    let outcome = engine.run(request, &CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.reason, TerminationReason::QuantityReached);
    assert_eq!(outcome.record_ids(), vec!["1", "2", "3"]);
    assert_eq!(transport.urls().len(), 1);
}

#[tokio::test]
async fn test_page_limit() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        ok_page(&["1"], true, 10),
        ok_page(&["2"], true, 20),
        ok_page(&["3"], true, 30),
    ]));
    let engine = scripted_engine(transport, 1);

    let request = post_request("user1").with_limits(CrawlLimits {
        max_pages: 2,
        ..CrawlLimits::default()
    });
    let outcome = engine.run(request, &CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.reason, TerminationReason::PageLimit);
    assert_eq!(outcome.record_ids(), vec!["1", "2"]);
}

#[tokio::test]
async fn test_date_window_filters_items() {
    // 2024-01-15 01:00, 2023-12-31 12:00 and 2024-02-01 00:00 UTC
    let body = page_body(
        vec![
            item("feb", 1_706_745_600),
            item("jan", 1_705_280_400),
            item("dec", 1_704_024_000),
        ],
        false,
        0,
    );
    let transport = Arc::new(ScriptedTransport::new(vec![RawResponse::new(200, body)]));
    let engine = scripted_engine(transport, 1);

    let window = CrawlWindow::new(
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
    );
    let request = post_request("user1").with_window(window, DayBoundary::Utc);
    let outcome = engine.run(request, &CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.reason, TerminationReason::Complete);
    assert_eq!(outcome.record_ids(), vec!["jan"]);
    assert_eq!(outcome.filtered, 2);
}

#[tokio::test]
async fn test_malformed_items_are_skipped() {
    let body = page_body(
        vec![json!({"create_time": 1}), json!("junk"), item("ok", 1_700_000_000)],
        false,
        0,
    );
    let transport = Arc::new(ScriptedTransport::new(vec![RawResponse::new(200, body)]));
    let engine = scripted_engine(transport, 1);

    let outcome = engine
        .run(post_request("user1"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.record_ids(), vec!["ok"]);
    assert_eq!(outcome.malformed, 2);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let transport = Arc::new(ScriptedTransport::new(vec![ok_page(&["1"], false, 0)]));
    let engine = scripted_engine(transport.clone(), 3);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = engine.run(post_request("user1"), &cancel).await.unwrap();

    assert_eq!(outcome.reason, TerminationReason::Cancelled);
    assert!(outcome.records.is_empty());
    assert_eq!(outcome.fetch_calls, 0);
    assert!(transport.urls().is_empty());
}

#[tokio::test]
async fn test_cancellation_keeps_collected_records() {
    let cancel = CancellationToken::new();
    let transport = Arc::new(
        ScriptedTransport::new(vec![ok_page(&["1", "2"], true, 10), ok_page(&["3"], false, 0)])
            .cancelling(cancel.clone()),
    );
    let engine = scripted_engine(transport.clone(), 3);

    let outcome = engine.run(post_request("user1"), &cancel).await.unwrap();

    assert_eq!(outcome.reason, TerminationReason::Cancelled);
    assert_eq!(outcome.record_ids(), vec!["1", "2"]);
    assert_eq!(transport.urls().len(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn test_cancellation_interrupts_slow_signer() {
    let transport = Arc::new(ScriptedTransport::new(vec![ok_page(&["1"], false, 0)]));
    let fetcher = PageFetcher::new(transport.clone(), SignalRules::default());
    let signer = CommandSigner::new("sh", vec!["-c".to_string(), "sleep 5; cat".to_string()]);
    let engine = CrawlEngine::new(
        fetcher,
        RetryScheduler::new(quiet_policy(3)),
        Arc::new(signer),
        "https://feed.test",
    )
    .with_page_delay(DelayRange::zero());

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });
    }

    let started = Instant::now();
    let outcome = engine.run(post_request("user1"), &cancel).await.unwrap();

    assert_eq!(outcome.reason, TerminationReason::Cancelled);
    assert!(outcome.records.is_empty());
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(transport.urls().is_empty());
}

#[tokio::test]
async fn test_parallel_sessions_share_one_engine() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        ok_page(&["x"], false, 0),
        ok_page(&["y"], false, 0),
    ]));
    let engine = Arc::new(scripted_engine(transport.clone(), 1));
    let cancel = CancellationToken::new();

    let mut sessions = tokio::task::JoinSet::new();
    for target in ["alice", "bob"] {
        let engine = Arc::clone(&engine);
        let cancel = cancel.clone();
        sessions.spawn(async move { engine.run(post_request(target), &cancel).await });
    }

    let mut collected = Vec::new();
    while let Some(joined) = sessions.join_next().await {
        let outcome = joined.unwrap().unwrap();
        assert_eq!(outcome.reason, TerminationReason::Complete);
        collected.extend(outcome.records.into_iter().map(|r| r.id));
    }
    collected.sort();

    assert_eq!(collected, vec!["x", "y"]);
    assert_eq!(transport.urls().len(), 2);
}

#[tokio::test]
async fn test_mix_list_uses_its_own_fields() {
    let body = json!({
        "status_code": 0,
        "mix_infos": [{"mix_id": "m1", "create_time": 1_700_000_000}],
        "has_more": false,
        "cursor": 0,
    })
    .to_string();
    let transport = Arc::new(ScriptedTransport::new(vec![RawResponse::new(200, body)]));
    let engine = scripted_engine(transport.clone(), 1);

    let request = CrawlRequest::new("user1", EndpointDescriptor::for_kind(EndpointKind::MixList));
    let outcome = engine.run(request, &CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.record_ids(), vec!["m1"]);
    assert!(transport.urls()[0].starts_with("https://feed.test/aweme/v1/web/mix/list/?sec_user_id=user1&count=35&cursor=0"));
}
