//! Integration tests for the sync lifecycle over HTTP: initial sync paging
//! and idempotence, flag-push ordering, retry classification, and the two
//! networked transports.
//!
//! Each test runs a real engine against an in-memory cache and a wiremock
//! server standing in for the News service.

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lede::api::{ApiError, CredentialsApi, SessionApi};
use lede::storage::Database;
use lede::sync::{job, job::JobOutcome, SyncEngine};

fn feed_json(id: i64) -> serde_json::Value {
    json!({
        "id": id,
        "title": format!("Feed {id}"),
        "selfLink": format!("https://feed{id}.example.com/rss"),
        "alternateLink": format!("https://feed{id}.example.com"),
    })
}

fn entry_json(id: i64, feed_id: i64, published: i64, read: bool) -> serde_json::Value {
    json!({
        "id": id,
        "feedId": feed_id,
        "title": format!("Entry {id}"),
        "published": published,
        "summary": "body",
        "read": read,
        "bookmarked": false,
    })
}

async fn credentials_engine(server: &MockServer) -> SyncEngine {
    let api = CredentialsApi::new(
        Url::parse(&server.uri()).unwrap(),
        "alice".to_string(),
        SecretString::from("hunter2".to_string()),
    )
    .unwrap();
    let db = Database::open(":memory:").await.unwrap();
    SyncEngine::new(db, std::sync::Arc::new(api))
}

/// Mount a healthy remote: one feed, `entries` split across offset pages of
/// 100, empty beyond the data.
async fn mount_healthy(server: &MockServer, entries: Vec<serde_json::Value>) {
    Mock::given(method("GET"))
        .and(path("/feeds"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "feeds": [feed_json(1)] })))
        .mount(server)
        .await;

    let mut offset = 0;
    while offset <= entries.len() {
        let page: Vec<_> = entries.iter().skip(offset).take(100).cloned().collect();
        Mock::given(method("GET"))
            .and(path("/entries"))
            .and(query_param("offset", offset.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "entries": page })))
            .mount(server)
            .await;
        offset += 100;
    }

    // Incremental pulls carry `since` instead of `offset`; they fall through
    // the page mocks above to this one.
    Mock::given(method("GET"))
        .and(path("/entries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "entries": [] })))
        .mount(server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/entries/flags"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

// ============================================================================
// Initial Sync
// ============================================================================

#[tokio::test]
async fn initial_sync_pages_through_the_full_dataset() {
    let server = MockServer::start().await;
    let entries: Vec<_> = (1..=142).map(|i| entry_json(i, 1, 1700000000 + i, false)).collect();
    mount_healthy(&server, entries).await;

    let engine = credentials_engine(&server).await;
    engine.perform_initial_sync().await.unwrap();

    let status = engine.status().await.unwrap();
    assert_eq!(status.feeds, 1);
    assert_eq!(status.entries, 142);
    assert!(status.initial_sync_completed);
}

#[tokio::test]
async fn interrupted_initial_sync_resumes_without_duplicates() {
    let server = MockServer::start().await;

    // First attempt: feeds and the first entry page work, the second page
    // errors out.
    Mock::given(method("GET"))
        .and(path("/feeds"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "feeds": [feed_json(1)] })))
        .mount(&server)
        .await;
    let first_page: Vec<_> = (1..=100).map(|i| entry_json(i, 1, 1700000000 + i, false)).collect();
    Mock::given(method("GET"))
        .and(path("/entries"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "entries": first_page })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/entries"))
        .and(query_param("offset", "100"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let engine = credentials_engine(&server).await;
    let err = engine.perform_initial_sync().await.unwrap_err();
    assert!(err.is_transient());

    let status = engine.status().await.unwrap();
    assert!(!status.initial_sync_completed, "flag must stay false");
    assert_eq!(status.entries, 100, "committed prefix survives");

    // The remote recovers; the same call resumes and converges.
    server.reset().await;
    let entries: Vec<_> = (1..=142).map(|i| entry_json(i, 1, 1700000000 + i, false)).collect();
    mount_healthy(&server, entries).await;

    engine.perform_initial_sync().await.unwrap();

    let status = engine.status().await.unwrap();
    assert!(status.initial_sync_completed);
    assert_eq!(status.entries, 142, "re-fetched rows upsert, never duplicate");
}

// ============================================================================
// Flag Push Ordering
// ============================================================================

#[tokio::test]
async fn sync_pushes_flags_before_any_pull() {
    let server = MockServer::start().await;
    mount_healthy(&server, vec![entry_json(1, 1, 1700000001, false)]).await;

    let engine = credentials_engine(&server).await;
    engine.perform_initial_sync().await.unwrap();
    engine.database().set_read(1, true).await.unwrap();

    engine.sync().await.unwrap();

    // The wire saw: PUT flags strictly before the feed/entry pulls of the
    // same sync pass.
    let requests = server.received_requests().await.unwrap();
    let flags_at = requests
        .iter()
        .position(|r| r.url.path() == "/entries/flags")
        .expect("flag push must hit the wire");
    let body: serde_json::Value = serde_json::from_slice(&requests[flags_at].body).unwrap();
    assert_eq!(body["read"], json!([1]));
    assert!(
        requests[flags_at + 1..]
            .iter()
            .any(|r| r.url.path() == "/feeds"),
        "pull follows the push"
    );

    assert_eq!(engine.status().await.unwrap().pending_flags, 0);
}

#[tokio::test]
async fn failed_flag_push_is_retried_on_next_sync() {
    let server = MockServer::start().await;
    mount_healthy(&server, vec![entry_json(1, 1, 1700000001, false)]).await;

    let engine = credentials_engine(&server).await;
    engine.perform_initial_sync().await.unwrap();

    // Flags endpoint starts failing.
    server.reset().await;
    Mock::given(method("PUT"))
        .and(path("/entries/flags"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    engine.database().set_read(1, true).await.unwrap();
    let err = engine.sync_entry_flags().await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(engine.status().await.unwrap().pending_flags, 1);

    // Endpoint recovers; the same delta goes out on the next push.
    server.reset().await;
    Mock::given(method("PUT"))
        .and(path("/entries/flags"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    engine.sync_entry_flags().await.unwrap();
    assert_eq!(engine.status().await.unwrap().pending_flags, 0);
}

// ============================================================================
// Retry Classification
// ============================================================================

#[tokio::test]
async fn job_retries_initial_sync_on_any_failure() {
    let server = MockServer::start().await;
    // Even a permanent-looking auth failure is Retry while uninitialized:
    // the first snapshot must eventually land.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let engine = credentials_engine(&server).await;
    assert_eq!(job::run(&engine).await, JobOutcome::Retry);
}

#[tokio::test]
async fn job_maps_auth_failure_to_permanent_after_initialization() {
    let server = MockServer::start().await;
    mount_healthy(&server, vec![]).await;

    let engine = credentials_engine(&server).await;
    assert_eq!(job::run(&engine).await, JobOutcome::Success);

    server.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    assert_eq!(job::run(&engine).await, JobOutcome::Failure);
}

#[tokio::test]
async fn job_maps_server_errors_to_retry_after_initialization() {
    let server = MockServer::start().await;
    mount_healthy(&server, vec![]).await;

    let engine = credentials_engine(&server).await;
    assert_eq!(job::run(&engine).await, JobOutcome::Success);

    server.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    assert_eq!(job::run(&engine).await, JobOutcome::Retry);
}

// ============================================================================
// Transports
// ============================================================================

#[tokio::test]
async fn session_transport_logs_in_once_then_syncs() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("set-cookie", "lede_session=abc; Path=/"),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_healthy(&server, vec![entry_json(1, 1, 1700000001, false)]).await;

    let api = SessionApi::connect(
        Url::parse(&server.uri()).unwrap(),
        "alice",
        &SecretString::from("hunter2".to_string()),
    )
    .await
    .unwrap();

    let db = Database::open(":memory:").await.unwrap();
    let engine = SyncEngine::new(db, std::sync::Arc::new(api));
    engine.perform_initial_sync().await.unwrap();

    assert_eq!(engine.status().await.unwrap().entries, 1);
}

#[tokio::test]
async fn session_transport_surfaces_rejected_login_as_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = SessionApi::connect(
        Url::parse(&server.uri()).unwrap(),
        "alice",
        &SecretString::from("wrong".to_string()),
    )
    .await;

    assert!(matches!(result, Err(ApiError::Auth)));
}

#[tokio::test]
async fn credentials_transport_sends_basic_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feeds"))
        .and(wiremock::matchers::basic_auth("alice", "hunter2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "feeds": [] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/entries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "entries": [] })))
        .mount(&server)
        .await;

    let engine = credentials_engine(&server).await;
    engine.perform_initial_sync().await.unwrap();
}

#[tokio::test]
async fn malformed_payload_is_a_permanent_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feeds"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json at all"))
        .mount(&server)
        .await;

    let engine = credentials_engine(&server).await;
    let err = engine.perform_initial_sync().await.unwrap_err();
    assert!(!err.is_transient());
}
