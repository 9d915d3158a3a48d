//! End-to-end request tests: the full router over the in-memory store.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use tokio::sync::Notify;
use tower::ServiceExt;

use webmux::proxy::{router, ProxyState};
use webmux::remux::{RemuxError, Remuxer};
use webmux::store::{MemoryObjectStore, ObjectStoreError, StoreOp};

// ====== Test Helpers ======

const SOURCE_KEY: &str = "/wiki/4/40/abc.oga";
const FLAT_PATH: &str = "/wiki/4/40/abc.oga.webm";
const TREE_PATH: &str = "/wiki/transcoded/4/40/abc.oga/abc.oga.webm";
const REMUXED: &[u8] = b"remuxed-webm-bytes";

/// Remuxer that writes a fixed payload, counting invocations, with an
/// optional gate to hold builds open.
struct TestRemuxer {
    invocations: AtomicUsize,
    fail: bool,
    gate: Option<Arc<Notify>>,
}

impl TestRemuxer {
    fn new() -> Self {
        Self {
            invocations: AtomicUsize::new(0),
            fail: false,
            gate: None,
        }
    }

    fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Remuxer for TestRemuxer {
    async fn remux(&self, _input: &Path, output: &Path) -> Result<(), RemuxError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail {
            return Err(RemuxError::Executor {
                status: "exit status: 1".to_string(),
                diagnostic: "could not find codec parameters".to_string(),
            });
        }
        tokio::fs::write(output, REMUXED)
            .await
            .map_err(|err| RemuxError::Scratch(err.to_string()))
    }
}

fn fixture(remuxer: TestRemuxer) -> (Arc<MemoryObjectStore>, Arc<TestRemuxer>, Router) {
    let store = Arc::new(MemoryObjectStore::new());
    let remuxer = Arc::new(remuxer);
    let app = router(ProxyState::new(store.clone(), remuxer.clone()));
    (store, remuxer, app)
}

async fn request(app: &Router, method: Method, path: &str) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(path)
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

async fn get(app: &Router, path: &str) -> Response {
    request(app, Method::GET, path).await
}

async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

// ====== GET ======

#[tokio::test]
async fn test_rejects_non_derivative_paths_without_touching_the_store() {
    let (store, remuxer, app) = fixture(TestRemuxer::new());

    let response = get(&app, "/wiki/4/40/abc.oga").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_bytes(response).await,
        b"not a webm remux request: /wiki/4/40/abc.oga"
    );
    assert_eq!(store.calls(StoreOp::Exists), 0);
    assert_eq!(remuxer.invocations(), 0);
}

#[tokio::test]
async fn test_serves_cached_derivative_without_building() {
    let (store, remuxer, app) = fixture(TestRemuxer::new());
    store.insert(TREE_PATH, "audio/webm", REMUXED);

    let response = get(&app, TREE_PATH).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/webm");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "max-age=86400");
    assert_eq!(
        response.headers()[header::CONTENT_LENGTH],
        REMUXED.len().to_string().as_str()
    );
    assert_eq!(body_bytes(response).await, REMUXED);
    // One existence check, no source lookup, no build.
    assert_eq!(store.calls(StoreOp::Exists), 1);
    assert_eq!(remuxer.invocations(), 0);
}

#[tokio::test]
async fn test_builds_and_serves_on_cache_miss() {
    let (store, remuxer, app) = fixture(TestRemuxer::new());
    store.insert(SOURCE_KEY, "audio/ogg", &b"ogg-bytes"[..]);

    let response = get(&app, TREE_PATH).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, REMUXED);
    assert_eq!(remuxer.invocations(), 1);
    assert_eq!(store.content_type(TREE_PATH).as_deref(), Some("audio/webm"));

    // Now cached: the second request is a pure hit.
    let response = get(&app, TREE_PATH).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(remuxer.invocations(), 1);
    assert_eq!(store.calls(StoreOp::Download), 1);
}

#[tokio::test]
async fn test_flat_derivative_paths_build_from_their_source() {
    let (store, remuxer, app) = fixture(TestRemuxer::new());
    store.insert(SOURCE_KEY, "audio/ogg", &b"ogg-bytes"[..]);

    let response = get(&app, FLAT_PATH).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(remuxer.invocations(), 1);
    // The derivative is cached under the path it was requested by.
    assert!(store.contains(FLAT_PATH));
}

#[tokio::test]
async fn test_percent_encoded_names_resolve_decoded() {
    let (store, _remuxer, app) = fixture(TestRemuxer::new());
    store.insert("/wiki/a/ab/voice one.opus", "audio/ogg", &b"opus"[..]);

    let response = get(
        &app,
        "/wiki/transcoded/a/ab/voice%20one.opus/voice%20one.opus.webm",
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(store.contains("/wiki/transcoded/a/ab/voice one.opus/voice one.opus.webm"));
}

#[tokio::test]
async fn test_missing_source_is_404() {
    let (_store, remuxer, app) = fixture(TestRemuxer::new());

    let response = get(&app, TREE_PATH).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_bytes(response).await,
        b"original file not found: /wiki/4/40/abc.oga"
    );
    assert_eq!(remuxer.invocations(), 0);
}

#[tokio::test]
async fn test_malformed_tree_path_is_400() {
    let (store, _remuxer, app) = fixture(TestRemuxer::new());

    // Tree marker present but the self-referential doubling is violated.
    let response = get(&app, "/wiki/transcoded/4/40/abc.oga/other.oga.webm").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_bytes(response).await,
        b"invalid path format: /wiki/transcoded/4/40/abc.oga/other.oga.webm"
    );
    // Only the derivative lookup ran before the path was rejected.
    assert_eq!(store.calls(StoreOp::Exists), 1);
}

#[tokio::test]
async fn test_store_failure_maps_to_500() {
    let (store, _remuxer, app) = fixture(TestRemuxer::new());
    store.fail_with(
        StoreOp::Exists,
        ObjectStoreError::Timeout {
            op: StoreOp::Exists,
            key: TREE_PATH.to_string(),
            seconds: 30,
        },
    );

    let response = get(&app, TREE_PATH).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_bytes(response).await, b"Internal Server Error");
}

// ====== Concurrency ======

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_misses_share_one_build() {
    let gate = Arc::new(Notify::new());
    let (store, remuxer, app) = fixture(TestRemuxer::gated(gate.clone()));
    store.insert(SOURCE_KEY, "audio/ogg", &b"ogg-bytes"[..]);

    let mut requests = Vec::new();
    for _ in 0..8 {
        let app = app.clone();
        requests.push(tokio::spawn(async move {
            let request = Request::builder()
                .method(Method::GET)
                .uri(TREE_PATH)
                .body(Body::empty())
                .unwrap();
            app.oneshot(request).await.unwrap()
        }));
    }

    // Each request checks the derivative and then the source before it can
    // join the build; hold the gate until all eight have done both.
    let deadline = Instant::now() + Duration::from_secs(2);
    while store.calls(StoreOp::Exists) < 16 {
        assert!(
            Instant::now() < deadline,
            "requests never reached the build"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    gate.notify_one();

    for request in requests {
        let response = request.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, REMUXED);
    }
    assert_eq!(remuxer.invocations(), 1);
    assert_eq!(store.calls(StoreOp::Upload), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_build_reaches_every_waiter_and_is_not_cached() {
    let gate = Arc::new(Notify::new());
    let (store, remuxer, app) = fixture(TestRemuxer {
        fail: true,
        ..TestRemuxer::gated(gate.clone())
    });
    store.insert(SOURCE_KEY, "audio/ogg", &b"ogg-bytes"[..]);

    let mut requests = Vec::new();
    for _ in 0..4 {
        let app = app.clone();
        requests.push(tokio::spawn(async move {
            let request = Request::builder()
                .method(Method::GET)
                .uri(TREE_PATH)
                .body(Body::empty())
                .unwrap();
            app.oneshot(request).await.unwrap()
        }));
    }

    let deadline = Instant::now() + Duration::from_secs(2);
    while store.calls(StoreOp::Exists) < 8 {
        assert!(
            Instant::now() < deadline,
            "requests never reached the build"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    gate.notify_one();

    for request in requests {
        let response = request.await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_bytes(response).await, b"Internal Server Error");
    }
    assert_eq!(remuxer.invocations(), 1);
    assert!(!store.contains(TREE_PATH));

    // The failure was not cached; the next request starts a fresh build.
    gate.notify_one();
    let response = get(&app, TREE_PATH).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(remuxer.invocations(), 2);
}

// ====== DELETE ======

#[tokio::test]
async fn test_delete_canonicalizes_source_paths_to_the_transcoded_key() {
    let (store, _remuxer, app) = fixture(TestRemuxer::new());
    store.insert(TREE_PATH, "audio/webm", REMUXED);

    let response = request(&app, Method::DELETE, SOURCE_KEY).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_bytes(response).await,
        b"Transcoded file deleted successfully"
    );
    assert!(!store.contains(TREE_PATH));
}

#[tokio::test]
async fn test_delete_accepts_the_transcoded_path_directly() {
    let (store, _remuxer, app) = fixture(TestRemuxer::new());
    store.insert(TREE_PATH, "audio/webm", REMUXED);

    let response = request(&app, Method::DELETE, TREE_PATH).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(!store.contains(TREE_PATH));
}

#[tokio::test]
async fn test_delete_of_absent_derivative_is_404_and_deletes_nothing() {
    let (store, _remuxer, app) = fixture(TestRemuxer::new());

    let response = request(&app, Method::DELETE, SOURCE_KEY).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_bytes(response).await,
        b"transcoded file not found: /wiki/transcoded/4/40/abc.oga/abc.oga.webm"
    );
    assert_eq!(store.calls(StoreOp::Delete), 0);
}

#[tokio::test]
async fn test_delete_with_too_few_segments_is_400() {
    let (store, _remuxer, app) = fixture(TestRemuxer::new());

    let response = request(&app, Method::DELETE, "/abc.oga").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(store.calls(StoreOp::Exists), 0);
}

#[tokio::test]
async fn test_delete_of_non_remux_target_is_400() {
    let (_store, _remuxer, app) = fixture(TestRemuxer::new());

    // Canonicalizes to .../abc.ogg/abc.ogg.webm, which is not a remux target.
    let response = request(&app, Method::DELETE, "/wiki/4/40/abc.ogg").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_failure_maps_to_500_with_delete_body() {
    let (store, _remuxer, app) = fixture(TestRemuxer::new());
    store.insert(TREE_PATH, "audio/webm", REMUXED);
    store.fail_with(
        StoreOp::Delete,
        ObjectStoreError::Request {
            op: StoreOp::Delete,
            key: TREE_PATH.to_string(),
            message: "access denied".to_string(),
        },
    );

    let response = request(&app, Method::DELETE, TREE_PATH).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_bytes(response).await,
        b"Failed to delete transcoded file"
    );
}

#[tokio::test]
async fn test_deleted_derivative_rebuilds_on_next_get() {
    let (store, remuxer, app) = fixture(TestRemuxer::new());
    store.insert(SOURCE_KEY, "audio/ogg", &b"ogg-bytes"[..]);
    store.insert(TREE_PATH, "audio/webm", &b"stale"[..]);

    let response = request(&app, Method::DELETE, SOURCE_KEY).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&app, TREE_PATH).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, REMUXED);
    assert_eq!(remuxer.invocations(), 1);
}

// ====== Methods and unroutable paths ======

#[tokio::test]
async fn test_other_methods_are_405() {
    let (_store, _remuxer, app) = fixture(TestRemuxer::new());

    let response = request(&app, Method::POST, TREE_PATH).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

    let response = request(&app, Method::PUT, "/").await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_head_is_405_and_never_builds() {
    let (store, remuxer, app) = fixture(TestRemuxer::new());
    store.insert(SOURCE_KEY, "audio/ogg", &b"ogg-bytes"[..]);
    store.insert(TREE_PATH, "audio/webm", REMUXED);

    // Cached derivative: rejected, not served.
    let response = request(&app, Method::HEAD, TREE_PATH).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body_bytes(response).await, b"method not allowed");

    // Cache miss: rejected before any store or build work.
    let response = request(&app, Method::HEAD, FLAT_PATH).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(store.calls(StoreOp::Exists), 0);
    assert_eq!(remuxer.invocations(), 0);
}

#[tokio::test]
async fn test_root_path_is_rejected_as_non_derivative() {
    let (store, _remuxer, app) = fixture(TestRemuxer::new());

    let response = get(&app, "/").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_bytes(response).await, b"not a webm remux request: /");
    assert_eq!(store.calls(StoreOp::Exists), 0);
}
