//! Integration Tests for API Endpoints
//!
//! Tests full request/response cycle for each endpoint.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tiercache::{api::create_router, AppState, Config, MemoryStorage};
use tower::ServiceExt;

// == Helper Functions ==

async fn create_test_app() -> Router {
    create_app_with(Config::default()).await
}

async fn create_app_with(config: Config) -> Router {
    let state = AppState::open(config, None).await.unwrap();
    create_router(state)
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn put_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

// == SET Endpoint Tests ==

#[tokio::test]
async fn test_set_endpoint_success() {
    let app = create_test_app().await;

    let (status, json) = send(
        &app,
        put_json("/set", json!({"key": "test_key", "value": "test_value"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["message"].as_str().unwrap().contains("test_key"));
    assert_eq!(json["key"], "test_key");
}

#[tokio::test]
async fn test_set_accepts_structured_values() {
    let app = create_test_app().await;
    let value = json!({"name": "ada", "roles": ["admin"], "age": 36});

    let (status, _) = send(
        &app,
        put_json("/set", json!({"key": "user:1", "value": value, "ttlMs": 60000})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(&app, empty("GET", "/get/user:1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["value"], value);
}

#[tokio::test]
async fn test_set_empty_key_returns_400() {
    let app = create_test_app().await;

    let (status, json) = send(&app, put_json("/set", json!({"key": "", "value": 1}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("empty"));
}

#[tokio::test]
async fn test_set_oversized_value_returns_413() {
    let app = create_app_with(Config {
        memory_budget: 1_000,
        ..Config::default()
    })
    .await;

    let (status, json) = send(
        &app,
        put_json("/set", json!({"key": "big", "value": "x".repeat(500)})),
    )
    .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(json["error"].as_str().unwrap().contains("big"));

    let (status, _) = send(&app, empty("GET", "/get/big")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_set_malformed_json_is_rejected() {
    let app = create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/set")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"key": "k""#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

// == GET / HAS Endpoint Tests ==

#[tokio::test]
async fn test_get_missing_key_returns_404() {
    let app = create_test_app().await;

    let (status, json) = send(&app, empty("GET", "/get/nonexistent")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("nonexistent"));
}

#[tokio::test]
async fn test_expired_entry_returns_404() {
    let app = create_test_app().await;
    send(
        &app,
        put_json("/set", json!({"key": "short", "value": 1, "ttlMs": 20})),
    )
    .await;

    tokio::time::sleep(std::time::Duration::from_millis(60)).await;

    let (status, _) = send(&app, empty("GET", "/get/short")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, stats) = send(&app, empty("GET", "/stats")).await;
    assert_eq!(stats["misses"], 1);
    assert_eq!(stats["expirations"], 1);
}

#[tokio::test]
async fn test_has_endpoint() {
    let app = create_test_app().await;
    send(&app, put_json("/set", json!({"key": "present", "value": 1}))).await;

    let (status, json) = send(&app, empty("GET", "/has/present")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"key": "present", "exists": true}));

    let (_, json) = send(&app, empty("GET", "/has/absent")).await;
    assert_eq!(json["exists"], false);

    let (_, stats) = send(&app, empty("GET", "/stats")).await;
    assert_eq!(stats["hits"], 0);
    assert_eq!(stats["misses"], 0);
}

// == DELETE Endpoint Tests ==

#[tokio::test]
async fn test_delete_endpoint() {
    let app = create_test_app().await;
    send(&app, put_json("/set", json!({"key": "del_key", "value": "v"}))).await;

    let (status, json) = send(&app, empty("DELETE", "/del/del_key")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["message"].as_str().unwrap().contains("deleted"));

    let (status, _) = send(&app, empty("DELETE", "/del/del_key")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// == Tag Invalidation Tests ==

#[tokio::test]
async fn test_invalidate_endpoint() {
    let app = create_test_app().await;
    for (key, tags) in [
        ("u1", json!(["users"])),
        ("u2", json!(["users", "admins"])),
        ("p1", json!(["posts"])),
    ] {
        send(
            &app,
            put_json("/set", json!({"key": key, "value": 0, "tags": tags})),
        )
        .await;
    }

    let (status, json) = send(&app, empty("POST", "/invalidate/users")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"tag": "users", "removed": 2}));

    let (_, json) = send(&app, empty("POST", "/invalidate/users")).await;
    assert_eq!(json["removed"], 0);

    let (_, json) = send(&app, empty("GET", "/has/p1")).await;
    assert_eq!(json["exists"], true);
}

// == Clear / Sweep Tests ==

#[tokio::test]
async fn test_clear_endpoint_resets_stats() {
    let app = create_test_app().await;
    send(&app, put_json("/set", json!({"key": "k", "value": 1}))).await;
    send(&app, empty("GET", "/get/k")).await;

    let (status, _) = send(&app, empty("POST", "/clear")).await;
    assert_eq!(status, StatusCode::OK);

    let (_, stats) = send(&app, empty("GET", "/stats")).await;
    assert_eq!(stats["size"], 0);
    assert_eq!(stats["hits"], 0);
    assert_eq!(stats["sets"], 0);
    assert_eq!(stats["memoryUsage"], 0);
}

#[tokio::test]
async fn test_sweep_endpoint() {
    let app = create_test_app().await;
    send(
        &app,
        put_json("/set", json!({"key": "a", "value": 1, "ttlMs": 10})),
    )
    .await;
    send(&app, put_json("/set", json!({"key": "b", "value": 1}))).await;

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let (status, json) = send(&app, empty("POST", "/sweep")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json,
        json!({"expired": 1, "evicted": 0, "persisted": 0, "skipped": false})
    );
}

// == Stats / Health Tests ==

#[tokio::test]
async fn test_stats_endpoint_tracks_operations() {
    let app = create_test_app().await;
    send(&app, put_json("/set", json!({"key": "k", "value": "abc"}))).await;
    send(&app, empty("GET", "/get/k")).await;
    send(&app, empty("GET", "/get/k")).await;
    send(&app, empty("GET", "/get/missing")).await;

    let (status, stats) = send(&app, empty("GET", "/stats")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["size"], 1);
    assert_eq!(stats["sets"], 1);
    assert_eq!(stats["hits"], 2);
    assert_eq!(stats["misses"], 1);
    // JSON length of "abc" including quotes
    assert_eq!(stats["memoryUsage"], 5);
    assert_eq!(stats["memoryBudget"], Config::default().memory_budget);
    assert_eq!(stats["mirrored"], false);
    let rate = stats["hitRate"].as_f64().unwrap();
    assert!((rate - 2.0 / 3.0).abs() < 1e-9);
    assert!(stats["oldestEntryTimestamp"].is_u64());
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app().await;

    let (status, json) = send(&app, empty("GET", "/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert!(json["timestamp"].is_string());
}

// == Persistence Through the API ==

#[tokio::test]
async fn test_persistent_entries_survive_restart() {
    let storage = Arc::new(MemoryStorage::new());

    let state = AppState::open(Config::default(), Some(storage.clone()))
        .await
        .unwrap();
    let app = create_router(state.clone());
    send(
        &app,
        put_json(
            "/set",
            json!({"key": "keep", "value": {"v": 1}, "persistent": true, "tags": ["t"]}),
        ),
    )
    .await;
    send(&app, put_json("/set", json!({"key": "drop", "value": 2}))).await;
    state.cache.flush().await;
    drop(app);
    drop(state);

    let restarted = create_router(
        AppState::open(Config::default(), Some(storage))
            .await
            .unwrap(),
    );
    let (status, json) = send(&restarted, empty("GET", "/get/keep")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["value"], json!({"v": 1}));

    let (status, _) = send(&restarted, empty("GET", "/get/drop")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, json) = send(&restarted, empty("POST", "/invalidate/t")).await;
    assert_eq!(json["removed"], 1);
}
