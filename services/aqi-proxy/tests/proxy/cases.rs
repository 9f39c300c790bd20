use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use aqi_proxy::cache::SensorCache;
use aqi_proxy::clock::ManualClock;
use aqi_proxy::rate_limit::RateLimiter;
use aqi_proxy::upstream::UpstreamClient;
use aqi_proxy::{ProxyState, build_router};
use axum::{
    Json, Router,
    body::{Body, to_bytes},
    extract::{Path, State},
    http::{HeaderMap, Request, StatusCode},
    response::IntoResponse,
    routing::get,
};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tower::util::ServiceExt; // for `oneshot`

const API_KEY: &str = "test-key";

#[derive(Clone, Default)]
struct Upstream {
    hits: Arc<AtomicUsize>,
}

async fn upstream_sensor(
    State(upstream): State<Upstream>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> impl IntoResponse {
    upstream.hits.fetch_add(1, Ordering::SeqCst);
    if headers.get("x-api-key").and_then(|v| v.to_str().ok()) != Some(API_KEY) {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"error": "ApiKeyInvalidError"})),
        );
    }
    match id {
        404 => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "NotFoundError"})),
        ),
        777 => (
            StatusCode::OK,
            Json(json!({"sensor": {"sensor_index": 777, "name": "No optics"}})),
        ),
        _ => (
            StatusCode::OK,
            Json(json!({
                "api_version": "V1.0.11",
                "sensor": {
                    "sensor_index": id,
                    "name": "Rooftop",
                    "pm2.5": 12.0,
                    "temperature": 68,
                    "humidity": 33
                }
            })),
        ),
    }
}

async fn spawn_upstream() -> (String, Upstream, JoinHandle<()>) {
    let upstream = Upstream::default();
    let router = Router::new()
        .route("/v1/sensors/:id", get(upstream_sensor))
        .with_state(upstream.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{addr}"), upstream, handle)
}

fn proxy_with(
    base_url: &str,
    api_key: &str,
    clock: &ManualClock,
    trust_forwarded: bool,
) -> Router {
    let upstream = UpstreamClient::new(reqwest::Client::new(), base_url, "X-API-Key", api_key);
    let state = ProxyState::with_clock(
        RateLimiter::default(),
        SensorCache::default(),
        upstream,
        Arc::new(clock.clone()),
    )
    .with_trusted_forwarding(trust_forwarded);
    build_router(Arc::new(state))
}

// Clients are told apart by x-forwarded-for here, as behind a reverse proxy.
fn proxy(base_url: &str, api_key: &str, clock: &ManualClock) -> Router {
    proxy_with(base_url, api_key, clock, true)
}

fn get_from(uri: &str, client_ip: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-forwarded-for", client_ip)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthz_ok() {
    let app = proxy("http://127.0.0.1:9", API_KEY, &ManualClock::new());
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-request-id"));
    assert_eq!(json_body(resp).await["status"], "ok");
}

#[tokio::test]
async fn proxies_upstream_payload() {
    let (base, upstream, handle) = spawn_upstream().await;
    let app = proxy(&base, API_KEY, &ManualClock::new());

    let resp = app
        .oneshot(get_from("/api/sensors/131075", "203.0.113.1"))
        .await
        .unwrap();
    handle.abort();

    assert_eq!(resp.status(), StatusCode::OK);
    let v = json_body(resp).await;
    assert_eq!(v["sensor"]["sensor_index"], 131075);
    assert_eq!(v["sensor"]["pm2.5"], 12.0);
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cache_serves_repeat_requests_until_ttl() {
    let (base, upstream, handle) = spawn_upstream().await;
    let clock = ManualClock::new();
    let app = proxy(&base, API_KEY, &clock);

    let first = app
        .clone()
        .oneshot(get_from("/api/sensors/42", "203.0.113.2"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first = json_body(first).await;

    clock.advance(Duration::from_secs(29 * 60));
    let second = app
        .clone()
        .oneshot(get_from("/api/sensors/42", "203.0.113.3"))
        .await
        .unwrap();
    assert_eq!(json_body(second).await, first);
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 1);

    clock.advance(Duration::from_secs(60));
    let third = app
        .oneshot(get_from("/api/sensors/42", "203.0.113.4"))
        .await
        .unwrap();
    handle.abort();
    assert_eq!(third.status(), StatusCode::OK);
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn eleventh_request_in_window_is_rejected() {
    let (base, _upstream, handle) = spawn_upstream().await;
    let clock = ManualClock::new();
    let app = proxy(&base, API_KEY, &clock);

    for _ in 0..10 {
        let resp = app
            .clone()
            .oneshot(get_from("/api/sensors/42", "198.51.100.9"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        clock.advance(Duration::from_secs(10));
    }

    let denied = app
        .clone()
        .oneshot(get_from("/api/sensors/42", "198.51.100.9"))
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json_body(denied).await["error"], "Too many requests");

    let other = app
        .clone()
        .oneshot(get_from("/api/sensors/42", "198.51.100.10"))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::OK);

    clock.advance(Duration::from_secs(300));
    let after_window = app
        .oneshot(get_from("/api/sensors/42", "198.51.100.9"))
        .await
        .unwrap();
    handle.abort();
    assert_eq!(after_window.status(), StatusCode::OK);
}

#[tokio::test]
async fn rotating_forwarded_for_does_not_bypass_limit_when_untrusted() {
    let (base, _upstream, handle) = spawn_upstream().await;
    let app = proxy_with(&base, API_KEY, &ManualClock::new(), false);

    for i in 0..10 {
        let resp = app
            .clone()
            .oneshot(get_from("/api/sensors/42", &format!("203.0.113.{i}")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let denied = app
        .oneshot(get_from("/api/sensors/42", "203.0.113.200"))
        .await
        .unwrap();
    handle.abort();
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn upstream_error_status_is_generic_failure_and_not_cached() {
    let (base, upstream, handle) = spawn_upstream().await;
    let app = proxy(&base, API_KEY, &ManualClock::new());

    for _ in 0..2 {
        let resp = app
            .clone()
            .oneshot(get_from("/api/sensors/404", "192.0.2.1"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(resp).await["error"], "Failed to fetch sensor data");
    }
    handle.abort();
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn wrong_api_key_is_generic_failure() {
    let (base, upstream, handle) = spawn_upstream().await;
    let app = proxy(&base, "wrong-key", &ManualClock::new());

    let resp = app
        .oneshot(get_from("/api/sensors/42", "192.0.2.2"))
        .await
        .unwrap();
    handle.abort();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unreachable_upstream_is_generic_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let app = proxy(&format!("http://{addr}"), API_KEY, &ManualClock::new());

    let resp = app
        .oneshot(get_from("/api/sensors/42", "192.0.2.3"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(resp).await["error"], "Failed to fetch sensor data");
}

#[tokio::test]
async fn invalid_sensor_id_is_bad_request() {
    let app = proxy("http://127.0.0.1:9", API_KEY, &ManualClock::new());
    let resp = app
        .oneshot(get_from("/api/sensors/not-a-number", "192.0.2.4"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp).await["error"], "Invalid sensor id");
}

#[tokio::test]
async fn aqi_endpoint_converts_cached_payload() {
    let (base, upstream, handle) = spawn_upstream().await;
    let app = proxy(&base, API_KEY, &ManualClock::new());

    let raw = app
        .clone()
        .oneshot(get_from("/api/sensors/42", "192.0.2.5"))
        .await
        .unwrap();
    assert_eq!(raw.status(), StatusCode::OK);

    let resp = app
        .oneshot(get_from("/api/sensors/42/aqi", "192.0.2.5"))
        .await
        .unwrap();
    handle.abort();

    assert_eq!(resp.status(), StatusCode::OK);
    let v = json_body(resp).await;
    assert_eq!(v["sensor_id"], 42);
    assert_eq!(v["name"], "Rooftop");
    assert_eq!(v["aqi"], 50);
    assert_eq!(v["category"], "good");
    assert_eq!(v["label"], "Good");
    assert_eq!(v["color"], "#00e400");
    assert_eq!(v["temperature"], 68.0);
    assert_eq!(v["humidity"], 33.0);
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn aqi_endpoint_without_pm25_is_bad_gateway() {
    let (base, _upstream, handle) = spawn_upstream().await;
    let app = proxy(&base, API_KEY, &ManualClock::new());

    let resp = app
        .oneshot(get_from("/api/sensors/777/aqi", "192.0.2.6"))
        .await
        .unwrap();
    handle.abort();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        json_body(resp).await["error"],
        "Sensor payload has no PM2.5 reading"
    );
}
