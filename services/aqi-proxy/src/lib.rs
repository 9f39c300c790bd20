//! Rate-limited, caching proxy in front of an air-quality sensor API,
//! with PM2.5 to AQI conversion.

use axum::{Router, routing::get};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub mod aqi;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod state;
pub mod types;
pub mod upstream;

pub use config::Config;
pub use error::{ProxyError, UpstreamError};
pub use state::{ProxyState, SharedState, spawn_sweeper};

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/sensors/:sensor_id", get(handlers::sensor))
        .route("/api/sensors/:sensor_id/aqi", get(handlers::sensor_aqi))
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let request_id = req
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http",
                    %request_id,
                    method = %req.method(),
                    uri = %req.uri(),
                )
            }),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}
