use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use aqi_proxy::cache::SensorCache;
use aqi_proxy::rate_limit::RateLimiter;
use aqi_proxy::upstream::UpstreamClient;
use aqi_proxy::{Config, ProxyState, build_router, spawn_sweeper};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer())
        .init();
    tracing::info!("aqi-proxy starting up...");

    let config = Config::from_env()?;
    let upstream = UpstreamClient::new(
        config.http_client()?,
        &config.upstream_base_url,
        &config.api_key_header,
        &config.api_key,
    );
    let state = Arc::new(
        ProxyState::new(
            RateLimiter::new(config.rate_limit_max_requests, config.rate_limit_window),
            SensorCache::new(config.cache_ttl),
            upstream,
        )
        .with_trusted_forwarding(config.trust_forwarded_headers),
    );
    tracing::info!(
        upstream = %config.upstream_base_url,
        max_requests = config.rate_limit_max_requests,
        window_secs = config.rate_limit_window.as_secs(),
        cache_ttl_secs = config.cache_ttl.as_secs(),
        trust_forwarded_headers = config.trust_forwarded_headers,
        "proxy configured"
    );

    let sweeper = spawn_sweeper(Arc::clone(&state), config.sweep_interval);
    let app = build_router(state);

    tracing::info!("aqi-proxy listening on http://{}", config.addr);
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.abort();
    tracing::info!("aqi-proxy shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigint = signal(SignalKind::interrupt()).expect("listen SIGINT");
    let mut sigterm = signal(SignalKind::terminate()).expect("listen SIGTERM");
    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
    }
    tracing::info!("shutdown signal received");
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    tracing::info!("shutdown signal received");
}
