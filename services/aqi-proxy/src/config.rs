use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use url::Url;

use crate::cache::DEFAULT_TTL;
use crate::rate_limit::{DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW};

pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://api.purpleair.com";
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub upstream_base_url: String,
    pub api_key_header: String,
    pub api_key: String,
    pub upstream_timeout: Option<Duration>,
    pub trust_forwarded_headers: bool,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window: Duration,
    pub cache_ttl: Duration,
    pub sweep_interval: Duration,
}

pub fn read_env(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => default.to_string(),
    }
}

pub fn read_env_optional(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_env_parsed<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match read_env_optional(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("{key}={raw} is not valid; using {default}");
            default
        }),
        None => default,
    }
}

fn read_env_nonzero<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr + Copy + std::fmt::Display + PartialEq + Default,
{
    let value = read_env_parsed(key, default);
    if value == T::default() {
        return Err(anyhow!("{key} must be greater than zero"));
    }
    Ok(value)
}

fn read_env_nonzero_secs(key: &str, default: Duration) -> Result<Duration> {
    read_env_nonzero(key, default.as_secs()).map(Duration::from_secs)
}

fn read_env_bool(key: &str, default: bool) -> bool {
    match read_env_optional(key).map(|v| v.to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        Some(v) => {
            tracing::warn!("{key}={v} is not a boolean; using {default}");
            default
        }
        None => default,
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let host = read_env("AQI_PROXY_HOST", "0.0.0.0");
        let port_key = if read_env_optional("AQI_PROXY_PORT").is_some() {
            "AQI_PROXY_PORT"
        } else {
            "PORT"
        };
        let port: u16 = read_env_parsed(port_key, 8080);
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid bind address {host}:{port}"))?;

        let upstream_base_url = read_env("UPSTREAM_BASE_URL", DEFAULT_UPSTREAM_BASE_URL);
        let parsed = Url::parse(&upstream_base_url)
            .with_context(|| format!("UPSTREAM_BASE_URL is not a valid URL: {upstream_base_url}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(anyhow!(
                "UPSTREAM_BASE_URL must be http or https, got {}",
                parsed.scheme()
            ));
        }

        let api_key =
            read_env_optional("UPSTREAM_API_KEY").context("UPSTREAM_API_KEY must be set")?;
        let api_key_header = read_env("UPSTREAM_API_KEY_HEADER", DEFAULT_API_KEY_HEADER);
        axum::http::HeaderName::from_str(&api_key_header)
            .with_context(|| format!("invalid UPSTREAM_API_KEY_HEADER {api_key_header}"))?;

        // 0 means no timeout, same as leaving it unset.
        let upstream_timeout = Some(read_env_parsed("UPSTREAM_TIMEOUT_SECS", 0u64))
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Ok(Self {
            addr,
            upstream_base_url,
            api_key_header,
            api_key,
            upstream_timeout,
            trust_forwarded_headers: read_env_bool("TRUST_FORWARDED_HEADERS", false),
            rate_limit_max_requests: read_env_nonzero(
                "RATE_LIMIT_MAX_REQUESTS",
                DEFAULT_MAX_REQUESTS,
            )?,
            rate_limit_window: read_env_nonzero_secs("RATE_LIMIT_WINDOW_SECS", DEFAULT_WINDOW)?,
            cache_ttl: read_env_nonzero_secs("CACHE_TTL_SECS", DEFAULT_TTL)?,
            sweep_interval: read_env_nonzero_secs("SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL)?,
        })
    }

    pub fn http_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.upstream_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }
}
