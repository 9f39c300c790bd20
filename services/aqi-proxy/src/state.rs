use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::cache::SensorCache;
use crate::clock::{Clock, SystemClock};
use crate::config::DEFAULT_SWEEP_INTERVAL;
use crate::error::ProxyError;
use crate::rate_limit::RateLimiter;
use crate::upstream::UpstreamClient;

pub struct ProxyState {
    limiter: RwLock<RateLimiter>,
    cache: RwLock<SensorCache>,
    upstream: UpstreamClient,
    clock: Arc<dyn Clock>,
    trust_forwarded_headers: bool,
}

pub type SharedState = Arc<ProxyState>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepStats {
    pub rate_limit_entries: usize,
    pub cache_entries: usize,
}

impl ProxyState {
    pub fn new(limiter: RateLimiter, cache: SensorCache, upstream: UpstreamClient) -> Self {
        Self::with_clock(limiter, cache, upstream, Arc::new(SystemClock))
    }

    pub fn with_clock(
        limiter: RateLimiter,
        cache: SensorCache,
        upstream: UpstreamClient,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            limiter: RwLock::new(limiter),
            cache: RwLock::new(cache),
            upstream,
            clock,
            trust_forwarded_headers: false,
        }
    }

    // Only safe behind a proxy that overwrites x-forwarded-for / x-real-ip.
    pub fn with_trusted_forwarding(mut self, trust: bool) -> Self {
        self.trust_forwarded_headers = trust;
        self
    }

    pub fn trusts_forwarded_headers(&self) -> bool {
        self.trust_forwarded_headers
    }

    pub async fn allow(&self, client_id: &str) -> bool {
        let now = self.clock.now();
        self.limiter.write().await.allow(client_id, now)
    }

    pub async fn sensor_payload(&self, sensor_id: u64) -> Result<Value, ProxyError> {
        let cached = {
            let now = self.clock.now();
            self.cache.write().await.get(sensor_id, now)
        };
        if let Some(payload) = cached {
            tracing::debug!(sensor_id, "cache hit");
            return Ok(payload);
        }

        tracing::debug!(sensor_id, "cache miss; fetching upstream");
        let payload = self.upstream.fetch_sensor(sensor_id).await.map_err(|e| {
            tracing::error!(sensor_id, error = %e, "upstream fetch failed");
            ProxyError::from(e)
        })?;

        let now = self.clock.now();
        self.cache.write().await.put(sensor_id, payload.clone(), now);
        Ok(payload)
    }

    pub async fn sweep(&self) -> SweepStats {
        let now = self.clock.now();
        let rate_limit_entries = self.limiter.write().await.sweep(now);
        let cache_entries = self.cache.write().await.sweep(now);
        SweepStats {
            rate_limit_entries,
            cache_entries,
        }
    }

    #[cfg(test)]
    async fn rate_limit_len(&self) -> usize {
        self.limiter.read().await.len()
    }

    #[cfg(test)]
    async fn cache_len(&self) -> usize {
        self.cache.read().await.len()
    }
}

/// First sweep runs one full period after spawning.
pub fn spawn_sweeper(state: SharedState, period: Duration) -> JoinHandle<()> {
    let period = if period.is_zero() {
        tracing::warn!(
            "sweep interval must be non-zero; using {}s",
            DEFAULT_SWEEP_INTERVAL.as_secs()
        );
        DEFAULT_SWEEP_INTERVAL
    } else {
        period
    };
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut ticker = tokio::time::interval_at(start, period);
        loop {
            ticker.tick().await;
            let stats = state.sweep().await;
            if stats != SweepStats::default() {
                tracing::info!(
                    rate_limit_entries = stats.rate_limit_entries,
                    cache_entries = stats.cache_entries,
                    "sweep removed expired entries"
                );
            }
        }
    })
}
