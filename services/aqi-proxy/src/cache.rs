use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;

pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub payload: Value,
    pub fetched_at: Instant,
}

#[derive(Debug)]
pub struct SensorCache {
    entries: HashMap<u64, CacheEntry>,
    ttl: Duration,
}

impl SensorCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    // A stale entry is evicted on the way out.
    pub fn get(&mut self, sensor_id: u64, now: Instant) -> Option<Value> {
        let fresh = {
            let entry = self.entries.get(&sensor_id)?;
            now.saturating_duration_since(entry.fetched_at) < self.ttl
        };
        if fresh {
            self.entries.get(&sensor_id).map(|e| e.payload.clone())
        } else {
            self.entries.remove(&sensor_id);
            None
        }
    }

    pub fn put(&mut self, sensor_id: u64, payload: Value, now: Instant) {
        self.entries.insert(
            sensor_id,
            CacheEntry {
                payload,
                fetched_at: now,
            },
        );
    }

    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.fetched_at) <= ttl);
        before - self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    fn contains(&self, sensor_id: u64) -> bool {
        self.entries.contains_key(&sensor_id)
    }
}

impl Default for SensorCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
