use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const DEFAULT_MAX_REQUESTS: u32 = 10;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_start: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    entries: HashMap<String, RateLimitEntry>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            max_requests,
            window,
        }
    }

    // New clients and expired windows both restart at a count of one.
    pub fn allow(&mut self, client_id: &str, now: Instant) -> bool {
        if self.max_requests == 0 {
            return false;
        }
        let fresh = RateLimitEntry {
            count: 1,
            window_start: now,
        };
        let Some(entry) = self.entries.get_mut(client_id) else {
            self.entries.insert(client_id.to_string(), fresh);
            return true;
        };
        if now.saturating_duration_since(entry.window_start) > self.window {
            *entry = fresh;
            true
        } else if entry.count < self.max_requests {
            entry.count += 1;
            true
        } else {
            false
        }
    }

    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let window = self.window;
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.window_start) <= window);
        before - self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    fn entry(&self, client_id: &str) -> Option<&RateLimitEntry> {
        self.entries.get(client_id)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}
