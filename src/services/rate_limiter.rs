//! Fixed-window rate limiter keyed by client identity.
//!
//! State is in-memory and resets on process restart. Safe to share via
//! `Arc<RateLimiter>` across workers.

use crate::services::clock::Clock;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Counter for one client within the current window
#[derive(Debug, Clone, Copy)]
pub struct RateLimitBucket {
    pub window_start: DateTime<Utc>,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

pub struct RateLimiter {
    buckets: Mutex<HashMap<String, RateLimitBucket>>,
    max_requests: u32,
    window: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            max_requests,
            window: chrono::Duration::from_std(window).unwrap_or(chrono::Duration::seconds(60)),
            clock,
        }
    }

    /// Count a request from `key` and decide whether it may proceed.
    ///
    /// Increment and check happen under one lock.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        let now = self.clock.now();
        let mut buckets = self.buckets.lock();

        let bucket = buckets.entry(key.to_string()).or_insert(RateLimitBucket {
            window_start: now,
            count: 0,
        });

        if now - bucket.window_start >= self.window {
            bucket.window_start = now;
            bucket.count = 0;
        }

        if bucket.count >= self.max_requests {
            let retry_after = (bucket.window_start + self.window - now)
                .to_std()
                .unwrap_or(Duration::ZERO);
            return RateLimitDecision::Limited { retry_after };
        }

        bucket.count += 1;
        RateLimitDecision::Allowed {
            remaining: self.max_requests - bucket.count,
        }
    }

    /// Drop buckets whose window has passed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        buckets.retain(|_, bucket| now - bucket.window_start < self.window);
        before - buckets.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.buckets.lock().len()
    }
}
