// Fixed-window rate limiting for credential-issuing endpoints
// Process-local; the allow/stats contract permits swapping in a shared
// implementation for horizontally scaled deployments

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// Buckets map sizes beyond this trigger a garbage-collection pass on insert
const GC_THRESHOLD: usize = 1024;

/// Outcome of a rate-limit check, carrying everything the 429 headers need
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub window_seconds: u64,
    pub remaining: u64,
    /// Unix timestamp when the current window rolls over
    pub reset_at: u64,
    pub retry_after: u64,
}

/// One window of hits for a single client key.
/// Window start and count are packed into one atomic so a hit is recorded
/// with a single compare-and-swap and concurrent calls never double-count.
struct Bucket {
    state: AtomicU64,
}

const COUNT_BITS: u64 = 22;
const COUNT_MASK: u64 = (1 << COUNT_BITS) - 1;

impl Bucket {
    fn new() -> Self {
        Self {
            state: AtomicU64::new(0),
        }
    }

    fn pack(window_start: u64, count: u64) -> u64 {
        (window_start << COUNT_BITS) | count.min(COUNT_MASK)
    }

    fn unpack(state: u64) -> (u64, u64) {
        (state >> COUNT_BITS, state & COUNT_MASK)
    }

    /// Record a hit in the window containing `now`; returns the hit ordinal
    fn hit(&self, window_start: u64) -> u64 {
        loop {
            let current = self.state.load(Ordering::Acquire);
            let (stored_window, stored_count) = Self::unpack(current);

            let next_count = if stored_window == window_start {
                stored_count.saturating_add(1).min(COUNT_MASK)
            } else {
                1
            };

            let next = Self::pack(window_start, next_count);
            if self
                .state
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return next_count;
            }
        }
    }

    fn count_in(&self, window_start: u64) -> u64 {
        let (stored_window, count) = Self::unpack(self.state.load(Ordering::Acquire));
        if stored_window == window_start {
            count
        } else {
            0
        }
    }
}

/// Fixed-window counter keyed by client identity
pub struct RateLimiter {
    limit: u64,
    window_seconds: u64,
    buckets: RwLock<HashMap<String, Arc<Bucket>>>,
}

impl RateLimiter {
    pub fn new(limit: u64, window_seconds: u64) -> Self {
        Self {
            limit,
            window_seconds: window_seconds.max(1),
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// Atomically count a hit and decide whether it is within the limit
    pub fn allow(&self, key: &str) -> RateLimitDecision {
        self.allow_at(key, unix_now())
    }

    /// Current standing for a key without recording a hit
    pub fn stats(&self, key: &str) -> RateLimitDecision {
        let now = unix_now();
        let window_start = self.window_start(now);

        let count = {
            let buckets = self.buckets.read().expect("rate limiter lock poisoned");
            buckets
                .get(key)
                .map(|b| b.count_in(window_start))
                .unwrap_or(0)
        };

        self.decision(count, count <= self.limit, window_start, now)
    }

    fn allow_at(&self, key: &str, now: u64) -> RateLimitDecision {
        let window_start = self.window_start(now);
        let bucket = self.bucket_for(key, window_start);
        let count = bucket.hit(window_start);
        let allowed = count <= self.limit;

        self.decision(count, allowed, window_start, now)
    }

    fn window_start(&self, now: u64) -> u64 {
        now - (now % self.window_seconds)
    }

    fn decision(&self, count: u64, allowed: bool, window_start: u64, now: u64) -> RateLimitDecision {
        let reset_at = window_start + self.window_seconds;
        RateLimitDecision {
            allowed,
            limit: self.limit,
            window_seconds: self.window_seconds,
            remaining: self.limit.saturating_sub(count),
            reset_at,
            retry_after: reset_at.saturating_sub(now),
        }
    }

    fn bucket_for(&self, key: &str, current_window: u64) -> Arc<Bucket> {
        {
            let buckets = self.buckets.read().expect("rate limiter lock poisoned");
            if let Some(bucket) = buckets.get(key) {
                return bucket.clone();
            }
        }

        let mut buckets = self.buckets.write().expect("rate limiter lock poisoned");
        if buckets.len() >= GC_THRESHOLD {
            // Drop buckets whose window has long passed
            buckets.retain(|_, b| {
                let (window, _) = Bucket::unpack(b.state.load(Ordering::Acquire));
                window + 1 >= current_window
            });
        }
        buckets
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Bucket::new()))
            .clone()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
