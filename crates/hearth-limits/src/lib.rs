//! Attempt limiting for invite validation.
//!
//! The limiter sits outside the store's consistency boundary: counts are
//! best-effort and process-local. Deployments behind several replicas get one
//! budget per replica.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

/// Bucket used when the caller has no identifiable scope.
pub const GLOBAL_SCOPE: &str = "*";

/// Every this many checks, idle buckets are dropped from the map.
const SHRINK_INTERVAL: u64 = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateDecision {
    Allow,
    Deny { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allow)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_attempts: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            window: Duration::from_secs(60),
        }
    }
}

/// Decides whether one more attempt is allowed for a scope key.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count an attempt for `key` and decide whether it may proceed.
    async fn check(&self, key: &str) -> RateDecision;
}

/// Rolling-window limiter kept in process memory.
pub struct MemoryRateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<String, VecDeque<Instant>>,
    checks: AtomicU64,
}

impl MemoryRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
            checks: AtomicU64::new(0),
        }
    }

    /// Number of scope keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }

    /// Same as [`RateLimiter::check`] with an explicit clock.
    pub fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        if self.checks.fetch_add(1, Ordering::Relaxed) % SHRINK_INTERVAL == SHRINK_INTERVAL - 1 {
            self.shrink(now);
        }

        let window = self.config.window;
        let mut bucket = self.buckets.entry(key.to_string()).or_default();
        while bucket
            .front()
            .is_some_and(|first| now.saturating_duration_since(*first) >= window)
        {
            bucket.pop_front();
        }

        if bucket.len() >= self.config.max_attempts as usize {
            let retry_after = bucket
                .front()
                .map(|first| window.saturating_sub(now.saturating_duration_since(*first)))
                .unwrap_or(window);
            tracing::debug!(scope = key, ?retry_after, "attempt limit reached");
            return RateDecision::Deny { retry_after };
        }

        bucket.push_back(now);
        RateDecision::Allow
    }

    /// Drop buckets whose every attempt has aged out of the window.
    fn shrink(&self, now: Instant) {
        let window = self.config.window;
        self.buckets.retain(|_, attempts| {
            attempts
                .back()
                .is_some_and(|last| now.saturating_duration_since(*last) < window)
        });
        self.buckets.shrink_to_fit();
    }
}

impl Default for MemoryRateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now())
    }
}
