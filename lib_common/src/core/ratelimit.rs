//! # Sliding Window Rate Limiter
//!
//! Per-identity request quota for the proxy. The limiter counts requests in a
//! continuously moving window (default 10 requests per 10 seconds) kept by a
//! pluggable `QuotaStore`.
//!
//! ## Failure policy
//! The limiter fails open. With no store configured every request is allowed
//! and reported as having the full quota left. If a configured store errors
//! the request is also allowed and the error is logged.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;

/// Outcome of a quota check, echoed back to the caller as response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// When the oldest counted request leaves the window, epoch millis.
    pub reset_at_ms: i64,
}

/// What a store reports after recording (or refusing) a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowUsage {
    /// Whether the hit fit in the window and was recorded.
    pub admitted: bool,
    /// Hits in the window after this one was considered.
    pub used: u32,
    /// Timestamp of the oldest hit still in the window, epoch millis.
    pub oldest_ms: i64,
}

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("quota backend error: {0}")]
    Backend(String),
}

/// Backing store for the sliding window log.
///
/// `record_hit` must be atomic per key: it drops hits older than
/// `now_ms - window_ms`, then records the new hit only if fewer than `limit`
/// remain.
pub trait QuotaStore: Send + Sync {
    fn record_hit<'a>(
        &'a self,
        key: &'a str,
        now_ms: i64,
        window_ms: i64,
        limit: u32,
    ) -> BoxFuture<'a, Result<WindowUsage, QuotaError>>;
}

/// Process-local store. Counts are lost on restart and not shared between
/// instances, which is fine for a single server.
///
/// Identities whose hits have all left the window are dropped, either when they
/// are seen again or by a sweep that runs at most once per window.
#[derive(Default)]
pub struct InMemoryQuotaStore {
    state: Mutex<QuotaLog>,
}

#[derive(Default)]
struct QuotaLog {
    hits: HashMap<String, VecDeque<i64>>,
    last_sweep_ms: i64,
}

impl QuotaLog {
    fn sweep(&mut self, cutoff: i64) {
        let before = self.hits.len();
        // Timestamps are pushed in order, so the newest hit is at the back.
        self.hits.retain(|_, log| log.back().is_some_and(|&t| t > cutoff));
        let dropped = before - self.hits.len();
        if dropped > 0 {
            log::debug!("Quota sweep released {} idle identities", dropped);
        }
    }
}

impl InMemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identities currently holding at least one hit.
    pub fn tracked(&self) -> usize {
        self.state.lock().map(|state| state.hits.len()).unwrap_or(0)
    }

    fn record(&self, key: &str, now_ms: i64, window_ms: i64, limit: u32) -> Result<WindowUsage, QuotaError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| QuotaError::Backend("in-memory quota lock poisoned".to_string()))?;

        let cutoff = now_ms - window_ms;
        if now_ms - state.last_sweep_ms >= window_ms {
            state.sweep(cutoff);
            state.last_sweep_ms = now_ms;
        }

        let log = state.hits.entry(key.to_string()).or_default();
        while log.front().is_some_and(|&t| t <= cutoff) {
            log.pop_front();
        }

        let admitted = (log.len() as u32) < limit;
        if admitted {
            log.push_back(now_ms);
        }
        let usage = WindowUsage {
            admitted,
            used: log.len() as u32,
            oldest_ms: log.front().copied().unwrap_or(now_ms),
        };

        // A zero limit admits nothing and would otherwise leave an empty log behind.
        if log.is_empty() {
            state.hits.remove(key);
        }
        Ok(usage)
    }
}

impl QuotaStore for InMemoryQuotaStore {
    fn record_hit<'a>(
        &'a self,
        key: &'a str,
        now_ms: i64,
        window_ms: i64,
        limit: u32,
    ) -> BoxFuture<'a, Result<WindowUsage, QuotaError>> {
        let result = self.record(key, now_ms, window_ms, limit);
        Box::pin(async move { result })
    }
}

/// Per-identity sliding window limiter.
#[derive(Clone)]
pub struct RateLimiter {
    store: Option<Arc<dyn QuotaStore>>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    /// `store: None` means no backing store is configured and every request passes.
    pub fn new(store: Option<Arc<dyn QuotaStore>>, limit: u32, window: Duration) -> Self {
        Self { store, limit, window }
    }

    /// A limiter backed by `InMemoryQuotaStore`.
    pub fn in_memory(limit: u32, window: Duration) -> Self {
        Self::new(Some(Arc::new(InMemoryQuotaStore::new())), limit, window)
    }

    pub fn is_enforcing(&self) -> bool {
        self.store.is_some()
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub async fn check(&self, identity: &str) -> RateLimitDecision {
        self.check_at(identity, chrono::Utc::now().timestamp_millis()).await
    }

    /// Same as `check` with an explicit clock, epoch millis.
    pub async fn check_at(&self, identity: &str, now_ms: i64) -> RateLimitDecision {
        let window_ms = self.window.as_millis() as i64;
        let open = RateLimitDecision {
            allowed: true,
            limit: self.limit,
            remaining: self.limit,
            reset_at_ms: now_ms + window_ms,
        };

        let Some(store) = &self.store else {
            return open;
        };

        match store.record_hit(identity, now_ms, window_ms, self.limit).await {
            Ok(usage) => RateLimitDecision {
                allowed: usage.admitted,
                limit: self.limit,
                remaining: if usage.admitted {
                    self.limit.saturating_sub(usage.used)
                } else {
                    0
                },
                reset_at_ms: usage.oldest_ms + window_ms,
            },
            Err(e) => {
                log::warn!("Quota check for '{}' failed, allowing request: {}", identity, e);
                open
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenStore;

    impl QuotaStore for BrokenStore {
        fn record_hit<'a>(
            &'a self,
            _key: &'a str,
            _now_ms: i64,
            _window_ms: i64,
            _limit: u32,
        ) -> BoxFuture<'a, Result<WindowUsage, QuotaError>> {
            Box::pin(async { Err(QuotaError::Backend("connection refused".into())) })
        }
    }

    fn limiter() -> RateLimiter {
        RateLimiter::in_memory(10, Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_eleventh_request_is_rejected() {
        let rl = limiter();
        let start = 1_700_000_000_000;
        for i in 0..10 {
            let d = rl.check_at("1.2.3.4", start + i * 100).await;
            assert!(d.allowed, "request {} should pass", i + 1);
            assert_eq!(d.remaining, 9 - i as u32);
        }
        let d = rl.check_at("1.2.3.4", start + 1_000).await;
        assert!(!d.allowed);
        assert_eq!(d.remaining, 0);
        assert_eq!(d.reset_at_ms, start + 10_000);
    }

    #[tokio::test]
    async fn test_identities_are_independent() {
        let rl = limiter();
        for _ in 0..11 {
            rl.check_at("a", 0).await;
        }
        let other = rl.check_at("b", 0).await;
        assert!(other.allowed);
        assert_eq!(other.remaining, 9);
    }

    #[tokio::test]
    async fn test_window_slides() {
        let rl = limiter();
        for i in 0..10 {
            assert!(rl.check_at("x", i * 1_000).await.allowed);
        }
        assert!(!rl.check_at("x", 9_500).await.allowed);
        // The first hit (t=0) leaves the window at t=10_000.
        let d = rl.check_at("x", 10_000).await;
        assert!(d.allowed);
        assert_eq!(d.remaining, 0);
    }

    #[tokio::test]
    async fn test_unconfigured_fails_open() {
        let rl = RateLimiter::new(None, 10, Duration::from_secs(10));
        for _ in 0..100 {
            let d = rl.check_at("anonymous", 5).await;
            assert!(d.allowed);
            assert_eq!(d.remaining, 10);
            assert_eq!(d.reset_at_ms, 10_005);
        }
        assert!(!rl.is_enforcing());
    }

    #[tokio::test]
    async fn test_backend_error_fails_open() {
        let rl = RateLimiter::new(Some(Arc::new(BrokenStore)), 10, Duration::from_secs(10));
        let d = rl.check_at("1.2.3.4", 0).await;
        assert!(d.allowed);
        assert_eq!(d.remaining, 10);
    }

    #[tokio::test]
    async fn test_expired_identities_are_released() {
        let store = Arc::new(InMemoryQuotaStore::new());
        let rl = RateLimiter::new(Some(store.clone()), 10, Duration::from_secs(10));

        for i in 0..5_000 {
            rl.check_at(&format!("coingecko-global:10.0.{}.{}", i / 256, i % 256), 0).await;
        }
        assert_eq!(store.tracked(), 5_000);

        // Every earlier window has long expired; only the caller seen now is kept.
        let d = rl.check_at("coingecko-global:203.0.113.7", 1_000_000).await;
        assert!(d.allowed);
        assert_eq!(store.tracked(), 1);
    }

    #[tokio::test]
    async fn test_sweep_keeps_identities_inside_the_window() {
        let store = Arc::new(InMemoryQuotaStore::new());
        let rl = RateLimiter::new(Some(store.clone()), 10, Duration::from_secs(10));

        rl.check_at("old", 0).await;
        rl.check_at("recent", 9_000).await;
        rl.check_at("now", 12_000).await;
        assert_eq!(store.tracked(), 2);

        // "recent" still counts against its quota after the sweep.
        assert_eq!(rl.check_at("recent", 12_500).await.remaining, 8);
    }
}
