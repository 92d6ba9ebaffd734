use lib_common::core::{FeedMode, MarketStore, RateLimiter};
use lib_common::markets::{CoinGecko, UpstreamError};
use lib_common::validation::{CoinGeckoGlobal, CoinGeckoMarket};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};

/// How long a live CoinGecko answer is reused before asking again.
pub const GLOBAL_CACHE_TTL: Duration = Duration::from_secs(300);
pub const MARKETS_CACHE_TTL: Duration = Duration::from_secs(60);

/// A single cached value with a freshness window.
pub struct TtlCache<T> {
    ttl: Duration,
    slot: RwLock<Option<(Instant, T)>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, slot: RwLock::new(None) }
    }

    pub async fn get(&self) -> Option<T> {
        let guard = self.slot.read().await;
        match guard.as_ref() {
            Some((stored_at, value)) if stored_at.elapsed() < self.ttl => Some(value.clone()),
            _ => None,
        }
    }

    pub async fn put(&self, value: T) {
        *self.slot.write().await = Some((Instant::now(), value));
    }

    /// Returns the cached value if fresh, otherwise runs `fetch` and caches a success.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<T, UpstreamError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        if let Some(hit) = self.get().await {
            return Ok(hit);
        }
        let value = fetch().await?;
        self.put(value.clone()).await;
        Ok(value)
    }
}

/// Everything the two proxy routes need.
pub struct ProxyState {
    pub limiter: RateLimiter,
    pub coingecko: CoinGecko,
    pub global_cache: TtlCache<CoinGeckoGlobal>,
    pub markets_cache: TtlCache<Vec<CoinGeckoMarket>>,
}

impl ProxyState {
    pub fn new(limiter: RateLimiter, coingecko: CoinGecko) -> Self {
        Self {
            limiter,
            coingecko,
            global_cache: TtlCache::new(GLOBAL_CACHE_TTL),
            markets_cache: TtlCache::new(MARKETS_CACHE_TTL),
        }
    }

    pub async fn global(&self) -> Result<CoinGeckoGlobal, UpstreamError> {
        self.global_cache.get_or_fetch(|| self.coingecko.global()).await
    }

    pub async fn markets(&self) -> Result<Vec<CoinGeckoMarket>, UpstreamError> {
        self.markets_cache.get_or_fetch(|| self.coingecko.markets()).await
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MarketStore>,
    pub proxy: Arc<ProxyState>,
    // Raised while the market listing poller's latest cycle failed
    pub markets_error: watch::Receiver<bool>,
    // None when the synchronizers are disabled
    pub feed_mode: Option<watch::Receiver<FeedMode>>,
}

impl AppState {
    pub fn new(store: Arc<MarketStore>, proxy: ProxyState) -> Self {
        // A sender that is dropped right away leaves the flag at `false` for good.
        let (_, markets_error) = watch::channel(false);
        Self {
            store,
            proxy: Arc::new(proxy),
            markets_error,
            feed_mode: None,
        }
    }

    pub fn with_sync_status(mut self, markets_error: watch::Receiver<bool>, feed_mode: watch::Receiver<FeedMode>) -> Self {
        self.markets_error = markets_error;
        self.feed_mode = Some(feed_mode);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_cache_reuses_fresh_value() {
        let cache = TtlCache::new(Duration::from_secs(60));
        let calls = AtomicU32::new(0);
        for _ in 0..3 {
            let v = cache
                .get_or_fetch(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, UpstreamError>(7u32)
                })
                .await
                .unwrap();
            assert_eq!(v, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_expires_and_skips_failures() {
        let cache = TtlCache::new(Duration::from_millis(10));
        cache.put(1u32).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get().await, None);

        let failed = cache
            .get_or_fetch(|| async { Err(UpstreamError::Empty("test")) })
            .await;
        assert!(failed.is_err());
        assert_eq!(cache.get().await, None);
    }
}
