//! # Supervisor
//!
//! Builds every synchronizer from a set of endpoints, spawns each on its own
//! task under a child cancellation token, and tears them all down together.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::store::MarketStore;
use crate::core::upstream_manager::FeedMode;
use crate::ingestors::polling::run_polling;
use crate::ingestors::ticker_wss::{TickerSettings, TickerSync, WsConnector};
use crate::ingestors::{
    DominanceSync, FundingSync, MarketListingSync, RatioSync, SentimentSync, SyncSettings,
};
use crate::markets::{
    alternative, binance, bybit, terminal_proxy, AlternativeMe, BinanceFutures, BinanceSpot, Bybit,
    TerminalProxy,
};
use crate::retrieve::FetchError;

/// How long `shutdown` waits for tasks with an in-flight request before aborting them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Where each synchronizer reaches its upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEndpoints {
    pub binance_ws_url: String,
    pub binance_rest_base_url: String,
    pub binance_futures_base_url: String,
    pub alternative_base_url: String,
    pub bybit_base_url: String,
    /// Root of the terminal's own `/api/coingecko/` routes.
    pub proxy_base_url: String,
    /// Pair shown by the ticker and used for the long/short ratio.
    pub ticker_symbol: String,
    pub funding_symbols: Vec<String>,
    /// Transient-failure retries per request. Zero leaves retrying to the cadence.
    pub http_retries: u32,
}

impl Default for SyncEndpoints {
    fn default() -> Self {
        Self {
            binance_ws_url: binance::DEFAULT_WS_URL.to_string(),
            binance_rest_base_url: binance::DEFAULT_REST_BASE_URL.to_string(),
            binance_futures_base_url: binance::DEFAULT_FUTURES_BASE_URL.to_string(),
            alternative_base_url: alternative::DEFAULT_BASE_URL.to_string(),
            bybit_base_url: bybit::DEFAULT_BASE_URL.to_string(),
            proxy_base_url: terminal_proxy::DEFAULT_BASE_URL.to_string(),
            ticker_symbol: binance::TICKER_SYMBOL.to_string(),
            funding_symbols: binance::DEFAULT_FUNDING_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            http_retries: 0,
        }
    }
}

/// The running set of synchronizers.
pub struct SyncSet {
    cancel: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    feed_mode: watch::Receiver<FeedMode>,
    markets_error: watch::Receiver<bool>,
}

impl SyncSet {
    /// Spawns every synchronizer against `store`. Cancelling `parent` (or
    /// calling `shutdown`) stops them all.
    ///
    /// Fails only if an endpoint is not a valid URL.
    pub fn spawn(
        store: Arc<MarketStore>,
        endpoints: &SyncEndpoints,
        settings: &SyncSettings,
        parent: &CancellationToken,
    ) -> Result<Self, FetchError> {
        let cancel = parent.child_token();
        let retries = endpoints.http_retries;

        let ticker = TickerSync::new(
            WsConnector::new(endpoints.binance_ws_url.clone()),
            BinanceSpot::new(&endpoints.binance_rest_base_url, retries)?,
            endpoints.ticker_symbol.clone(),
            TickerSettings::from(settings),
        );
        let sentiment = SentimentSync::new(AlternativeMe::new(&endpoints.alternative_base_url, retries)?);
        let ratio = RatioSync::new(
            Bybit::new(&endpoints.bybit_base_url, retries)?,
            endpoints.ticker_symbol.clone(),
        );
        let funding = FundingSync::new(
            BinanceFutures::new(&endpoints.binance_futures_base_url, retries)?,
            endpoints.funding_symbols.clone(),
        );
        let markets = MarketListingSync::new(TerminalProxy::new(&endpoints.proxy_base_url, retries)?);
        let dominance = DominanceSync::new(TerminalProxy::new(&endpoints.proxy_base_url, retries)?);

        let feed_mode = ticker.mode();
        let markets_error = markets.error_flag();

        let tasks = vec![
            ("ticker", tokio::spawn(ticker.run(store.clone(), cancel.child_token()))),
            (
                "sentiment",
                tokio::spawn(run_polling(sentiment, store.clone(), settings.sentiment_interval, cancel.child_token())),
            ),
            (
                "ratio",
                tokio::spawn(run_polling(ratio, store.clone(), settings.ratio_interval, cancel.child_token())),
            ),
            (
                "funding",
                tokio::spawn(run_polling(funding, store.clone(), settings.funding_interval, cancel.child_token())),
            ),
            (
                "markets",
                tokio::spawn(run_polling(markets, store.clone(), settings.markets_interval, cancel.child_token())),
            ),
            (
                "dominance",
                tokio::spawn(run_polling(dominance, store, settings.dominance_interval, cancel.child_token())),
            ),
        ];
        log::info!("Spawned {} synchronizers", tasks.len());

        Ok(Self {
            cancel,
            tasks,
            feed_mode,
            markets_error,
        })
    }

    /// Current ticker feed mode, for health reporting.
    pub fn feed_mode(&self) -> watch::Receiver<FeedMode> {
        self.feed_mode.clone()
    }

    /// Market listing error flag, for views showing a banner.
    pub fn markets_error(&self) -> watch::Receiver<bool> {
        self.markets_error.clone()
    }

    /// Cancels every synchronizer and waits for them to stop. Tasks blocked on
    /// a slow request past the grace period are aborted.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for (name, mut handle) in self.tasks {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await {
                Ok(Ok(())) => log::debug!("{} synchronizer stopped", name),
                Ok(Err(e)) => log::error!("{} synchronizer task failed: {}", name, e),
                Err(_) => {
                    log::warn!("{} synchronizer still busy after {:?}, aborting", name, SHUTDOWN_GRACE);
                    handle.abort();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bad_endpoint_is_rejected() {
        let endpoints = SyncEndpoints {
            proxy_base_url: "::not a url::".to_string(),
            ..Default::default()
        };
        let res = SyncSet::spawn(
            Arc::new(MarketStore::new()),
            &endpoints,
            &SyncSettings::default(),
            &CancellationToken::new(),
        );
        assert!(matches!(res, Err(FetchError::Url(_))));
    }

    #[tokio::test]
    async fn test_spawn_and_shutdown_against_dead_hosts() {
        // Port 9 (discard) on loopback: every request fails fast.
        let dead = "http://127.0.0.1:9/".to_string();
        let endpoints = SyncEndpoints {
            binance_ws_url: "ws://127.0.0.1:9/ws".to_string(),
            binance_rest_base_url: dead.clone(),
            binance_futures_base_url: dead.clone(),
            alternative_base_url: dead.clone(),
            bybit_base_url: dead.clone(),
            proxy_base_url: dead,
            ..Default::default()
        };
        let store = Arc::new(MarketStore::new());
        let set = SyncSet::spawn(store.clone(), &endpoints, &SyncSettings::default(), &CancellationToken::new())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(*set.markets_error().borrow());
        set.shutdown().await;
        assert_eq!(store.snapshot(), Default::default());
    }
}
