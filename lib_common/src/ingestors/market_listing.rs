//! Top-N market listing poller, through the terminal proxy.
//!
//! On failure the previous list stays and an error flag is raised for views
//! that want to show a banner. The next successful cycle lowers it.

use tokio::sync::watch;

use crate::core::snapshots::MarketCoin;
use crate::core::store::MarketStore;
use crate::ingestors::polling::PollingSource;
use crate::ingestors::SyncError;
use crate::markets::{TerminalProxy, UpstreamError};
use crate::validation::CoinGeckoMarket;

pub struct MarketListingSync {
    proxy: TerminalProxy,
    error: watch::Sender<bool>,
}

impl MarketListingSync {
    pub fn new(proxy: TerminalProxy) -> Self {
        Self {
            proxy,
            error: watch::Sender::new(false),
        }
    }

    /// `true` while the most recent cycle failed.
    pub fn error_flag(&self) -> watch::Receiver<bool> {
        self.error.subscribe()
    }

    fn set_error(&self, failed: bool) {
        self.error.send_if_modified(|current| {
            let changed = *current != failed;
            *current = failed;
            changed
        });
    }
}

impl From<CoinGeckoMarket> for MarketCoin {
    fn from(row: CoinGeckoMarket) -> Self {
        MarketCoin {
            id: row.id,
            symbol: row.symbol,
            name: row.name,
            current_price: row.current_price,
            change_percent_24h: row.price_change_percentage_24h,
            market_cap: row.market_cap,
        }
    }
}

impl PollingSource for MarketListingSync {
    type Output = Vec<MarketCoin>;
    const NAME: &'static str = "markets";

    async fn fetch(&self) -> Result<Vec<MarketCoin>, SyncError> {
        let rows = self.proxy.markets().await?;
        if rows.is_empty() {
            return Err(UpstreamError::Empty("markets").into());
        }
        Ok(rows.into_iter().map(MarketCoin::from).collect())
    }

    fn apply(&self, store: &MarketStore, output: Vec<MarketCoin>) {
        self.set_error(false);
        store.set_markets(output);
    }

    fn on_failure(&self, _error: &SyncError) {
        self.set_error(true);
    }
}
