//! # Synchronizers
//!
//! One synchronizer per upstream data domain. Each owns its cadence and its
//! failure policy, writes into the shared `MarketStore` on success, and leaves
//! the store untouched on failure. Nothing here ever clears a field.
//!
//! ## Contained Modules
//! - **`ticker_wss`**: the BTC/USDT stream with permanent fallback to REST
//!   polling after repeated connection errors.
//! - **`polling`**: the `PollingSource` trait and the shared interval loop.
//! - **`sentiment`**, **`ratio`**, **`funding`**, **`market_listing`**,
//!   **`dominance`**: the five REST pollers.
//! - **`supervisor`**: spawns the whole set and tears it down.
//!
//! Errors never cross a synchronizer boundary. They are logged and reduced to
//! "store unchanged".

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use std::time::Duration;

use thiserror::Error;

use crate::markets::UpstreamError;

/// Streaming ticker with REST fallback.
pub mod ticker_wss;
/// Interval loop shared by every poller.
pub mod polling;
/// Fear & Greed poller.
pub mod sentiment;
/// Long/short ratio poller.
pub mod ratio;
/// Multi-symbol funding rate poller.
pub mod funding;
/// Top-N market listing poller.
pub mod market_listing;
/// Market dominance poller.
pub mod dominance;
/// Spawns and stops the full set.
pub mod supervisor;

pub use dominance::DominanceSync;
pub use funding::FundingSync;
pub use market_listing::MarketListingSync;
pub use polling::{run_polling, PollingSource};
pub use ratio::RatioSync;
pub use sentiment::SentimentSync;
pub use supervisor::{SyncEndpoints, SyncSet};
pub use ticker_wss::{FeedConnector, FeedError, TickerFeed, TickerQuotes, TickerSync, WsConnector};

/// Why a synchronizer cycle produced no write.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The upstream call or its validation failed.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// The payload was well formed but its content was unusable
    /// (out-of-range index, non-zero `retCode`, unparseable number).
    #[error("payload rejected: {0}")]
    Rejected(String),
}

/// Cadences and thresholds of every synchronizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Fixed delay before reconnecting the ticker stream.
    pub reconnect_delay: Duration,
    /// Consecutive stream errors before switching to REST for good.
    pub max_stream_failures: u32,
    /// REST ticker cadence once streaming is abandoned.
    pub ticker_poll_interval: Duration,
    pub sentiment_interval: Duration,
    pub ratio_interval: Duration,
    pub funding_interval: Duration,
    pub markets_interval: Duration,
    pub dominance_interval: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            max_stream_failures: 3,
            ticker_poll_interval: Duration::from_secs(3),
            sentiment_interval: Duration::from_secs(5 * 60),
            ratio_interval: Duration::from_secs(5 * 60),
            funding_interval: Duration::from_secs(8 * 60 * 60),
            markets_interval: Duration::from_secs(60),
            dominance_interval: Duration::from_secs(5 * 60),
        }
    }
}
