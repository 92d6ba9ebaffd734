//! # Market Data Clients
//!
//! One thin client per upstream provider. Each wraps an `ApiClient`, shapes the
//! request the way the provider expects, and runs the body through
//! `validation` before returning a typed value.
//!
//! ## Contained Modules
//!
//! - **`binance`**: spot 24h ticker (REST fallback for the stream), the stream
//!   URL, and futures funding rates.
//! - **`alternative`**: the alternative.me Fear & Greed index.
//! - **`bybit`**: long/short account ratio.
//! - **`coingecko`**: global dominance and the top-N market listing, with the
//!   frozen fallback payloads served by the proxy.
//! - **`terminal_proxy`**: the same two CoinGecko resources reached through
//!   this project's own rate-limited proxy.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use thiserror::Error;

use crate::retrieve::FetchError;
use crate::validation::ValidationError;

/// Binance spot and futures.
pub mod binance;
/// alternative.me Fear & Greed.
pub mod alternative;
/// Bybit account ratio.
pub mod bybit;
/// CoinGecko global and markets, plus fallbacks.
pub mod coingecko;
/// Client for the terminal's own proxy routes.
pub mod terminal_proxy;

pub use alternative::AlternativeMe;
pub use binance::{BinanceFutures, BinanceSpot};
pub use bybit::Bybit;
pub use coingecko::CoinGecko;
pub use terminal_proxy::TerminalProxy;

/// Why an upstream call produced no usable value.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Transport, status or content-type failure.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The body did not match its schema.
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// The body was well formed but carried no entries.
    #[error("{0} returned no entries")]
    Empty(&'static str),
}
