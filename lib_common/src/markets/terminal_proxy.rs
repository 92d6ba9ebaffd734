//! Client for the terminal's own CoinGecko proxy (`/api/coingecko/{global,markets}`).
//!
//! The proxy answers 200 with fallback data on upstream trouble, so from here a
//! failure means the proxy itself is unreachable, rate limited (429), or served
//! something off-schema.

use crate::markets::UpstreamError;
use crate::retrieve::{ApiClient, FetchError};
use crate::validation::{validate, CoinGeckoGlobal, CoinGeckoMarket};

/// Default location of the proxy routes when the server runs locally.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000/api/coingecko/";

pub struct TerminalProxy {
    api: ApiClient,
}

impl TerminalProxy {
    pub fn new(base_url: &str, retries: u32) -> Result<Self, FetchError> {
        Ok(Self {
            api: ApiClient::with_retries(base_url, retries)?,
        })
    }

    pub async fn global(&self) -> Result<CoinGeckoGlobal, UpstreamError> {
        let raw = self.api.get_json("global", &[]).await?;
        Ok(validate::<CoinGeckoGlobal>(&raw)?)
    }

    pub async fn markets(&self) -> Result<Vec<CoinGeckoMarket>, UpstreamError> {
        let raw = self.api.get_json("markets", &[]).await?;
        Ok(validate::<Vec<CoinGeckoMarket>>(&raw)?)
    }
}
