//! Upstream response shapes.
//!
//! Field names follow the wire format through `serde(rename)`; the Rust side
//! uses descriptive names. Unknown fields are ignored on the way in and dropped
//! on the way out, so a validated value re-serializes to its normalized form.

use super::Schema;
use serde::{Deserialize, Serialize};

/// One frame of the Binance `<symbol>@ticker` stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerStreamFrame {
    /// Last price, decimal string.
    #[serde(rename = "c")]
    pub last_price: String,
    /// Absolute 24h price change, decimal string.
    #[serde(rename = "p")]
    pub price_change: String,
    /// 24h price change percent, decimal string.
    #[serde(rename = "P")]
    pub price_change_percent: String,
}

impl Schema for TickerStreamFrame {
    const NAME: &'static str = "TickerStreamFrame";
}

/// Binance `GET /api/v3/ticker/24hr` response, used while the stream is down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerRestQuote {
    /// Last price, decimal string.
    pub last_price: String,
    /// Absolute 24h price change, decimal string.
    pub price_change: String,
    /// 24h price change percent, decimal string.
    pub price_change_percent: String,
}

impl Schema for TickerRestQuote {
    const NAME: &'static str = "TickerRestQuote";
}

/// One reading of the alternative.me Fear & Greed index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FearGreedEntry {
    /// Index value as a string, expected to hold an integer in `0..=100`.
    pub value: String,
    /// Label such as "Extreme Fear" or "Greed".
    pub value_classification: String,
}

/// alternative.me `GET /fng/` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FearGreedResponse {
    /// Newest reading first. Always at least one entry.
    pub data: Vec<FearGreedEntry>,
}

impl Schema for FearGreedResponse {
    const NAME: &'static str = "FearGreedResponse";

    fn check(&self) -> Result<(), String> {
        if self.data.is_empty() {
            return Err("data: expected at least 1 element".to_string());
        }
        Ok(())
    }
}

/// A row of the CoinGecko markets listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinGeckoMarket {
    /// CoinGecko coin id, e.g. "bitcoin".
    pub id: String,
    /// Ticker symbol, lower case.
    pub symbol: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Price in USD.
    pub current_price: f64,
    /// 24h change in percent.
    pub price_change_percentage_24h: f64,
    /// Market capitalization in USD.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,
}

impl Schema for Vec<CoinGeckoMarket> {
    const NAME: &'static str = "CoinGeckoMarkets";
}

/// Market-cap share per asset, in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketCapPercentage {
    /// Bitcoin share.
    pub btc: f64,
    /// Ether share.
    pub eth: f64,
}

/// Body of the CoinGecko global response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinGeckoGlobalData {
    /// Dominance figures.
    pub market_cap_percentage: MarketCapPercentage,
}

/// CoinGecko `GET /global` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinGeckoGlobal {
    /// Wrapped payload.
    pub data: CoinGeckoGlobalData,
}

impl Schema for CoinGeckoGlobal {
    const NAME: &'static str = "CoinGeckoGlobal";
}

/// One bucket of the Bybit account ratio series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitRatioEntry {
    /// Share of long accounts as a fraction string, e.g. "0.65".
    pub buy_ratio: String,
    /// Share of short accounts as a fraction string.
    pub sell_ratio: String,
}

/// Result envelope of the Bybit ratio response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BybitRatioResult {
    /// Newest bucket first. May be empty.
    pub list: Vec<BybitRatioEntry>,
}

/// Bybit `GET /v5/market/account-ratio` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BybitRatioResponse {
    /// Zero on success.
    pub ret_code: i64,
    /// Payload.
    pub result: BybitRatioResult,
}

impl Schema for BybitRatioResponse {
    const NAME: &'static str = "BybitRatioResponse";
}

/// A row of Binance futures `GET /fapi/v1/fundingRate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingRateRecord {
    /// Funding rate as a fraction string, e.g. "0.00010000".
    pub funding_rate: String,
}

impl Schema for Vec<FundingRateRecord> {
    const NAME: &'static str = "FundingRateHistory";
}
