//! # Snapshots
//!
//! The value types held by the `MarketStore`. Each is an immutable snapshot of
//! one data domain; a write replaces the whole value. Constructors take the raw
//! upstream strings/numbers and return `None` when they cannot be turned into a
//! valid snapshot, so callers never build a half-populated value.

use serde::Serialize;

/// Parses a decimal string and renders it with exactly two decimals.
pub fn two_decimals(raw: &str) -> Option<String> {
    let value = raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())?;
    Some(format!("{:.2}", value))
}

/// Latest BTC/USDT ticker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerSnapshot {
    /// Last price, two decimals.
    pub price: String,
    /// Absolute 24h change, two decimals.
    pub change: String,
    /// 24h change percent, two decimals.
    pub change_percent: String,
    /// Price of the prior snapshot. On the very first snapshot this is the
    /// raw upstream price, since nothing came before it.
    pub previous_price: String,
}

impl TickerSnapshot {
    /// Builds the next ticker from raw upstream decimal strings, carrying the
    /// previous price forward from `prev`.
    ///
    /// Returns `None` if any of the three values is not a finite number.
    pub fn next(
        prev: Option<&TickerSnapshot>,
        last_price: &str,
        price_change: &str,
        price_change_percent: &str,
    ) -> Option<Self> {
        let price = two_decimals(last_price)?;
        let change = two_decimals(price_change)?;
        let change_percent = two_decimals(price_change_percent)?;

        let previous_price = prev
            .map(|p| p.price.clone())
            .unwrap_or_else(|| last_price.to_string());

        Some(Self {
            price,
            change,
            change_percent,
            previous_price,
        })
    }
}

/// Fear & Greed reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentimentSnapshot {
    /// Index in `0..=100`.
    pub index: u8,
    /// Label such as "Extreme Fear".
    pub classification: String,
}

impl SentimentSnapshot {
    /// Accepts only an integer in `0..=100`; anything else yields `None`.
    pub fn from_reading(value: &str, classification: &str) -> Option<Self> {
        let index = value.trim().parse::<i64>().ok()?;
        if !(0..=100).contains(&index) {
            return None;
        }
        Some(Self {
            index: index as u8,
            classification: classification.to_string(),
        })
    }
}

/// Long/short account ratio, both sides in percent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatioSnapshot {
    pub long_percent: f64,
    pub short_percent: f64,
}

impl RatioSnapshot {
    /// Converts upstream fractions ("0.65") to percentages (65.0).
    pub fn from_fractions(buy_ratio: &str, sell_ratio: &str) -> Option<Self> {
        let long = buy_ratio.trim().parse::<f64>().ok().filter(|v| v.is_finite())?;
        let short = sell_ratio.trim().parse::<f64>().ok().filter(|v| v.is_finite())?;
        Some(Self {
            long_percent: long * 100.0,
            short_percent: short * 100.0,
        })
    }
}

/// Market-cap dominance split.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DominanceSnapshot {
    pub btc_percent: f64,
    pub eth_percent: f64,
    /// Always `100 - btc - eth`, computed locally.
    pub others_percent: f64,
}

impl DominanceSnapshot {
    pub fn from_shares(btc_percent: f64, eth_percent: f64) -> Self {
        Self {
            btc_percent,
            eth_percent,
            others_percent: 100.0 - btc_percent - eth_percent,
        }
    }
}

/// Direction implied by a funding rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FundingBias {
    Bullish,
    Neutral,
    Bearish,
}

impl FundingBias {
    /// `rate_percent > 0.01` is bullish, below zero is bearish, the rest neutral.
    pub fn classify(rate_percent: f64) -> Self {
        if rate_percent > 0.01 {
            FundingBias::Bullish
        } else if rate_percent < 0.0 {
            FundingBias::Bearish
        } else {
            FundingBias::Neutral
        }
    }
}

/// Funding rate for one tracked perpetual.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingRateEntry {
    /// Base asset, e.g. "BTC" for BTCUSDT.
    pub symbol: String,
    /// Rate in percent with four decimals, e.g. "0.0100".
    pub rate_percent: String,
    pub bias: FundingBias,
}

impl FundingRateEntry {
    /// Builds an entry from the exchange pair and the raw fractional rate.
    pub fn from_fraction(pair: &str, funding_rate: &str) -> Option<Self> {
        let fraction = funding_rate.trim().parse::<f64>().ok().filter(|v| v.is_finite())?;
        let rate = fraction * 100.0;
        let symbol = pair.strip_suffix("USDT").unwrap_or(pair).to_string();
        Some(Self {
            symbol,
            rate_percent: format!("{:.4}", rate),
            bias: FundingBias::classify(rate),
        })
    }
}

/// A row of the top-N market listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketCoin {
    pub id: String,
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub current_price: f64,
    pub change_percent_24h: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,
}
