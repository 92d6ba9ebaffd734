//! # Validation Layer
//!
//! Every upstream payload passes through here before it is allowed anywhere near
//! shared state. A payload is either narrowed to its typed shape or rejected with
//! a `ValidationError` naming the schema that refused it. There is no
//! best-effort partial object.
//!
//! ## Rules enforced
//! - **Presence**: required fields must exist.
//! - **Primitive types**: decimal strings stay strings, numbers stay numbers. A
//!   price sent as `"42"` where a number is expected is a failure, and vice versa.
//! - **Minimum lengths**: lists the source guarantees to be non-empty are checked
//!   through `Schema::check`.
//!
//! Validation is pure: no logging, no I/O. Callers log failures with
//! `ValidationError::schema` and skip the write.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Typed shapes for every upstream response.
pub mod schemas;

pub use schemas::*;

/// A payload failed to match its schema.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{schema} validation failed: {description}")]
pub struct ValidationError {
    /// Name of the schema that rejected the payload.
    pub schema: &'static str,
    /// Human readable description of the first violation found.
    pub description: String,
}

/// A named, strictly typed upstream shape.
///
/// The serde derive covers presence and primitive types; `check` adds any
/// constraint serde cannot express, such as a minimum list length.
pub trait Schema: DeserializeOwned + Serialize {
    /// Name used in logs and errors.
    const NAME: &'static str;

    /// Additional structural constraints, run after deserialization succeeded.
    fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Narrows an untyped JSON value to `S`, or explains why it cannot.
pub fn validate<S: Schema>(raw: &Value) -> Result<S, ValidationError> {
    let parsed = S::deserialize(raw).map_err(|e| ValidationError {
        schema: S::NAME,
        description: e.to_string(),
    })?;

    parsed.check().map_err(|description| ValidationError {
        schema: S::NAME,
        description,
    })?;

    Ok(parsed)
}

/// Validates a value and hands back its normalized JSON form (unknown fields dropped).
pub fn normalize<S: Schema>(raw: &Value) -> Result<Value, ValidationError> {
    let parsed = validate::<S>(raw)?;
    serde_json::to_value(&parsed).map_err(|e| ValidationError {
        schema: S::NAME,
        description: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ticker_frame_requires_strings() {
        let ok = json!({"c": "97000.10", "p": "-12.5", "P": "-0.01", "E": 1700000000});
        let frame = validate::<TickerStreamFrame>(&ok).unwrap();
        assert_eq!(frame.last_price, "97000.10");
        assert_eq!(frame.price_change_percent, "-0.01");

        let numeric = json!({"c": 97000.1, "p": "-12.5", "P": "-0.01"});
        let err = validate::<TickerStreamFrame>(&numeric).unwrap_err();
        assert_eq!(err.schema, "TickerStreamFrame");
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let raw = json!({"lastPrice": "1", "priceChange": "2"});
        let err = validate::<TickerRestQuote>(&raw).unwrap_err();
        assert_eq!(err.schema, "TickerRestQuote");
        assert!(err.description.contains("priceChangePercent"));
    }

    #[test]
    fn test_fear_greed_requires_one_entry() {
        let empty = json!({"data": []});
        let err = validate::<FearGreedResponse>(&empty).unwrap_err();
        assert_eq!(err.schema, "FearGreedResponse");

        let one = json!({"data": [{"value": "71", "value_classification": "Greed"}]});
        let parsed = validate::<FearGreedResponse>(&one).unwrap();
        assert_eq!(parsed.data[0].value_classification, "Greed");
    }

    #[test]
    fn test_markets_reject_string_prices() {
        let raw = json!([{"id": "bitcoin", "symbol": "btc", "current_price": "98234", "price_change_percentage_24h": 2.4}]);
        assert!(validate::<Vec<CoinGeckoMarket>>(&raw).is_err());
    }

    #[test]
    fn test_revalidating_normalized_payload_is_stable() {
        let raw = json!({
            "data": {
                "market_cap_percentage": {"btc": 56.8, "eth": 12.4, "usdt": 4.1},
                "active_cryptocurrencies": 15000
            }
        });
        let first = normalize::<CoinGeckoGlobal>(&raw).unwrap();
        let second = normalize::<CoinGeckoGlobal>(&first).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, json!({"data": {"market_cap_percentage": {"btc": 56.8, "eth": 12.4}}}));

        let markets = json!([
            {"id": "bitcoin", "symbol": "btc", "name": "Bitcoin", "current_price": 98234.0,
             "price_change_percentage_24h": 2.4, "market_cap": 1.9e12, "ath": 100000.0},
            {"id": "tether", "symbol": "usdt", "current_price": 1.0, "price_change_percentage_24h": 0.01}
        ]);
        let once = normalize::<Vec<CoinGeckoMarket>>(&markets).unwrap();
        let twice = normalize::<Vec<CoinGeckoMarket>>(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_ratio_schema_shape() {
        let raw = json!({"retCode": 0, "retMsg": "OK", "result": {"list": [{"symbol": "BTCUSDT", "buyRatio": "0.65", "sellRatio": "0.35", "timestamp": "1"}]}});
        let parsed = validate::<BybitRatioResponse>(&raw).unwrap();
        assert_eq!(parsed.ret_code, 0);
        assert_eq!(parsed.result.list[0].buy_ratio, "0.65");
    }
}
