//! # Binance
//!
//! Spot REST ticker and futures funding rates. The live ticker stream itself is
//! consumed by `ingestors::ticker_wss`; only its default URL lives here.

use crate::markets::UpstreamError;
use crate::retrieve::{ApiClient, FetchError};
use crate::validation::{validate, FundingRateRecord, TickerRestQuote};

/// BTC/USDT 24h ticker stream.
pub const DEFAULT_WS_URL: &str = "wss://stream.binance.com/ws/btcusdt@ticker";
/// Spot REST API root.
pub const DEFAULT_REST_BASE_URL: &str = "https://api.binance.com/api/v3/";
/// USDⓈ-M futures REST API root.
pub const DEFAULT_FUTURES_BASE_URL: &str = "https://fapi.binance.com/fapi/v1/";
/// Pair shown by the ticker.
pub const TICKER_SYMBOL: &str = "BTCUSDT";
/// Perpetuals whose funding rates are tracked by default.
pub const DEFAULT_FUNDING_SYMBOLS: [&str; 4] = ["BTCUSDT", "ETHUSDT", "SOLUSDT", "XRPUSDT"];

/// Spot market client.
pub struct BinanceSpot {
    api: ApiClient,
}

impl BinanceSpot {
    pub fn new(base_url: &str, retries: u32) -> Result<Self, FetchError> {
        Ok(Self {
            api: ApiClient::with_retries(base_url, retries)?,
        })
    }

    /// `GET ticker/24hr?symbol=<symbol>`.
    pub async fn ticker_24h(&self, symbol: &str) -> Result<TickerRestQuote, UpstreamError> {
        let raw = self.api.get_json("ticker/24hr", &[("symbol", symbol)]).await?;
        Ok(validate::<TickerRestQuote>(&raw)?)
    }
}

/// Futures market client.
pub struct BinanceFutures {
    api: ApiClient,
}

impl BinanceFutures {
    pub fn new(base_url: &str, retries: u32) -> Result<Self, FetchError> {
        Ok(Self {
            api: ApiClient::with_retries(base_url, retries)?,
        })
    }

    /// Most recent funding record for `symbol` (`fundingRate?symbol=..&limit=1`).
    pub async fn latest_funding_rate(&self, symbol: &str) -> Result<FundingRateRecord, UpstreamError> {
        let raw = self
            .api
            .get_json("fundingRate", &[("symbol", symbol), ("limit", "1")])
            .await?;
        validate::<Vec<FundingRateRecord>>(&raw)?
            .into_iter()
            .next()
            .ok_or(UpstreamError::Empty("fundingRate"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_ticker_24h() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ticker/24hr"))
            .and(query_param("symbol", "BTCUSDT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "symbol": "BTCUSDT", "lastPrice": "97000.00", "priceChange": "100.00", "priceChangePercent": "0.10"
            })))
            .mount(&server)
            .await;

        let spot = BinanceSpot::new(&server.uri(), 0).unwrap();
        let quote = spot.ticker_24h(TICKER_SYMBOL).await.unwrap();
        assert_eq!(quote.last_price, "97000.00");
    }

    #[tokio::test]
    async fn test_funding_empty_history() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fundingRate"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let futures = BinanceFutures::new(&server.uri(), 0).unwrap();
        let err = futures.latest_funding_rate("BTCUSDT").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Empty(_)));
    }

    #[tokio::test]
    async fn test_funding_invalid_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fundingRate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"fundingRate": 0.0001}])))
            .mount(&server)
            .await;

        let futures = BinanceFutures::new(&server.uri(), 0).unwrap();
        let err = futures.latest_funding_rate("ETHUSDT").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Invalid(ref e) if e.schema == "FundingRateHistory"));
    }
}
