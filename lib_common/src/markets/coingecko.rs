//! # CoinGecko
//!
//! Direct client for the two CoinGecko resources the proxy relays, and the
//! frozen payloads it serves when CoinGecko cannot be used. Both fallbacks pass
//! the same schemas as live data.

use crate::markets::UpstreamError;
use crate::retrieve::{ApiClient, FetchError};
use crate::validation::{
    validate, CoinGeckoGlobal, CoinGeckoGlobalData, CoinGeckoMarket, MarketCapPercentage,
};

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3/";

/// Query of the top-10 listing.
pub const MARKETS_QUERY: [(&str, &str); 5] = [
    ("vs_currency", "usd"),
    ("order", "market_cap_desc"),
    ("per_page", "10"),
    ("page", "1"),
    ("sparkline", "false"),
];

pub struct CoinGecko {
    api: ApiClient,
}

impl CoinGecko {
    pub fn new(base_url: &str, retries: u32) -> Result<Self, FetchError> {
        Ok(Self {
            api: ApiClient::with_retries(base_url, retries)?,
        })
    }

    /// `GET global`.
    pub async fn global(&self) -> Result<CoinGeckoGlobal, UpstreamError> {
        let raw = self.api.get_json("global", &[]).await?;
        Ok(validate::<CoinGeckoGlobal>(&raw)?)
    }

    /// `GET coins/markets`, top 10 by market cap in USD.
    pub async fn markets(&self) -> Result<Vec<CoinGeckoMarket>, UpstreamError> {
        let raw = self.api.get_json("coins/markets", &MARKETS_QUERY).await?;
        Ok(validate::<Vec<CoinGeckoMarket>>(&raw)?)
    }
}

/// Dominance snapshot served when the live one is unavailable.
pub fn fallback_global() -> CoinGeckoGlobal {
    CoinGeckoGlobal {
        data: CoinGeckoGlobalData {
            market_cap_percentage: MarketCapPercentage { btc: 56.8, eth: 12.4 },
        },
    }
}

/// Top-10 listing served when the live one is unavailable.
pub fn fallback_markets() -> Vec<CoinGeckoMarket> {
    const ROWS: [(&str, &str, f64, f64); 10] = [
        ("bitcoin", "btc", 98234.0, 2.4),
        ("ethereum", "eth", 3821.0, 1.8),
        ("tether", "usdt", 1.00, 0.01),
        ("solana", "sol", 234.0, 5.2),
        ("binancecoin", "bnb", 712.0, 1.3),
        ("ripple", "xrp", 2.42, 3.1),
        ("usd-coin", "usdc", 1.00, 0.0),
        ("cardano", "ada", 1.08, 2.7),
        ("dogecoin", "doge", 0.42, 4.2),
        ("avalanche-2", "avax", 51.2, -1.2),
    ];

    ROWS.iter()
        .map(|&(id, symbol, price, change)| CoinGeckoMarket {
            id: id.to_string(),
            symbol: symbol.to_string(),
            name: None,
            current_price: price,
            price_change_percentage_24h: change,
            market_cap: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::normalize;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_fallbacks_pass_their_schemas() {
        let global = serde_json::to_value(fallback_global()).unwrap();
        assert_eq!(normalize::<CoinGeckoGlobal>(&global).unwrap(), global);
        assert_eq!(global, json!({"data": {"market_cap_percentage": {"btc": 56.8, "eth": 12.4}}}));

        let markets = serde_json::to_value(fallback_markets()).unwrap();
        let parsed = validate::<Vec<CoinGeckoMarket>>(&markets).unwrap();
        assert_eq!(parsed.len(), 10);
        assert_eq!(parsed[0].id, "bitcoin");
        assert_eq!(parsed[9].price_change_percentage_24h, -1.2);
    }

    #[tokio::test]
    async fn test_markets_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/coins/markets"))
            .and(header("accept", "application/json"))
            .and(query_param("vs_currency", "usd"))
            .and(query_param("order", "market_cap_desc"))
            .and(query_param("per_page", "10"))
            .and(query_param("sparkline", "false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "bitcoin", "symbol": "btc", "name": "Bitcoin", "current_price": 1.0,
                 "price_change_percentage_24h": 0.5, "market_cap": 100.0}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let cg = CoinGecko::new(&server.uri(), 0).unwrap();
        let rows = cg.markets().await.unwrap();
        assert_eq!(rows[0].name.as_deref(), Some("Bitcoin"));
    }
}
