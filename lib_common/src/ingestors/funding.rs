//! # Funding Rate Poller
//!
//! Fetches the latest funding rate of every tracked perpetual concurrently.
//! Symbols fail independently: the stored list is exactly the subset that
//! succeeded in this cycle, in configured order. If none succeeded the previous
//! list stays.

use futures_util::future::join_all;

use crate::core::snapshots::FundingRateEntry;
use crate::core::store::MarketStore;
use crate::ingestors::polling::{log_failure, PollingSource};
use crate::ingestors::SyncError;
use crate::markets::BinanceFutures;

pub struct FundingSync {
    client: BinanceFutures,
    symbols: Vec<String>,
}

impl FundingSync {
    pub fn new(client: BinanceFutures, symbols: Vec<String>) -> Self {
        Self { client, symbols }
    }

    async fn fetch_one(&self, symbol: &str) -> Result<FundingRateEntry, SyncError> {
        let record = self.client.latest_funding_rate(symbol).await?;
        FundingRateEntry::from_fraction(symbol, &record.funding_rate).ok_or_else(|| {
            SyncError::Rejected(format!("{}: unparseable rate '{}'", symbol, record.funding_rate))
        })
    }
}

impl PollingSource for FundingSync {
    type Output = Vec<FundingRateEntry>;
    const NAME: &'static str = "funding";

    async fn fetch(&self) -> Result<Vec<FundingRateEntry>, SyncError> {
        let results = join_all(self.symbols.iter().map(|s| self.fetch_one(s))).await;

        let mut entries = Vec::with_capacity(results.len());
        for (symbol, result) in self.symbols.iter().zip(results) {
            match result {
                Ok(entry) => entries.push(entry),
                Err(e) => log_failure(&format!("funding[{}]", symbol), &e),
            }
        }

        if entries.is_empty() {
            return Err(SyncError::Rejected(format!(
                "none of {} symbols returned a funding rate",
                self.symbols.len()
            )));
        }
        Ok(entries)
    }

    fn apply(&self, store: &MarketStore, output: Vec<FundingRateEntry>) {
        store.set_funding_rates(output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::snapshots::FundingBias;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_rate(server: &MockServer, symbol: &str, rate: &str) {
        Mock::given(method("GET"))
            .and(path("/fundingRate"))
            .and(query_param("symbol", symbol))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"symbol": symbol, "fundingTime": 1700000000000u64, "fundingRate": rate}
            ])))
            .mount(server)
            .await;
    }

    fn symbols() -> Vec<String> {
        ["BTCUSDT", "ETHUSDT", "SOLUSDT", "XRPUSDT"].iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_all_symbols() {
        let server = MockServer::start().await;
        mount_rate(&server, "BTCUSDT", "0.00010000").await;
        mount_rate(&server, "ETHUSDT", "0.00020000").await;
        mount_rate(&server, "SOLUSDT", "-0.00010000").await;
        mount_rate(&server, "XRPUSDT", "0.00005000").await;

        let sync = FundingSync::new(BinanceFutures::new(&server.uri(), 0).unwrap(), symbols());
        let entries = sync.fetch().await.unwrap();

        let names: Vec<_> = entries.iter().map(|e| e.symbol.as_str()).collect();
        assert_eq!(names, ["BTC", "ETH", "SOL", "XRP"]);
        assert_eq!(entries[0].rate_percent, "0.0100");
        assert_eq!(entries[0].bias, FundingBias::Neutral);
        assert_eq!(entries[1].bias, FundingBias::Bullish);
        assert_eq!(entries[2].bias, FundingBias::Bearish);
        assert_eq!(entries[3].rate_percent, "0.0050");
    }

    #[tokio::test]
    async fn test_all_failing_keeps_previous_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fundingRate"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = MarketStore::new();
        let previous = vec![FundingRateEntry::from_fraction("BTCUSDT", "0.0001").unwrap()];
        store.set_funding_rates(previous.clone());

        let sync = FundingSync::new(BinanceFutures::new(&server.uri(), 0).unwrap(), symbols());
        assert!(matches!(sync.fetch().await, Err(SyncError::Rejected(_))));
        assert_eq!(store.funding_rates(), Some(previous));
    }
}
