//! Long/short account ratio poller (Bybit).

use crate::core::snapshots::RatioSnapshot;
use crate::core::store::MarketStore;
use crate::ingestors::polling::PollingSource;
use crate::ingestors::SyncError;
use crate::markets::Bybit;

pub struct RatioSync {
    client: Bybit,
    symbol: String,
}

impl RatioSync {
    pub fn new(client: Bybit, symbol: impl Into<String>) -> Self {
        Self {
            client,
            symbol: symbol.into(),
        }
    }
}

impl PollingSource for RatioSync {
    type Output = RatioSnapshot;
    const NAME: &'static str = "ratio";

    async fn fetch(&self) -> Result<RatioSnapshot, SyncError> {
        let response = self.client.account_ratio(&self.symbol).await?;
        if response.ret_code != 0 {
            return Err(SyncError::Rejected(format!("retCode {}", response.ret_code)));
        }
        let latest = response
            .result
            .list
            .first()
            .ok_or_else(|| SyncError::Rejected("empty ratio list".to_string()))?;

        RatioSnapshot::from_fractions(&latest.buy_ratio, &latest.sell_ratio).ok_or_else(|| {
            SyncError::Rejected(format!(
                "unparseable ratios buy='{}' sell='{}'",
                latest.buy_ratio, latest.sell_ratio
            ))
        })
    }

    fn apply(&self, store: &MarketStore, output: RatioSnapshot) {
        store.set_ratio(output);
    }
}
