//! Market dominance poller, through the terminal proxy. "Others" is derived
//! locally as `100 - btc - eth`.

use crate::core::snapshots::DominanceSnapshot;
use crate::core::store::MarketStore;
use crate::ingestors::polling::PollingSource;
use crate::ingestors::SyncError;
use crate::markets::TerminalProxy;

pub struct DominanceSync {
    proxy: TerminalProxy,
}

impl DominanceSync {
    pub fn new(proxy: TerminalProxy) -> Self {
        Self { proxy }
    }
}

impl PollingSource for DominanceSync {
    type Output = DominanceSnapshot;
    const NAME: &'static str = "dominance";

    async fn fetch(&self) -> Result<DominanceSnapshot, SyncError> {
        let global = self.proxy.global().await?;
        let shares = global.data.market_cap_percentage;
        Ok(DominanceSnapshot::from_shares(shares.btc, shares.eth))
    }

    fn apply(&self, store: &MarketStore, output: DominanceSnapshot) {
        store.set_dominance(output);
    }
}
