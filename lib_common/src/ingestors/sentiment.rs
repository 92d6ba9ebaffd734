//! Fear & Greed poller. Takes the newest reading and keeps it only if the index
//! is an integer in `0..=100`.

use crate::core::snapshots::SentimentSnapshot;
use crate::core::store::MarketStore;
use crate::ingestors::polling::PollingSource;
use crate::ingestors::SyncError;
use crate::markets::{AlternativeMe, UpstreamError};

pub struct SentimentSync {
    client: AlternativeMe,
}

impl SentimentSync {
    pub fn new(client: AlternativeMe) -> Self {
        Self { client }
    }
}

impl PollingSource for SentimentSync {
    type Output = SentimentSnapshot;
    const NAME: &'static str = "sentiment";

    async fn fetch(&self) -> Result<SentimentSnapshot, SyncError> {
        let response = self.client.fear_greed().await?;
        let latest = response
            .data
            .first()
            .ok_or(UpstreamError::Empty("fng"))?;

        SentimentSnapshot::from_reading(&latest.value, &latest.value_classification).ok_or_else(|| {
            SyncError::Rejected(format!("index '{}' is not an integer in 0..=100", latest.value))
        })
    }

    fn apply(&self, store: &MarketStore, output: SentimentSnapshot) {
        store.set_sentiment(output);
    }
}
