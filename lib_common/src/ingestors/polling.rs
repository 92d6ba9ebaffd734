//! # Polling Loop
//!
//! Every REST synchronizer is a `PollingSource` driven by `run_polling`: fetch
//! immediately, then once per interval, until the cancellation token fires.
//!
//! An in-flight fetch is not aborted on cancellation. Its result is simply
//! dropped so nothing is written after teardown.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::core::store::MarketStore;
use crate::ingestors::SyncError;
use crate::markets::UpstreamError;

/// One REST-polled data domain.
pub trait PollingSource: Send + Sync + 'static {
    /// Validated, converted value ready for the store.
    type Output: Send;

    /// Name used in log lines.
    const NAME: &'static str;

    /// Performs one fetch-validate-convert cycle.
    fn fetch(&self) -> impl Future<Output = Result<Self::Output, SyncError>> + Send;

    /// Writes a successful result.
    fn apply(&self, store: &MarketStore, output: Self::Output);

    /// Called after a failed cycle, once it has been logged.
    fn on_failure(&self, _error: &SyncError) {}
}

/// Runs `source` every `every` until `cancel` fires. The first fetch is immediate.
pub async fn run_polling<S: PollingSource>(
    source: S,
    store: Arc<MarketStore>,
    every: Duration,
    cancel: CancellationToken,
) {
    log::info!("{} poller started (every {:?})", S::NAME, every);

    let mut interval = tokio::time::interval(every);
    // A slow fetch pushes the schedule back instead of causing a burst.
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let result = source.fetch().await;
        if cancel.is_cancelled() {
            log::debug!("{} poller torn down mid-fetch, discarding result", S::NAME);
            break;
        }

        match result {
            Ok(output) => source.apply(&store, output),
            Err(error) => {
                log_failure(S::NAME, &error);
                source.on_failure(&error);
            }
        }
    }

    log::info!("{} poller stopped", S::NAME);
}

pub(crate) fn log_failure(name: &str, error: &SyncError) {
    match error {
        SyncError::Upstream(UpstreamError::Invalid(e)) => {
            log::warn!("{}: payload failed schema {}: {}", name, e.schema, e.description)
        }
        SyncError::Rejected(reason) => log::info!("{}: discarded reading: {}", name, reason),
        other => log::warn!("{}: fetch failed: {}", name, other),
    }
}
