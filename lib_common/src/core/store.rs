//! # Market Store
//!
//! The single shared state container. Synchronizers write, views read and
//! subscribe. One `watch` channel per field holds the latest value, and a
//! `broadcast` channel announces which field changed so a subscriber can be
//! woken only for the fields it cares about.
//!
//! ## Rules
//! - Every field starts absent (`None`) and is never cleared afterwards.
//! - Writes replace the whole value. The ticker is the one exception: it is
//!   updated through a function of the previous value so `previous_price` can
//!   carry forward.
//! - A write that leaves the value unchanged does not notify anyone.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;

use crate::core::snapshots::{
    DominanceSnapshot, FundingRateEntry, MarketCoin, RatioSnapshot, SentimentSnapshot,
    TickerSnapshot,
};

/// Capacity of the change-notification channel. A subscriber that falls further
/// behind than this is told to re-read every field it watches.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Names of the store fields, used for subscriptions and change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreField {
    Ticker,
    Sentiment,
    Ratio,
    FundingRates,
    Markets,
    Dominance,
}

impl StoreField {
    /// Every field, in a stable order.
    pub const ALL: [StoreField; 6] = [
        StoreField::Ticker,
        StoreField::Sentiment,
        StoreField::Ratio,
        StoreField::FundingRates,
        StoreField::Markets,
        StoreField::Dominance,
    ];
}

/// A point-in-time copy of every field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub ticker: Option<TickerSnapshot>,
    pub sentiment: Option<SentimentSnapshot>,
    pub ratio: Option<RatioSnapshot>,
    pub funding_rates: Option<Vec<FundingRateEntry>>,
    pub markets: Option<Vec<MarketCoin>>,
    pub dominance: Option<DominanceSnapshot>,
}

/// Shared observable state. Wrap it in an `Arc` and hand a clone to every
/// synchronizer and view.
pub struct MarketStore {
    ticker: watch::Sender<Option<TickerSnapshot>>,
    sentiment: watch::Sender<Option<SentimentSnapshot>>,
    ratio: watch::Sender<Option<RatioSnapshot>>,
    funding_rates: watch::Sender<Option<Vec<FundingRateEntry>>>,
    markets: watch::Sender<Option<Vec<MarketCoin>>>,
    dominance: watch::Sender<Option<DominanceSnapshot>>,
    changes: broadcast::Sender<StoreField>,
}

impl Default for MarketStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketStore {
    /// Creates a store with every field absent.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            ticker: watch::Sender::new(None),
            sentiment: watch::Sender::new(None),
            ratio: watch::Sender::new(None),
            funding_rates: watch::Sender::new(None),
            markets: watch::Sender::new(None),
            dominance: watch::Sender::new(None),
            changes,
        }
    }

    fn replace<T: PartialEq>(&self, slot: &watch::Sender<Option<T>>, field: StoreField, value: T) {
        let changed = slot.send_if_modified(|current| {
            if current.as_ref() == Some(&value) {
                false
            } else {
                *current = Some(value);
                true
            }
        });
        if changed {
            self.notify(field);
        }
    }

    fn notify(&self, field: StoreField) {
        // No receivers is fine: nobody is watching yet.
        let _ = self.changes.send(field);
    }

    /// Computes the next ticker from the previous one. Returning `None` keeps
    /// the current value.
    pub fn update_ticker<F>(&self, update: F)
    where
        F: FnOnce(Option<&TickerSnapshot>) -> Option<TickerSnapshot>,
    {
        let changed = self.ticker.send_if_modified(|current| match update(current.as_ref()) {
            Some(next) if current.as_ref() != Some(&next) => {
                *current = Some(next);
                true
            }
            _ => false,
        });
        if changed {
            self.notify(StoreField::Ticker);
        }
    }

    pub fn set_sentiment(&self, value: SentimentSnapshot) {
        self.replace(&self.sentiment, StoreField::Sentiment, value);
    }

    pub fn set_ratio(&self, value: RatioSnapshot) {
        self.replace(&self.ratio, StoreField::Ratio, value);
    }

    /// Replaces the funding list as a whole.
    pub fn set_funding_rates(&self, value: Vec<FundingRateEntry>) {
        self.replace(&self.funding_rates, StoreField::FundingRates, value);
    }

    /// Replaces the market listing as a whole.
    pub fn set_markets(&self, value: Vec<MarketCoin>) {
        self.replace(&self.markets, StoreField::Markets, value);
    }

    pub fn set_dominance(&self, value: DominanceSnapshot) {
        self.replace(&self.dominance, StoreField::Dominance, value);
    }

    pub fn ticker(&self) -> Option<TickerSnapshot> {
        self.ticker.borrow().clone()
    }

    pub fn sentiment(&self) -> Option<SentimentSnapshot> {
        self.sentiment.borrow().clone()
    }

    pub fn ratio(&self) -> Option<RatioSnapshot> {
        self.ratio.borrow().clone()
    }

    pub fn funding_rates(&self) -> Option<Vec<FundingRateEntry>> {
        self.funding_rates.borrow().clone()
    }

    pub fn markets(&self) -> Option<Vec<MarketCoin>> {
        self.markets.borrow().clone()
    }

    pub fn dominance(&self) -> Option<DominanceSnapshot> {
        self.dominance.borrow().clone()
    }

    /// Copies every field.
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            ticker: self.ticker(),
            sentiment: self.sentiment(),
            ratio: self.ratio(),
            funding_rates: self.funding_rates(),
            markets: self.markets(),
            dominance: self.dominance(),
        }
    }

    /// Subscribes to changes of the given fields. An empty slice means all of them.
    pub fn subscribe(&self, fields: &[StoreField]) -> StoreSubscription {
        let mut sub = StoreSubscription {
            rx: self.changes.subscribe(),
            wanted: Vec::new(),
            pending: VecDeque::new(),
        };
        sub.set_fields(fields);
        sub
    }
}

/// Change feed filtered to a set of fields.
pub struct StoreSubscription {
    rx: broadcast::Receiver<StoreField>,
    wanted: Vec<StoreField>,
    pending: VecDeque<StoreField>,
}

impl StoreSubscription {
    /// Replaces the watched set. An empty slice means all fields.
    pub fn set_fields(&mut self, fields: &[StoreField]) {
        self.wanted = if fields.is_empty() {
            StoreField::ALL.to_vec()
        } else {
            let mut wanted = Vec::with_capacity(fields.len());
            for f in fields {
                if !wanted.contains(f) {
                    wanted.push(*f);
                }
            }
            wanted
        };
        let wanted = &self.wanted;
        self.pending.retain(|f| wanted.contains(f));
    }

    pub fn fields(&self) -> &[StoreField] {
        &self.wanted
    }

    /// Waits for the next change to a watched field. Returns `None` once the
    /// store has been dropped.
    pub async fn changed(&mut self) -> Option<StoreField> {
        loop {
            if let Some(field) = self.pending.pop_front() {
                return Some(field);
            }
            match self.rx.recv().await {
                Ok(field) if self.wanted.contains(&field) => return Some(field),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    log::debug!("Store subscriber lagged by {} changes, resyncing", skipped);
                    self.pending.extend(self.wanted.iter().copied());
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ticker(price: &str) -> impl FnOnce(Option<&TickerSnapshot>) -> Option<TickerSnapshot> + '_ {
        move |prev| TickerSnapshot::next(prev, price, "1", "0.5")
    }

    #[test]
    fn test_fields_start_absent() {
        let store = MarketStore::new();
        assert_eq!(store.snapshot(), StoreSnapshot::default());
    }

    #[test]
    fn test_update_ticker_carries_previous() {
        let store = MarketStore::new();
        store.update_ticker(ticker("100"));
        store.update_ticker(ticker("105.5"));
        let t = store.ticker().unwrap();
        assert_eq!(t.price, "105.50");
        assert_eq!(t.previous_price, "100.00");
    }

    #[test]
    fn test_update_ticker_none_keeps_value() {
        let store = MarketStore::new();
        store.update_ticker(ticker("100"));
        store.update_ticker(|_| None);
        assert_eq!(store.ticker().unwrap().price, "100.00");
    }

    #[tokio::test]
    async fn test_subscription_only_sees_watched_fields() {
        let store = MarketStore::new();
        let mut sub = store.subscribe(&[StoreField::Ratio]);

        store.set_dominance(DominanceSnapshot::from_shares(50.0, 10.0));
        store.set_ratio(RatioSnapshot::from_fractions("0.6", "0.4").unwrap());

        assert_eq!(sub.changed().await, Some(StoreField::Ratio));
    }

    #[tokio::test]
    async fn test_unchanged_write_does_not_notify() {
        let store = MarketStore::new();
        let mut sub = store.subscribe(&[]);
        let sentiment = SentimentSnapshot::from_reading("40", "Fear").unwrap();

        store.set_sentiment(sentiment.clone());
        store.set_sentiment(sentiment);

        assert_eq!(sub.changed().await, Some(StoreField::Sentiment));
        let second = tokio::time::timeout(Duration::from_millis(50), sub.changed()).await;
        assert!(second.is_err(), "identical write must not notify");
    }

    #[tokio::test]
    async fn test_lagged_subscriber_resyncs_watched_fields() {
        let store = MarketStore::new();
        let mut sub = store.subscribe(&[StoreField::Ticker, StoreField::Markets]);

        for i in 0..(CHANGE_CHANNEL_CAPACITY + 10) {
            let price = format!("{}", 100 + i);
            store.update_ticker(|prev| TickerSnapshot::next(prev, &price, "0", "0"));
        }

        assert_eq!(sub.changed().await, Some(StoreField::Ticker));
        assert_eq!(sub.changed().await, Some(StoreField::Markets));
    }

    #[tokio::test]
    async fn test_closed_store_ends_subscription() {
        let store = MarketStore::new();
        let mut sub = store.subscribe(&[]);
        drop(store);
        assert_eq!(sub.changed().await, None);
    }
}
