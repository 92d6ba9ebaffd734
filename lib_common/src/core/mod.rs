//! # Core Module
//!
//! State and policy shared by the synchronizers and the proxy.
//!
//! ## Components
//!
//! - **`snapshots`**: the immutable value types, one per data domain, and the
//!   conversions from raw upstream fields (two-decimal ticker formatting,
//!   funding bias, dominance "others").
//! - **`store`**: `MarketStore`, the shared observable container. Writers
//!   replace whole values; subscribers are notified only for changed fields.
//! - **`ratelimit`**: the fail-open sliding window quota used by the proxy.
//! - **`upstream_manager`**: the streaming ticker's mode machine
//!   (`Connecting`, `Streaming`, `Degrading`, `Polling`).

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Per-domain snapshot types.
pub mod snapshots;
/// The shared observable store.
pub mod store;
/// Per-identity sliding window quota.
pub mod ratelimit;
/// Mode machine for the streaming ticker.
pub mod upstream_manager;

pub use ratelimit::{InMemoryQuotaStore, QuotaError, QuotaStore, RateLimitDecision, RateLimiter, WindowUsage};
pub use snapshots::{
    DominanceSnapshot, FundingBias, FundingRateEntry, MarketCoin, RatioSnapshot, SentimentSnapshot,
    TickerSnapshot,
};
pub use store::{MarketStore, StoreField, StoreSnapshot, StoreSubscription};
pub use upstream_manager::{FeedDecision, FeedMode, UpstreamManager};
