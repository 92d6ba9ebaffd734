//! # Connections Module
//!
//! Persistent connections to external services. Currently just Redis, used as
//! the shared backing store for the proxy's request quota.

/// Redis sliding window store for the proxy quota.
pub mod cache_redis;

pub use cache_redis::RedisQuotaStore;
