//! # Redis Quota Store
//!
//! Keeps the proxy's sliding window log in Redis so the quota is shared by
//! every server instance. Each identity owns a sorted set of hit timestamps;
//! a Lua script trims, counts and records in one atomic step.

use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::future::BoxFuture;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError, Script};

use crate::core::ratelimit::{QuotaError, QuotaStore, WindowUsage};

/// Prefix for every key this store writes.
const KEY_PREFIX: &str = "terminal:ratelimit:";

/// KEYS[1] = window key
/// ARGV = now_ms, window_ms, limit, unique member
/// Returns {admitted (0|1), used, oldest_ms}.
const SLIDING_WINDOW_LUA: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local used = redis.call('ZCARD', key)
local admitted = 0
if used < limit then
  redis.call('ZADD', key, now, ARGV[4])
  used = used + 1
  admitted = 1
end
redis.call('PEXPIRE', key, window)

local oldest_ms = now
local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
if oldest[2] then
  oldest_ms = tonumber(oldest[2])
end
return {admitted, used, oldest_ms}
"#;

impl From<RedisError> for QuotaError {
    fn from(e: RedisError) -> Self {
        QuotaError::Backend(e.to_string())
    }
}

/// Redis-backed `QuotaStore`.
pub struct RedisQuotaStore {
    conn: ConnectionManager,
    script: Script,
    seq: AtomicU64,
}

impl RedisQuotaStore {
    /// Opens a managed connection to `url` (e.g. "redis://127.0.0.1/").
    ///
    /// The connection manager reconnects on its own; a Redis outage after
    /// startup surfaces as `QuotaError::Backend` on individual checks.
    pub async fn connect(url: &str) -> Result<Self, QuotaError> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        log::info!("Quota store connected to Redis");
        Ok(Self {
            conn,
            script: Script::new(SLIDING_WINDOW_LUA),
            seq: AtomicU64::new(0),
        })
    }

    fn member(&self, now_ms: i64) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}-{}", now_ms, std::process::id(), seq)
    }
}

impl QuotaStore for RedisQuotaStore {
    fn record_hit<'a>(
        &'a self,
        key: &'a str,
        now_ms: i64,
        window_ms: i64,
        limit: u32,
    ) -> BoxFuture<'a, Result<WindowUsage, QuotaError>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let reply: Vec<i64> = self
                .script
                .key(format!("{}{}", KEY_PREFIX, key))
                .arg(now_ms)
                .arg(window_ms)
                .arg(limit)
                .arg(self.member(now_ms))
                .invoke_async(&mut conn)
                .await?;

            match reply.as_slice() {
                [admitted, used, oldest_ms] => Ok(WindowUsage {
                    admitted: *admitted == 1,
                    used: (*used).max(0) as u32,
                    oldest_ms: *oldest_ms,
                }),
                other => Err(QuotaError::Backend(format!(
                    "unexpected sliding window reply: {:?}",
                    other
                ))),
            }
        })
    }
}
