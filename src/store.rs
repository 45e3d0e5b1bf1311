//! Key-value cache client boundary.
//!
//! All shared state (phish records and the freshness ledger) lives in an
//! external cache service behind the `CacheStore` trait. Ordinary
//! data-manipulation outcomes are explicit `StoreOutcome` values so the hot
//! path never routes control flow through caught errors; anything that does
//! surface as an error is a genuine `CacheFault`.

use crate::error::Result;
use async_trait::async_trait;
use log::{debug, error, info};
use redis::aio::ConnectionManager;
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;

/// Benign outcome of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// The value was written.
    Stored,
    /// Insert-if-absent lost: the key already holds a value.
    AlreadyExists,
    /// Update-if-present lost: there is no value under the key.
    Absent,
}

/// Client operations consumed from the external cache service.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Atomic insert-if-absent. Returns `Stored` or `AlreadyExists`.
    async fn add(&self, key: &str, value: &str, ttl: Duration) -> Result<StoreOutcome>;

    /// Atomic update-if-present. Returns `Stored` or `Absent`.
    async fn replace(&self, key: &str, value: &str, ttl: Duration) -> Result<StoreOutcome>;

    /// Extends the TTL of an existing key. A missing key is a no-op.
    async fn touch(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Administrative full flush of records and ledger alike.
    async fn flush_all(&self) -> Result<()>;
}

/// Cache key for a normalized URL: lowercase hex SHA-256.
pub fn url_hash_key(normalized_url: &str) -> String {
    let digest = Sha256::digest(normalized_url.as_bytes());
    hex::encode(digest)
}

/// Redis-backed store. Uses a `ConnectionManager` for automatic reconnection
/// and resilience; cloned per call, which is how the manager is meant to be
/// shared across tasks.
#[derive(Clone)]
pub struct RedisStore {
    conn_manager: ConnectionManager,
    redis_url: String,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("redis_url", &self.redis_url)
            .field("conn_manager", &"<ConnectionManager instance>")
            .finish()
    }
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        info!("Initializing Redis connection manager for URL: {}", redis_url);
        let client = redis::Client::open(redis_url)?;
        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to create Redis ConnectionManager: {}", e);
            e
        })?;
        Ok(Self {
            conn_manager,
            redis_url: redis_url.to_string(),
        })
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn_manager.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await?;
        debug!(
            "Cache {} for key {}",
            if value.is_some() { "HIT" } else { "MISS" },
            key
        );
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn add(&self, key: &str, value: &str, ttl: Duration) -> Result<StoreOutcome> {
        let mut conn = self.conn_manager.clone();
        // SET NX answers nil when the key is taken; that is data, not an error.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await?;
        Ok(match reply {
            Some(_) => StoreOutcome::Stored,
            None => StoreOutcome::AlreadyExists,
        })
    }

    async fn replace(&self, key: &str, value: &str, ttl: Duration) -> Result<StoreOutcome> {
        let mut conn = self.conn_manager.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("XX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await?;
        Ok(match reply {
            Some(_) => StoreOutcome::Stored,
            None => StoreOutcome::Absent,
        })
    }

    async fn touch(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl.as_secs())
            .query_async::<_, i64>(&mut conn)
            .await?;
        Ok(())
    }

    async fn flush_all(&self) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        redis::cmd("FLUSHDB")
            .query_async::<_, ()>(&mut conn)
            .await?;
        info!("Cache flushed");
        Ok(())
    }
}
