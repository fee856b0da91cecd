//! Best-effort response caching for answered questions.
//!
//! The cache is an optimization, never a source of truth: every entry is
//! silently droppable, and a broken backing store must never fail a request.
//! [`ResponseCache::get`] and [`ResponseCache::set`] are therefore
//! infallible — store errors are logged and degrade to a miss / no-op, which
//! makes the "cache errors never propagate" contract visible in the types.
//!
//! Keying (documented choice): the question text trimmed and lower-cased, so
//! casing and stray whitespace do not defeat the cache. Entries expire after
//! the configured TTL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use redis::AsyncCommands;

use crate::types::{RagError, Result};

/// Outcome of a cache lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheLookup {
    /// A previously generated answer, still within its TTL.
    Hit(String),
    /// No usable entry (absent, expired, or the store errored).
    Miss,
}

impl CacheLookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }
}

/// Backing key-value store with per-entry expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    /// Drops every entry.
    async fn clear(&self) -> Result<()>;
}

/// Question-to-answer cache over any [`CacheStore`].
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// In-process cache, handy for tests and cacheless deployments.
    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryCacheStore::new()), ttl)
    }

    fn cache_key(question: &str) -> String {
        question.trim().to_lowercase()
    }

    /// Looks up a cached answer. Never fails; store trouble is a miss.
    pub async fn get(&self, question: &str) -> CacheLookup {
        match self.store.get(&Self::cache_key(question)).await {
            Ok(Some(answer)) => CacheLookup::Hit(answer),
            Ok(None) => CacheLookup::Miss,
            Err(err) => {
                tracing::warn!(error = %err, "cache get degraded to miss");
                CacheLookup::Miss
            }
        }
    }

    /// Stores an answer under the normalized question. Never fails; store
    /// trouble simply skips caching.
    pub async fn set(&self, question: &str, answer: &str) {
        if let Err(err) = self
            .store
            .set(&Self::cache_key(question), answer, self.ttl)
            .await
        {
            tracing::warn!(error = %err, "cache set skipped");
        }
    }

    /// Drops all cached answers (best-effort).
    pub async fn clear(&self) {
        if let Err(err) = self.store.clear().await {
            tracing::warn!(error = %err, "cache clear failed");
        }
    }
}

/// In-process store: a map of entries with absolute deadlines.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let expired = {
            let entries = self.entries.read();
            match entries.get(key) {
                Some((value, deadline)) if Instant::now() < *deadline => {
                    return Ok(Some(value.clone()));
                }
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            self.entries.write().remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries
            .write()
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }
}

/// Redis-backed store addressed by `redis://host:port`.
///
/// The connection is established lazily and reused; expiry rides on Redis
/// `SET … EX`. Every error maps to [`RagError::Cache`], which the
/// [`ResponseCache`] swallows.
pub struct RedisCacheStore {
    client: redis::Client,
    manager: tokio::sync::Mutex<Option<redis::aio::ConnectionManager>>,
}

impl RedisCacheStore {
    /// Parses `url` and prepares a lazy connection. No I/O happens here, so
    /// an unreachable cache process only surfaces (as misses) at use time.
    pub fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|err| RagError::Cache(err.to_string()))?;
        Ok(Self {
            client,
            manager: tokio::sync::Mutex::new(None),
        })
    }

    async fn manager(&self) -> Result<redis::aio::ConnectionManager> {
        let mut guard = self.manager.lock().await;
        if let Some(manager) = guard.as_ref() {
            return Ok(manager.clone());
        }
        let manager = self
            .client
            .get_connection_manager()
            .await
            .map_err(|err| RagError::Cache(err.to_string()))?;
        *guard = Some(manager.clone());
        Ok(manager)
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager().await?;
        conn.get(key)
            .await
            .map_err(|err| RagError::Cache(err.to_string()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.manager().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|err| RagError::Cache(err.to_string()))
    }

    async fn clear(&self) -> Result<()> {
        let mut conn = self.manager().await?;
        redis::cmd("FLUSHDB")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|err| RagError::Cache(err.to_string()))
    }
}
