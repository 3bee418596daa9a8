use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use sextant_core::error::Result;
use sextant_core::traits::{CacheEntry, CacheStats, CacheStore};
use sextant_core::types::QueryParams;

use crate::key::{cache_key, normalize};

/// Upper bound on a stored TTL. Longer ones saturate here, keeping expiry
/// timestamps inside the four-digit years the store compares as text.
fn longest_ttl() -> chrono::Duration {
    chrono::Duration::days(365 * 1000)
}

/// Read-through cache in front of expensive external lookups.
///
/// Concurrent misses for the same key may both fetch; the last write wins.
/// Storage errors are logged and degrade to a live call, so the cache can
/// slow a run down but never fail it.
#[derive(Clone)]
pub struct QueryCache {
    store: Arc<dyn CacheStore>,
}

impl QueryCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Return the cached payload for `(source, params)` or fetch, store and
    /// return a fresh one. A failed fetch yields `T::default()` and leaves
    /// the cache untouched.
    pub async fn get_or_fetch<T, F, Fut>(
        &self,
        source: &str,
        params: &QueryParams,
        ttl: Duration,
        fetch: F,
    ) -> T
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.try_get_or_fetch(source, params, ttl, fetch).await {
            Ok(value) => value,
            Err(e) => {
                warn!(source, error = %e, "Fetch failed, returning empty payload");
                T::default()
            }
        }
    }

    /// Same lookup as [`get_or_fetch`](Self::get_or_fetch), but a failed
    /// fetch is returned to the caller instead of being replaced by a default.
    pub async fn try_get_or_fetch<T, F, Fut>(
        &self,
        source: &str,
        params: &QueryParams,
        ttl: Duration,
        fetch: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let key = cache_key(source, params);

        if let Some(value) = self.lookup::<T>(source, &key) {
            return Ok(value);
        }

        debug!(source, key = %short(&key), "Cache miss");
        let value = fetch().await?;
        self.store_value(source, params, &key, ttl, &value);
        Ok(value)
    }

    fn lookup<T: DeserializeOwned>(&self, source: &str, key: &str) -> Option<T> {
        let now = Utc::now();
        let entry = match self.store.load(key) {
            Ok(Some(entry)) if entry.is_live(now) => entry,
            Ok(_) => return None,
            Err(e) => {
                warn!(source, error = %e, "Cache read failed");
                return None;
            }
        };

        let value = match serde_json::from_str::<T>(&entry.payload) {
            Ok(v) => v,
            Err(e) => {
                warn!(source, key = %short(key), error = %e, "Corrupt cache payload, refetching");
                return None;
            }
        };

        if let Err(e) = self.store.record_hit(key, now) {
            warn!(source, error = %e, "Failed to record cache hit");
        }
        debug!(source, key = %short(key), hits = entry.hit_count + 1, "Cache hit");
        Some(value)
    }

    fn store_value<T: Serialize>(
        &self,
        source: &str,
        params: &QueryParams,
        key: &str,
        ttl: Duration,
        value: &T,
    ) {
        let payload = match serde_json::to_string(value) {
            Ok(p) => p,
            Err(e) => {
                warn!(source, error = %e, "Payload not serializable, skipping cache write");
                return;
            }
        };

        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl)
            .unwrap_or(chrono::Duration::MAX)
            .min(longest_ttl());
        let entry = CacheEntry {
            cache_key: key.to_string(),
            source: source.to_string(),
            query_params: normalize(params),
            payload,
            created_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            hit_count: 0,
            last_accessed_at: now,
            is_valid: true,
        };

        if let Err(e) = self.store.upsert(&entry) {
            warn!(source, error = %e, "Cache write failed");
        }
    }

    /// Soft-delete entries. `None` filters match everything.
    pub fn invalidate(&self, source: Option<&str>, key_prefix: Option<&str>) -> Result<usize> {
        let count = self.store.invalidate(source, key_prefix)?;
        debug!(?source, ?key_prefix, count, "Cache invalidated");
        Ok(count)
    }

    /// Hard-delete entries past their TTL.
    pub fn purge_expired(&self) -> Result<usize> {
        self.store.purge_expired(Utc::now())
    }

    pub fn stats(&self) -> Result<CacheStats> {
        self.store.stats(Utc::now())
    }
}

fn short(key: &str) -> &str {
    &key[..key.len().min(12)]
}
