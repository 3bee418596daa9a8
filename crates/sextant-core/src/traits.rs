use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::*;

/// Generative backend: one prompt in, one completion out.
pub trait LlmClient: Send + Sync + 'static {
    fn complete(
        &self,
        config: &ModelConfig,
        request: CompletionRequest,
    ) -> BoxFuture<'_, Result<String>>;
}

/// Source adapter wrapping one external data provider.
///
/// `fetch` must return `Err` on transport failure and `Ok` with an empty
/// payload when the provider simply has no data.
pub trait SourceAdapter: Send + Sync + 'static {
    /// Name this adapter contributes under in a `ResearchBundle`.
    fn name(&self) -> &str;

    /// Provider family. Adapters sharing a type share a throttle.
    fn source_type(&self) -> &str {
        self.name()
    }

    fn fetch(&self, params: &QueryParams) -> BoxFuture<'_, Result<SourcePayload>>;
}

/// One persisted cache row.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub cache_key: String,
    pub source: String,
    /// Canonical JSON of the query parameters.
    pub query_params: String,
    /// Serialized payload.
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub hit_count: u64,
    pub last_accessed_at: DateTime<Utc>,
    pub is_valid: bool,
}

impl CacheEntry {
    /// Valid and not yet expired at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_valid && self.expires_at > now
    }
}

/// Per-source cache totals.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct SourceCacheStats {
    pub source: String,
    pub entries: u64,
    pub total_hits: u64,
}

/// Aggregate cache totals.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct CacheStats {
    pub total_entries: u64,
    pub active_entries: u64,
    pub expired_entries: u64,
    pub invalidated_entries: u64,
    pub by_source: Vec<SourceCacheStats>,
}

/// Cache storage backend. Only the query cache touches it.
pub trait CacheStore: Send + Sync + 'static {
    /// Load a row by key regardless of validity.
    fn load(&self, cache_key: &str) -> Result<Option<CacheEntry>>;

    /// Insert or overwrite a row. Keeps `created_at` and `hit_count` of an
    /// existing row and marks it valid again.
    fn upsert(&self, entry: &CacheEntry) -> Result<()>;

    /// Increment `hit_count` and set `last_accessed_at`.
    fn record_hit(&self, cache_key: &str, at: DateTime<Utc>) -> Result<()>;

    /// Soft-delete matching rows. `None` filters match everything.
    fn invalidate(&self, source: Option<&str>, key_prefix: Option<&str>) -> Result<usize>;

    /// Hard-delete rows whose `expires_at` is before `now`.
    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;

    fn stats(&self, now: DateTime<Utc>) -> Result<CacheStats>;
}
