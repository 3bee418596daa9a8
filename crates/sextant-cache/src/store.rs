use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

use sextant_core::error::{Result, SextantError};
use sextant_core::traits::{CacheEntry, CacheStats, CacheStore, SourceCacheStats};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS query_cache (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        cache_key TEXT NOT NULL UNIQUE,
        source TEXT NOT NULL,
        query_params TEXT NOT NULL,
        payload TEXT NOT NULL,
        created_at TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        hit_count INTEGER NOT NULL DEFAULT 0,
        last_accessed_at TEXT NOT NULL,
        is_valid INTEGER NOT NULL DEFAULT 1
    );

    CREATE INDEX IF NOT EXISTS idx_query_cache_source
        ON query_cache(source, cache_key);

    CREATE INDEX IF NOT EXISTS idx_query_cache_expires
        ON query_cache(expires_at);";

/// Fixed-width UTC timestamps so text comparison in SQL orders correctly.
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn db_err(e: impl ToString) -> SextantError {
    SextantError::Database(e.to_string())
}

/// SQLite-backed cache store.
pub struct SqliteCacheStore {
    conn: Mutex<Connection>,
}

impl SqliteCacheStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SextantError::Database(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(db_err)?;

        // WAL lets concurrent runs read while one writes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!(path = %path.display(), "Cache store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(db_err)
    }
}

impl CacheStore for SqliteCacheStore {
    fn load(&self, cache_key: &str) -> Result<Option<CacheEntry>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT cache_key, source, query_params, payload, created_at, expires_at,
                    hit_count, last_accessed_at, is_valid
             FROM query_cache
             WHERE cache_key = ?1",
            params![cache_key],
            |row| {
                let created: String = row.get(4)?;
                let expires: String = row.get(5)?;
                let accessed: String = row.get(7)?;
                Ok(CacheEntry {
                    cache_key: row.get(0)?,
                    source: row.get(1)?,
                    query_params: row.get(2)?,
                    payload: row.get(3)?,
                    created_at: parse_ts(&created),
                    expires_at: parse_ts(&expires),
                    hit_count: row.get::<_, i64>(6)? as u64,
                    last_accessed_at: parse_ts(&accessed),
                    is_valid: row.get::<_, i64>(8)? != 0,
                })
            },
        )
        .optional()
        .map_err(db_err)
    }

    fn upsert(&self, entry: &CacheEntry) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO query_cache
                (cache_key, source, query_params, payload, created_at, expires_at,
                 hit_count, last_accessed_at, is_valid)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1)
             ON CONFLICT(cache_key) DO UPDATE SET
                source = excluded.source,
                query_params = excluded.query_params,
                payload = excluded.payload,
                expires_at = excluded.expires_at,
                last_accessed_at = excluded.last_accessed_at,
                is_valid = 1",
            params![
                entry.cache_key,
                entry.source,
                entry.query_params,
                entry.payload,
                ts(entry.created_at),
                ts(entry.expires_at),
                entry.hit_count as i64,
                ts(entry.last_accessed_at),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn record_hit(&self, cache_key: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE query_cache
             SET hit_count = hit_count + 1, last_accessed_at = ?2
             WHERE cache_key = ?1",
            params![cache_key, ts(at)],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn invalidate(&self, source: Option<&str>, key_prefix: Option<&str>) -> Result<usize> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE query_cache SET is_valid = 0
             WHERE is_valid = 1
               AND (?1 IS NULL OR source = ?1)
               AND (?2 IS NULL OR substr(cache_key, 1, length(?2)) = ?2)",
            params![source, key_prefix],
        )
        .map_err(db_err)
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM query_cache WHERE expires_at < ?1",
            params![ts(now)],
        )
        .map_err(db_err)
    }

    fn stats(&self, now: DateTime<Utc>) -> Result<CacheStats> {
        let conn = self.lock()?;
        let now = ts(now);

        let (total, active, expired, invalidated): (i64, i64, i64, i64) = conn
            .query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN is_valid = 1 AND expires_at > ?1 THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN is_valid = 1 AND expires_at <= ?1 THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN is_valid = 0 THEN 1 ELSE 0 END), 0)
                 FROM query_cache",
                params![now],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .map_err(db_err)?;

        let mut stmt = conn
            .prepare(
                "SELECT source, COUNT(*), COALESCE(SUM(hit_count), 0)
                 FROM query_cache
                 GROUP BY source
                 ORDER BY source",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SourceCacheStats {
                    source: row.get(0)?,
                    entries: row.get::<_, i64>(1)? as u64,
                    total_hits: row.get::<_, i64>(2)? as u64,
                })
            })
            .map_err(db_err)?;

        let mut by_source = Vec::new();
        for row in rows {
            by_source.push(row.map_err(db_err)?);
        }

        Ok(CacheStats {
            total_entries: total as u64,
            active_entries: active as u64,
            expired_entries: expired as u64,
            invalidated_entries: invalidated as u64,
            by_source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(key: &str, source: &str, ttl: Duration) -> CacheEntry {
        let now = Utc::now();
        CacheEntry {
            cache_key: key.to_string(),
            source: source.to_string(),
            query_params: r#"{"q":"x"}"#.to_string(),
            payload: r#"{"items":[]}"#.to_string(),
            created_at: now,
            expires_at: now + ttl,
            hit_count: 0,
            last_accessed_at: now,
            is_valid: true,
        }
    }

    #[test]
    fn test_upsert_and_load() {
        let store = SqliteCacheStore::in_memory().unwrap();
        store.upsert(&entry("abc", "web_search", Duration::hours(1))).unwrap();

        let loaded = store.load("abc").unwrap().unwrap();
        assert_eq!(loaded.source, "web_search");
        assert!(loaded.is_live(Utc::now()));
        assert!(store.load("missing").unwrap().is_none());
    }

    #[test]
    fn test_rewrite_keeps_hits_and_revalidates() {
        let store = SqliteCacheStore::in_memory().unwrap();
        store.upsert(&entry("abc", "web_search", Duration::hours(1))).unwrap();
        store.record_hit("abc", Utc::now()).unwrap();
        store.record_hit("abc", Utc::now()).unwrap();
        store.invalidate(Some("web_search"), None).unwrap();

        let mut fresh = entry("abc", "web_search", Duration::hours(2));
        fresh.payload = r#"{"items":[{"title":"t"}]}"#.to_string();
        store.upsert(&fresh).unwrap();

        let loaded = store.load("abc").unwrap().unwrap();
        assert_eq!(loaded.hit_count, 2);
        assert!(loaded.is_valid);
        assert!(loaded.payload.contains("\"t\""));
    }

    #[test]
    fn test_invalidate_by_prefix() {
        let store = SqliteCacheStore::in_memory().unwrap();
        store.upsert(&entry("aa11", "web_search", Duration::hours(1))).unwrap();
        store.upsert(&entry("aa22", "youtube", Duration::hours(1))).unwrap();
        store.upsert(&entry("bb33", "youtube", Duration::hours(1))).unwrap();

        assert_eq!(store.invalidate(None, Some("aa")).unwrap(), 2);
        assert!(!store.load("aa11").unwrap().unwrap().is_valid);
        assert!(store.load("bb33").unwrap().unwrap().is_valid);
        // Rows are kept, only flagged
        assert_eq!(store.stats(Utc::now()).unwrap().total_entries, 3);
    }

    #[test]
    fn test_purge_and_stats() {
        let store = SqliteCacheStore::in_memory().unwrap();
        store.upsert(&entry("live", "web_search", Duration::hours(1))).unwrap();
        store.upsert(&entry("old", "web_search", Duration::hours(-1))).unwrap();
        store.upsert(&entry("gone", "github_trends", Duration::hours(1))).unwrap();
        store.invalidate(Some("github_trends"), None).unwrap();
        store.record_hit("live", Utc::now()).unwrap();

        let stats = store.stats(Utc::now()).unwrap();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.active_entries, 1);
        assert_eq!(stats.expired_entries, 1);
        assert_eq!(stats.invalidated_entries, 1);
        assert_eq!(stats.by_source.len(), 2);
        let web = stats.by_source.iter().find(|s| s.source == "web_search").unwrap();
        assert_eq!(web.entries, 2);
        assert_eq!(web.total_hits, 1);

        assert_eq!(store.purge_expired(Utc::now()).unwrap(), 1);
        assert!(store.load("old").unwrap().is_none());
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.db");
        let store = SqliteCacheStore::open(&path).unwrap();
        store.upsert(&entry("k", "web_search", Duration::hours(1))).unwrap();
        assert!(path.exists());
    }
}
