//! Persistent Store Module
//!
//! SQLite-backed durable tier: the source of truth behind the memory tier.
//! Provides keyed upsert/get/delete, tag-pattern bulk delete, expired-row
//! sweeps, slow-query records and the administrative operations the
//! maintenance scheduler drives.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use rusqlite::types::ValueRef;
use rusqlite::{params, params_from_iter, OptionalExtension};
use serde_json::{Map, Value};
use tracing::debug;

use crate::cache::{current_timestamp_ms, CacheEntry, Codec, Priority};
use crate::error::Result;
use crate::store::pool::StorePool;

// == Slow Query Group ==
/// Aggregate over slow executions sharing a normalized pattern.
#[derive(Debug, Clone)]
pub struct SlowQueryGroup {
    /// Normalized query pattern (literals replaced with placeholders)
    pub pattern: String,
    /// Executions recorded for the pattern
    pub occurrences: u64,
    /// Mean recorded duration
    pub avg_duration_ms: f64,
    /// Worst recorded duration
    pub max_duration_ms: u64,
    /// One raw query from the group, for literal-sensitive heuristics
    pub sample: String,
}

// == Cleanup Counts ==
/// Rows removed by a cleanup pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupCounts {
    /// Expired cache rows dropped
    pub expired_entries: usize,
    /// Slow-query records older than the retention window dropped
    pub stale_slow_queries: usize,
}

// == Sqlite Store ==
/// Durable key/value tier over the pooled SQLite handles.
#[derive(Debug)]
pub struct SqliteStore {
    pool: Arc<StorePool>,
}

impl SqliteStore {
    // == Constructor ==
    /// Wraps a pool and ensures the schema exists.
    pub async fn new(pool: Arc<StorePool>) -> Result<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Shared pool, for the query executor.
    pub fn pool(&self) -> Arc<StorePool> {
        self.pool.clone()
    }

    async fn init_schema(&self) -> Result<()> {
        let conn = self.pool.acquire().await?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                namespace TEXT NOT NULL DEFAULT 'default',
                expires_at INTEGER NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                priority INTEGER NOT NULL DEFAULT 1,
                compression TEXT NOT NULL DEFAULT 'none',
                size_bytes INTEGER NOT NULL,
                access_count INTEGER NOT NULL DEFAULT 0,
                last_accessed INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_cache_expires ON cache_entries(expires_at);
            CREATE INDEX IF NOT EXISTS idx_cache_namespace ON cache_entries(namespace);

            CREATE TABLE IF NOT EXISTS slow_queries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pattern TEXT NOT NULL,
                query TEXT NOT NULL,
                duration_ms INTEGER NOT NULL,
                recorded_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_slow_pattern ON slow_queries(pattern);
            "#,
        )?;
        debug!("store schema ready");
        Ok(())
    }

    // == Upsert ==
    /// Writes an entry by key, replacing any previous row.
    pub async fn upsert(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        let tags = serde_json::to_string(&entry.tags)?;
        let conn = self.pool.acquire().await?;
        let mut stmt = conn.prepare_cached(
            "INSERT OR REPLACE INTO cache_entries
             (key, value, namespace, expires_at, tags, priority, compression,
              size_bytes, access_count, last_accessed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )?;
        stmt.execute(params![
            key,
            entry.value,
            entry.namespace,
            entry.expires_at,
            tags,
            entry.priority.level(),
            entry.compression.as_str(),
            entry.size_bytes,
            entry.access_count,
            entry.last_accessed,
            entry.created_at,
        ])?;
        Ok(())
    }

    // == Get ==
    /// Reads a live entry by key; expired rows are filtered out, and a
    /// successful read bumps the row's access stats.
    pub async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let now = current_timestamp_ms();
        let conn = self.pool.acquire().await?;

        let mut stmt = conn.prepare_cached(
            "SELECT value, namespace, expires_at, tags, priority, compression,
                    size_bytes, access_count, last_accessed, created_at
             FROM cache_entries WHERE key = ?1 AND expires_at > ?2",
        )?;
        let entry = stmt
            .query_row(params![key, now], |row| {
                let tags_json: String = row.get(3)?;
                let priority: u8 = row.get(4)?;
                let compression: String = row.get(5)?;
                Ok(CacheEntry {
                    value: row.get(0)?,
                    namespace: row.get(1)?,
                    expires_at: row.get(2)?,
                    tags: serde_json::from_str(&tags_json).unwrap_or_default(),
                    priority: Priority::from_level(priority),
                    compression: Codec::parse(&compression),
                    size_bytes: row.get(6)?,
                    access_count: row.get(7)?,
                    last_accessed: row.get(8)?,
                    created_at: row.get(9)?,
                })
            })
            .optional()?;

        if entry.is_some() {
            let mut touch = conn.prepare_cached(
                "UPDATE cache_entries
                 SET access_count = access_count + 1, last_accessed = ?2
                 WHERE key = ?1",
            )?;
            touch.execute(params![key, now])?;
        }

        Ok(entry)
    }

    // == Delete ==
    /// Removes a row by key. Returns true if a row was deleted.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let conn = self.pool.acquire().await?;
        let mut stmt = conn.prepare_cached("DELETE FROM cache_entries WHERE key = ?1")?;
        Ok(stmt.execute(params![key])? > 0)
    }

    // == Delete By Tags ==
    /// Bulk-deletes every row carrying any of the given tags.
    ///
    /// Tags are stored as a JSON array, so matching `%"tag"%` is exact
    /// membership: the JSON quotes delimit the tag and `content` cannot
    /// match a stored `contentX`.
    pub async fn delete_by_tags(&self, tags: &[String]) -> Result<usize> {
        if tags.is_empty() {
            return Ok(0);
        }

        let clause = vec!["tags LIKE ?"; tags.len()].join(" OR ");
        let sql = format!("DELETE FROM cache_entries WHERE {}", clause);
        let patterns: Vec<String> = tags.iter().map(|t| format!("%\"{}\"%", t)).collect();

        let conn = self.pool.acquire().await?;
        let removed = conn.execute(&sql, params_from_iter(patterns.iter()))?;
        Ok(removed)
    }

    // == Sweep Expired ==
    /// Removes every row whose deadline has passed.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let now = current_timestamp_ms();
        let conn = self.pool.acquire().await?;
        let mut stmt =
            conn.prepare_cached("DELETE FROM cache_entries WHERE expires_at <= ?1")?;
        Ok(stmt.execute(params![now])?)
    }

    // == Entry Count ==
    /// Live rows in the durable tier.
    pub async fn entry_count(&self) -> Result<u64> {
        let now = current_timestamp_ms();
        let conn = self.pool.acquire().await?;
        let mut stmt = conn
            .prepare_cached("SELECT COUNT(*) FROM cache_entries WHERE expires_at > ?1")?;
        Ok(stmt.query_row(params![now], |row| row.get(0))?)
    }

    // == Read Queries ==
    /// Executes an arbitrary read query, returning rows as JSON objects.
    ///
    /// Parameters bind positionally; JSON numbers map to INTEGER when whole
    /// and REAL otherwise, booleans to 0/1, and anything structured to its
    /// JSON text.
    pub async fn execute_read(&self, sql: &str, query_params: &[Value]) -> Result<Vec<Value>> {
        let conn = self.pool.acquire().await?;
        let mut stmt = conn.prepare_cached(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let bound: Vec<rusqlite::types::Value> = query_params.iter().map(json_to_sql).collect();
        let mut rows = stmt.query(params_from_iter(bound))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut object = Map::new();
            for (idx, name) in columns.iter().enumerate() {
                object.insert(name.clone(), sql_to_json(row.get_ref(idx)?));
            }
            out.push(Value::Object(object));
        }
        Ok(out)
    }

    // == Slow Query Records ==
    /// Persists one slow execution keyed by its normalized pattern.
    pub async fn record_slow_query(
        &self,
        pattern: &str,
        query: &str,
        duration_ms: u64,
    ) -> Result<()> {
        let conn = self.pool.acquire().await?;
        let mut stmt = conn.prepare_cached(
            "INSERT INTO slow_queries (pattern, query, duration_ms, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        stmt.execute(params![pattern, query, duration_ms, current_timestamp_ms()])?;
        Ok(())
    }

    /// Aggregates recorded slow queries by pattern, worst offenders first.
    pub async fn slow_query_groups(&self, limit: usize) -> Result<Vec<SlowQueryGroup>> {
        let conn = self.pool.acquire().await?;
        let mut stmt = conn.prepare_cached(
            "SELECT pattern, COUNT(*), AVG(duration_ms), MAX(duration_ms), MAX(query)
             FROM slow_queries
             GROUP BY pattern
             ORDER BY COUNT(*) DESC, AVG(duration_ms) DESC
             LIMIT ?1",
        )?;
        let groups = stmt
            .query_map(params![limit as i64], |row| {
                Ok(SlowQueryGroup {
                    pattern: row.get(0)?,
                    occurrences: row.get(1)?,
                    avg_duration_ms: row.get(2)?,
                    max_duration_ms: row.get(3)?,
                    sample: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    // == Maintenance Operations ==
    /// Snapshots the database into `dest_dir` via `VACUUM INTO`.
    pub async fn backup(&self, dest_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dest_dir)?;
        let dest = dest_dir.join(format!(
            "cache-{}.db",
            Utc::now().format("%Y%m%d-%H%M%S")
        ));

        let conn = self.pool.acquire().await?;
        conn.execute("VACUUM INTO ?1", params![dest.to_string_lossy()])?;
        Ok(dest)
    }

    /// Drops expired cache rows and slow-query records older than the
    /// retention window.
    pub async fn cleanup(&self, retention_days: u64) -> Result<CleanupCounts> {
        let now = current_timestamp_ms();
        let cutoff = now.saturating_sub(retention_days * 24 * 60 * 60 * 1000);
        let conn = self.pool.acquire().await?;

        let expired_entries =
            conn.execute("DELETE FROM cache_entries WHERE expires_at <= ?1", params![now])?;
        let stale_slow_queries = conn.execute(
            "DELETE FROM slow_queries WHERE recorded_at < ?1",
            params![cutoff],
        )?;

        Ok(CleanupCounts {
            expired_entries,
            stale_slow_queries,
        })
    }

    /// Compacts the database file, reclaiming freed pages.
    pub async fn vacuum(&self) -> Result<()> {
        let conn = self.pool.acquire().await?;
        conn.execute_batch("VACUUM")?;
        Ok(())
    }

    /// Rebuilds every index.
    pub async fn reindex(&self) -> Result<()> {
        let conn = self.pool.acquire().await?;
        conn.execute_batch("REINDEX")?;
        Ok(())
    }

    /// Regathers the planner statistics.
    pub async fn analyze(&self) -> Result<()> {
        let conn = self.pool.acquire().await?;
        conn.execute_batch("ANALYZE")?;
        Ok(())
    }
}

// == Value Mapping ==
fn json_to_sql(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(*b as i64),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Sql::Integer(i),
            None => Sql::Real(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => Sql::Text(s.clone()),
        other => Sql::Text(other.to_string()),
    }
}

fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
    }
}
