//! Query Cache Module
//!
//! Cache-aside wrapper over arbitrary read queries: check the cache by key,
//! execute through the pool on a miss, cache non-empty results, and record
//! slow executions for later analysis.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{CacheOptions, CacheService};
use crate::error::Result;
use crate::query::analyzer::normalize_query;
use crate::store::SqliteStore;

/// Namespace all query results are cached under, partitioned away from
/// caller-owned cache producers.
const QUERY_NAMESPACE: &str = "query";

// == Query Options ==
/// Per-call options for `cached_query`.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Explicit cache key; derived from query + params when absent
    pub cache_key: Option<String>,
    /// Seconds the cached result stays valid (default 300)
    pub ttl_seconds: Option<u64>,
}

impl QueryOptions {
    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn ttl_seconds(mut self, ttl: u64) -> Self {
        self.ttl_seconds = Some(ttl);
        self
    }
}

/// Default result TTL; query results go stale faster than content entries.
const DEFAULT_QUERY_TTL_SECS: u64 = 300;

// == Query Executor ==
/// Executes read queries with result caching and slow-query capture.
pub struct QueryExecutor {
    service: Arc<CacheService>,
    store: Arc<SqliteStore>,
    slow_threshold_ms: u64,
}

impl QueryExecutor {
    // == Constructor ==
    /// Wraps the cache service; the slow-query threshold comes from its
    /// configuration.
    pub fn new(service: Arc<CacheService>) -> Self {
        let store = service.store();
        let slow_threshold_ms = service.config().slow_query_threshold.as_millis() as u64;
        Self {
            service,
            store,
            slow_threshold_ms,
        }
    }

    // == Cached Query ==
    /// Returns cached rows for the key when present, otherwise executes
    /// the query through a pooled handle and caches a non-empty result.
    ///
    /// Unlike `CacheService::get`/`set`, store failures here propagate:
    /// the caller asked for data, not a cache opinion, and owns the retry
    /// policy.
    pub async fn cached_query(
        &self,
        sql: &str,
        params: &[Value],
        opts: QueryOptions,
    ) -> Result<Vec<Value>> {
        let raw_key = match opts.cache_key {
            Some(key) => key,
            None => derive_query_key(sql, params),
        };

        if let Some(rows) = self.service.get::<Vec<Value>>(&raw_key, QUERY_NAMESPACE).await {
            debug!(key = %raw_key, "query served from cache");
            return Ok(rows);
        }

        let start = Instant::now();
        let rows = self.store.execute_read(sql, params).await?;
        let duration_ms = start.elapsed().as_millis() as u64;

        if duration_ms >= self.slow_threshold_ms {
            let pattern = normalize_query(sql);
            debug!(%pattern, duration_ms, "slow query recorded");
            if let Err(err) = self.store.record_slow_query(&pattern, sql, duration_ms).await {
                warn!(%err, "failed to record slow query");
            }
        }

        if !rows.is_empty() {
            let ttl = opts.ttl_seconds.unwrap_or(DEFAULT_QUERY_TTL_SECS);
            let cache_opts = CacheOptions::default()
                .ttl_seconds(ttl)
                .namespace(QUERY_NAMESPACE);
            self.service.set(&raw_key, &rows, cache_opts).await;
        }

        Ok(rows)
    }
}

/// Derives a cache key from the query text and its bound parameters.
fn derive_query_key(sql: &str, params: &[Value]) -> String {
    let bound = serde_json::to_string(params).unwrap_or_default();
    format!("{}|{}", sql, bound)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheEntry, Codec, Priority};
    use crate::config::CacheConfig;
    use serde_json::json;
    use tempfile::TempDir;

    async fn temp_executor() -> (TempDir, Arc<CacheService>, QueryExecutor) {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig {
            db_path: dir.path().join("query.db").to_string_lossy().into_owned(),
            ..Default::default()
        };
        let service = Arc::new(CacheService::init(config).await.unwrap());
        let executor = QueryExecutor::new(service.clone());
        (dir, service, executor)
    }

    async fn seed_row(service: &CacheService, key: &str) {
        let entry = CacheEntry::new(
            b"{}".to_vec(),
            "seed".to_string(),
            300,
            vec![],
            Priority::Medium,
            Codec::None,
        );
        service.store().upsert(key, &entry).await.unwrap();
    }

    #[tokio::test]
    async fn test_miss_executes_and_caches() {
        let (_dir, service, executor) = temp_executor().await;
        seed_row(&service, "row1").await;

        let opts = QueryOptions::default().cache_key("k");
        let rows = executor
            .cached_query(
                "SELECT key FROM cache_entries WHERE namespace = ?1",
                &[json!("seed")],
                opts.clone(),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        // Second call is served from cache even after the row disappears
        service.store().delete("row1").await.unwrap();
        let cached = executor
            .cached_query(
                "SELECT key FROM cache_entries WHERE namespace = ?1",
                &[json!("seed")],
                opts,
            )
            .await
            .unwrap();
        assert_eq!(cached, rows);
    }

    #[tokio::test]
    async fn test_key_derived_from_query_and_params() {
        let (_dir, service, executor) = temp_executor().await;
        seed_row(&service, "row1").await;

        let sql = "SELECT key FROM cache_entries WHERE namespace = ?1";
        let a = executor
            .cached_query(sql, &[json!("seed")], QueryOptions::default())
            .await
            .unwrap();
        let b = executor
            .cached_query(sql, &[json!("other")], QueryOptions::default())
            .await
            .unwrap();

        // Different params may not share a cached result
        assert_eq!(a.len(), 1);
        assert!(b.is_empty());
    }

    #[tokio::test]
    async fn test_empty_results_are_not_cached() {
        let (_dir, service, executor) = temp_executor().await;

        let opts = QueryOptions::default().cache_key("empty");
        let rows = executor
            .cached_query(
                "SELECT key FROM cache_entries WHERE namespace = 'none'",
                &[],
                opts,
            )
            .await
            .unwrap();
        assert!(rows.is_empty());

        // Nothing was written under the query namespace
        let cached: Option<Vec<Value>> = service.get("empty", "query").await;
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn test_slow_query_is_recorded() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig {
            db_path: dir.path().join("slow.db").to_string_lossy().into_owned(),
            // Everything counts as slow
            slow_query_threshold: std::time::Duration::from_millis(0),
            ..Default::default()
        };
        let service = Arc::new(CacheService::init(config).await.unwrap());
        let executor = QueryExecutor::new(service.clone());
        seed_row(&service, "row1").await;

        executor
            .cached_query(
                "SELECT key FROM cache_entries WHERE expires_at > 100",
                &[],
                QueryOptions::default(),
            )
            .await
            .unwrap();

        let groups = service.store().slow_query_groups(10).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(
            groups[0].pattern,
            "select key from cache_entries where expires_at > ?"
        );
        assert!(groups[0].sample.contains("100"));
    }

    #[tokio::test]
    async fn test_invalid_sql_propagates() {
        let (_dir, _service, executor) = temp_executor().await;

        let result = executor
            .cached_query("SELECT FROM nowhere", &[], QueryOptions::default())
            .await;
        assert!(result.is_err());
    }
}
