//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::time::Duration;

/// Cache layer configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Path to the persistent SQLite database file
    pub db_path: String,
    /// Byte-size ceiling for the in-process memory tier
    pub max_memory_bytes: u64,
    /// Default TTL in seconds for entries without explicit TTL
    pub default_ttl_secs: u64,
    /// Number of pooled store connections, created eagerly at startup
    pub pool_size: usize,
    /// How long an acquire waits for a free handle before failing
    pub pool_acquire_timeout: Duration,
    /// Executions slower than this are recorded for analysis
    pub slow_query_threshold: Duration,
    /// Expired-entry sweep interval in seconds
    pub sweep_interval_secs: u64,
    /// Cache report interval in seconds
    pub report_interval_secs: u64,
    /// Slow-query analysis interval in seconds
    pub analyze_interval_secs: u64,
    /// Directory backups are written into during full optimization
    pub backup_dir: String,
    /// Slow-query records older than this many days are dropped on cleanup
    pub retention_days: u64,
    /// Maximum analytics records held before the oldest are dropped
    pub analytics_capacity: usize,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DB_PATH` - SQLite database file (default: "cache.db")
    /// - `CACHE_MAX_MEMORY_BYTES` - Memory tier ceiling (default: 100MB)
    /// - `CACHE_DEFAULT_TTL` - Default TTL in seconds (default: 3600)
    /// - `CACHE_POOL_SIZE` - Pooled connections (default: 10)
    /// - `CACHE_POOL_ACQUIRE_TIMEOUT_MS` - Acquire timeout (default: 5000)
    /// - `CACHE_SLOW_QUERY_THRESHOLD_MS` - Slow query cutoff (default: 100)
    /// - `CACHE_SWEEP_INTERVAL` - Expiry sweep frequency in seconds (default: 300)
    /// - `CACHE_REPORT_INTERVAL` - Report frequency in seconds (default: 3600)
    /// - `CACHE_ANALYZE_INTERVAL` - Analysis frequency in seconds (default: 3600)
    /// - `CACHE_BACKUP_DIR` - Backup destination directory (default: "backups")
    /// - `CACHE_RETENTION_DAYS` - Slow-query record retention (default: 7)
    /// - `CACHE_ANALYTICS_CAPACITY` - Analytics ring size (default: 10000)
    pub fn from_env() -> Self {
        Self {
            db_path: env::var("CACHE_DB_PATH").unwrap_or_else(|_| "cache.db".to_string()),
            max_memory_bytes: parse_env("CACHE_MAX_MEMORY_BYTES", 100 * 1024 * 1024),
            default_ttl_secs: parse_env("CACHE_DEFAULT_TTL", 3600),
            pool_size: parse_env("CACHE_POOL_SIZE", 10),
            pool_acquire_timeout: Duration::from_millis(parse_env(
                "CACHE_POOL_ACQUIRE_TIMEOUT_MS",
                5000,
            )),
            slow_query_threshold: Duration::from_millis(parse_env(
                "CACHE_SLOW_QUERY_THRESHOLD_MS",
                100,
            )),
            sweep_interval_secs: parse_env("CACHE_SWEEP_INTERVAL", 300),
            report_interval_secs: parse_env("CACHE_REPORT_INTERVAL", 3600),
            analyze_interval_secs: parse_env("CACHE_ANALYZE_INTERVAL", 3600),
            backup_dir: env::var("CACHE_BACKUP_DIR").unwrap_or_else(|_| "backups".to_string()),
            retention_days: parse_env("CACHE_RETENTION_DAYS", 7),
            analytics_capacity: parse_env("CACHE_ANALYTICS_CAPACITY", 10_000),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            db_path: "cache.db".to_string(),
            max_memory_bytes: 100 * 1024 * 1024,
            default_ttl_secs: 3600,
            pool_size: 10,
            pool_acquire_timeout: Duration::from_millis(5000),
            slow_query_threshold: Duration::from_millis(100),
            sweep_interval_secs: 300,
            report_interval_secs: 3600,
            analyze_interval_secs: 3600,
            backup_dir: "backups".to_string(),
            retention_days: 7,
            analytics_capacity: 10_000,
        }
    }
}

/// Parses an environment variable, falling back to the default on absence or
/// parse failure.
fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
