//! Error types for the cache library
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache and optimization layer.
///
/// Callers of [`CacheService::get`](crate::CacheService::get) and
/// [`CacheService::set`](crate::CacheService::set) never see these directly:
/// cache failures degrade to a miss (`None`) or a rejected write (`false`).
/// The typed variants surface through the pool, the query executor and the
/// maintenance jobs, where the caller owns the retry policy.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Underlying SQLite store error
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// No pool handle became free within the acquire timeout
    #[error("connection pool exhausted: no handle free within {waited_ms}ms")]
    PoolTimeout {
        /// How long the acquire waited before giving up
        waited_ms: u64,
    },

    /// Value could not be serialized or deserialized
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compressed payload could not be encoded or decoded
    #[error("compression failed: {0}")]
    Compression(String),

    /// Filesystem error (backup copy, database open)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The pool has been shut down and no longer hands out connections
    #[error("pool is shut down")]
    Shutdown,
}

// == Result Type Alias ==
/// Convenience Result type for the cache library.
pub type Result<T> = std::result::Result<T, CacheError>;
