//! Tiercache - A two-tier cache with a persistent backing store
//!
//! Combines a byte-bounded in-process memory tier with a durable SQLite
//! tier behind it. Writes go through to the store before they are cached,
//! so the store is always the system of record; reads check memory first
//! and fall back to the store, rehydrating the memory tier on the way out.
//!
//! Entries carry a TTL, tags for group invalidation, an eviction priority
//! and an optional gzip codec. A pooled connection layer with an explicit
//! acquire timeout feeds both the cache and a cached query executor that
//! records and analyzes slow queries. Background tasks sweep expired
//! entries, report cache health and run an on-demand store optimization
//! sequence.
//!
//! ```no_run
//! use tiercache::{CacheConfig, CacheOptions, CacheService};
//!
//! # async fn example() {
//! let service = CacheService::init(CacheConfig::default()).await.unwrap();
//!
//! service
//!     .set("posts:today", &vec!["a", "b"], CacheOptions::default().tags(["posts"]))
//!     .await;
//! let posts: Option<Vec<String>> = service.get("posts:today", "default").await;
//!
//! service.invalidate_by_tags(&["posts".to_string()]).await;
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod metrics;
pub mod query;
pub mod store;
pub mod tasks;

pub use cache::{CacheEntry, CacheOptions, CacheService, CacheStats, Codec, MemoryTier, Priority};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use metrics::{AnalyticsLog, AnalyticsRecord, CacheOperation, Diagnostic};
pub use query::{QueryAnalyzer, QueryExecutor, QueryOptions};
pub use store::{SqliteStore, StorePool};
pub use tasks::{run_full_optimization, MaintenanceScheduler, OptimizationReport};
