//! Cache Module
//!
//! Two-tier caching: a byte-bounded in-process tier with TTL expiration
//! and priority eviction, orchestrated over a persistent backing store.

mod codec;
mod entry;
mod memory;
mod service;
mod stats;


// Re-export public types
pub use codec::cache_key;
pub use entry::{current_timestamp_ms, CacheEntry, Codec, Priority};
pub use memory::{MemoryTier, PutOutcome};
pub use service::{CacheOptions, CacheService};
pub use stats::CacheStats;
