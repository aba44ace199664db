//! Store Module
//!
//! The durable tier: a pooled SQLite store acting as the system of record
//! behind the memory tier.

mod pool;
mod sqlite;

pub use pool::{PooledConn, StoreConn, StorePool};
pub use sqlite::{CleanupCounts, SlowQueryGroup, SqliteStore};
