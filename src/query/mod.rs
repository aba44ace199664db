//! Query Module
//!
//! Cached read queries and slow-query analysis over the durable store.

mod analyzer;
mod cache;

pub use analyzer::{advice_for, normalize_query, QueryAnalyzer, Suggestion};
pub use cache::{QueryExecutor, QueryOptions};
