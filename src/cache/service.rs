//! Cache Service Module
//!
//! The orchestrator coordinating the memory tier and the persistent store:
//! write-through `set`, cache-aside `get` with rehydration, tag
//! invalidation and per-operation analytics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::codec;
use crate::cache::entry::{CacheEntry, Codec, Priority};
use crate::cache::memory::{MemoryTier, PutOutcome};
use crate::cache::stats::CacheStats;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::metrics::{AnalyticsLog, AnalyticsRecord, CacheOperation, Diagnostic};
use crate::store::{SqliteStore, StorePool};

// == Cache Options ==
/// Typed per-write options, replacing an untyped option bag.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Seconds until the entry expires
    pub ttl_seconds: u64,
    /// Labels for group invalidation
    pub tags: Vec<String>,
    /// Eviction order hint
    pub priority: Priority,
    /// Codec applied to the serialized value
    pub compression: Codec,
    /// Key-space partition
    pub namespace: String,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ttl_seconds: 3600,
            tags: Vec::new(),
            priority: Priority::Low,
            compression: Codec::None,
            namespace: "default".to_string(),
        }
    }
}

impl CacheOptions {
    pub fn ttl_seconds(mut self, ttl: u64) -> Self {
        self.ttl_seconds = ttl;
        self
    }

    pub fn tags<I: IntoIterator<Item = S>, S: Into<String>>(mut self, tags: I) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn compression(mut self, compression: Codec) -> Self {
        self.compression = compression;
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}

// == Cache Service ==
/// Two-tier cache orchestrator.
///
/// The persistent store is the system of record: every `set` is written
/// through before the memory tier is touched, so losing the in-memory copy
/// loses performance, never data. Constructed explicitly and passed by
/// reference; there is no process-global instance.
pub struct CacheService {
    memory: RwLock<MemoryTier>,
    store: Arc<SqliteStore>,
    analytics: Arc<AnalyticsLog>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheService {
    // == Lifecycle ==
    /// Builds the pool, ensures the schema and returns a ready service.
    pub async fn init(config: CacheConfig) -> Result<Self> {
        let pool = Arc::new(StorePool::open(
            &config.db_path,
            config.pool_size,
            config.pool_acquire_timeout,
        )?);
        let store = Arc::new(SqliteStore::new(pool).await?);

        info!(
            db_path = %config.db_path,
            max_memory_bytes = config.max_memory_bytes,
            pool_size = config.pool_size,
            "cache service ready"
        );

        Ok(Self {
            memory: RwLock::new(MemoryTier::new(config.max_memory_bytes)),
            store,
            analytics: Arc::new(AnalyticsLog::new(config.analytics_capacity)),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    /// Stops the pool and drops the memory tier contents.
    pub async fn shutdown(&self) {
        self.store.pool().shutdown().await;
        self.memory.write().await.clear();
        info!("cache service shut down");
    }

    /// The persistent tier, shared with the query executor and scheduler.
    pub fn store(&self) -> Arc<SqliteStore> {
        self.store.clone()
    }

    /// The analytics sink the host application drains.
    pub fn analytics(&self) -> Arc<AnalyticsLog> {
        self.analytics.clone()
    }

    /// Effective configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // == Set ==
    /// Serializes and stores a value, write-through then memory insert.
    ///
    /// Returns `false` only on serialization or store-write failure; a
    /// memory tier that cannot fit the entry evicts or rejects without
    /// failing the call. Failures are logged, never thrown.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, opts: CacheOptions) -> bool {
        let start = Instant::now();
        let storage_key = codec::cache_key(&opts.namespace, key);

        let bytes = match codec::encode(value, opts.compression) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(key, %err, "cache set rejected: serialization failed");
                self.analytics.diagnose(Diagnostic::EncodeFailure {
                    key: storage_key,
                    reason: err.to_string(),
                });
                return false;
            }
        };

        let entry = CacheEntry::new(
            bytes,
            opts.namespace.clone(),
            opts.ttl_seconds,
            opts.tags.clone(),
            opts.priority,
            opts.compression,
        );
        let size_bytes = entry.size_bytes;

        if let Err(err) = self.store.upsert(&storage_key, &entry).await {
            warn!(key, %err, "cache set rejected: store write failed");
            return false;
        }

        // Memory insert; capacity check and size commit stay inside one
        // write-lock hold, with no await point in between.
        let evicted = {
            let mut tier = self.memory.write().await;
            match tier.put(storage_key.clone(), entry) {
                PutOutcome::Stored { evicted } => evicted,
                PutOutcome::Rejected => {
                    debug!(key, "entry too large for memory tier, store-only");
                    Vec::new()
                }
            }
        };
        self.note_evictions(&evicted);

        self.analytics.record(
            AnalyticsRecord::new(
                &storage_key,
                CacheOperation::Set,
                elapsed_ms(start),
                size_bytes,
            )
            .with_write_opts(opts.ttl_seconds, &opts.tags),
        );
        true
    }

    // == Get ==
    /// Reads a value: memory fast path, store fallback with rehydration.
    ///
    /// A decode failure is observably identical to a miss (`None`); the
    /// corruption is reported separately as a typed diagnostic.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, namespace: &str) -> Option<T> {
        let start = Instant::now();
        let storage_key = codec::cache_key(namespace, key);

        // Fast path: no store I/O on a memory hit
        let cached = {
            let mut tier = self.memory.write().await;
            tier.get(&storage_key)
                .map(|e| (e.value.clone(), e.compression, e.size_bytes))
        };
        if let Some((bytes, compression, size_bytes)) = cached {
            return match codec::decode(&bytes, compression) {
                Ok(value) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    self.record_read(&storage_key, CacheOperation::Hit, start, size_bytes);
                    Some(value)
                }
                Err(err) => {
                    self.discard_corrupt(&storage_key, &err.to_string()).await;
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    self.record_read(&storage_key, CacheOperation::Miss, start, 0);
                    None
                }
            };
        }

        // Store fallback
        let entry = match self.store.get(&storage_key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.record_read(&storage_key, CacheOperation::Miss, start, 0);
                return None;
            }
            Err(err) => {
                // A store failure reads as a miss
                warn!(key, %err, "store read failed");
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.record_read(&storage_key, CacheOperation::Miss, start, 0);
                return None;
            }
        };

        let (bytes, compression, size_bytes) =
            (entry.value.clone(), entry.compression, entry.size_bytes);

        // Rehydrate under the same capacity rule as set
        let evicted = {
            let mut tier = self.memory.write().await;
            match tier.put(storage_key.clone(), entry) {
                PutOutcome::Stored { evicted } => evicted,
                PutOutcome::Rejected => Vec::new(),
            }
        };
        self.note_evictions(&evicted);

        match codec::decode(&bytes, compression) {
            Ok(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                self.record_read(&storage_key, CacheOperation::Hit, start, size_bytes);
                Some(value)
            }
            Err(err) => {
                self.discard_corrupt(&storage_key, &err.to_string()).await;
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.record_read(&storage_key, CacheOperation::Miss, start, 0);
                None
            }
        }
    }

    // == Delete ==
    /// Removes a key from both tiers. Returns true if either tier held it.
    pub async fn delete(&self, key: &str, namespace: &str) -> bool {
        let start = Instant::now();
        let storage_key = codec::cache_key(namespace, key);

        let in_memory = self.memory.write().await.remove(&storage_key);
        let in_store = match self.store.delete(&storage_key).await {
            Ok(deleted) => deleted,
            Err(err) => {
                warn!(key, %err, "store delete failed");
                false
            }
        };

        self.analytics.record(AnalyticsRecord::new(
            &storage_key,
            CacheOperation::Delete,
            elapsed_ms(start),
            0,
        ));
        in_memory || in_store
    }

    // == Invalidate By Tags ==
    /// Removes every entry carrying any of the given tags, in both tiers.
    ///
    /// O(memory-tier size) plus a store scan; invalidation is rare
    /// relative to reads. Returns the total entries removed across both
    /// tiers.
    pub async fn invalidate_by_tags(&self, tags: &[String]) -> usize {
        let start = Instant::now();

        let from_memory = self.memory.write().await.remove_by_tags(tags);
        let from_store = match self.store.delete_by_tags(tags).await {
            Ok(count) => count,
            Err(err) => {
                warn!(?tags, %err, "store tag invalidation failed");
                0
            }
        };

        self.analytics.record(AnalyticsRecord::new(
            &format!("tags:{}", tags.join(",")),
            CacheOperation::Delete,
            elapsed_ms(start),
            0,
        ));
        debug!(?tags, from_memory, from_store, "tag invalidation");
        from_memory + from_store
    }

    // == Stats ==
    /// Point-in-time counters and memory occupancy.
    pub async fn stats(&self) -> CacheStats {
        let tier = self.memory.read().await;
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            memory_entries: tier.len(),
            memory_bytes: tier.current_size(),
            memory_limit_bytes: tier.max_size(),
        }
    }

    // == Sweep ==
    /// Removes expired entries from both tiers.
    /// Returns `(memory_removed, store_removed)`.
    pub async fn sweep_expired(&self) -> (usize, usize) {
        let from_memory = self.memory.write().await.sweep_expired();
        let from_store = match self.store.sweep_expired().await {
            Ok(count) => count,
            Err(err) => {
                warn!(%err, "store sweep failed");
                0
            }
        };
        (from_memory, from_store)
    }

    /// Empties the memory tier. The persistent store is untouched; reads
    /// repopulate the tier on demand.
    pub async fn clear_memory(&self) {
        self.memory.write().await.clear();
    }

    // == Internals ==
    fn record_read(&self, key: &str, op: CacheOperation, start: Instant, size_bytes: u64) {
        self.analytics
            .record(AnalyticsRecord::new(key, op, elapsed_ms(start), size_bytes));
    }

    fn note_evictions(&self, evicted: &[String]) {
        if evicted.is_empty() {
            return;
        }
        self.evictions
            .fetch_add(evicted.len() as u64, Ordering::Relaxed);
        for key in evicted {
            self.analytics
                .record(AnalyticsRecord::new(key, CacheOperation::Evict, 0.0, 0));
        }
    }

    async fn discard_corrupt(&self, storage_key: &str, reason: &str) {
        warn!(key = storage_key, reason, "corrupt cache payload discarded");
        self.memory.write().await.remove(storage_key);
        self.analytics.diagnose(Diagnostic::DecodeFailure {
            key: storage_key.to_string(),
            reason: reason.to_string(),
        });
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
