//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL, tag,
//! priority and compression metadata.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// == Priority ==
/// Eviction order hint. Low-priority entries are evicted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low = 1,
    Medium = 2,
    High = 3,
}

impl Priority {
    /// Maps a caller-supplied numeric level (1|2|3) onto a priority.
    ///
    /// Unknown levels fall back to `Medium`.
    pub fn from_level(level: u8) -> Self {
        match level {
            1 => Priority::Low,
            3 => Priority::High,
            _ => Priority::Medium,
        }
    }

    /// Numeric level stored in the persistent tier.
    pub fn level(self) -> u8 {
        self as u8
    }
}

// == Codec ==
/// Compression codec applied to the serialized value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Codec {
    None,
    Gzip,
}

impl Codec {
    /// Name stored in the persistent tier.
    pub fn as_str(self) -> &'static str {
        match self {
            Codec::None => "none",
            Codec::Gzip => "gzip",
        }
    }

    /// Parses the stored name; unknown names read back as `None` so a
    /// corrupt column degrades to a decode failure, not a panic.
    pub fn parse(s: &str) -> Self {
        match s {
            "gzip" => Codec::Gzip,
            _ => Codec::None,
        }
    }
}

// == Cache Entry ==
/// Represents a single cache entry with serialized value and metadata.
///
/// The value and key are immutable once set; only `access_count` and
/// `last_accessed` are mutated in place, on successful reads.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Serialized (optionally compressed) payload
    pub value: Vec<u8>,
    /// Namespace the entry was written under
    pub namespace: String,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Absolute expiration timestamp (Unix milliseconds)
    pub expires_at: u64,
    /// Labels used for group invalidation
    pub tags: Vec<String>,
    /// Eviction order hint
    pub priority: Priority,
    /// Codec the value was encoded with
    pub compression: Codec,
    /// Reads served from this entry; eviction tie-break
    pub access_count: u64,
    /// Last successful read (Unix milliseconds)
    pub last_accessed: u64,
    /// Byte length of `value`, used for memory accounting
    pub size_bytes: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry expiring `ttl_seconds` from now.
    pub fn new(
        value: Vec<u8>,
        namespace: String,
        ttl_seconds: u64,
        tags: Vec<String>,
        priority: Priority,
        compression: Codec,
    ) -> Self {
        let now = current_timestamp_ms();
        let size_bytes = value.len() as u64;

        Self {
            value,
            namespace,
            created_at: now,
            expires_at: now + ttl_seconds * 1000,
            tags,
            priority,
            compression,
            access_count: 0,
            last_accessed: now,
            size_bytes,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// Boundary condition: an entry is expired once the current time is
    /// greater than or equal to `expires_at`, so a read issued exactly at
    /// the deadline already misses.
    pub fn is_expired(&self) -> bool {
        current_timestamp_ms() >= self.expires_at
    }

    // == Touch ==
    /// Records a successful read: bumps `access_count` and `last_accessed`.
    ///
    /// This is the only mutation permitted outside of insert/evict.
    pub fn touch(&mut self) {
        self.access_count += 1;
        self.last_accessed = current_timestamp_ms();
    }

    // == Tag Membership ==
    /// True if the entry carries any of the given tags (exact membership).
    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        self.tags.iter().any(|t| tags.contains(t))
    }

    /// Returns remaining TTL in milliseconds (0 once expired).
    pub fn ttl_remaining_ms(&self) -> u64 {
        self.expires_at.saturating_sub(current_timestamp_ms())
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}
