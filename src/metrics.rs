//! Analytics Module
//!
//! Per-operation analytics records and corruption diagnostics, buffered in a
//! bounded in-process log that an external reporting collaborator drains.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

// == Cache Operation ==
/// Outcome class of a single cache or query operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheOperation {
    Hit,
    Miss,
    Set,
    Delete,
    Evict,
}

// == Analytics Record ==
/// One row per cache operation, consumable by reporting/alerting.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsRecord {
    /// Derived storage key the operation touched
    pub key: String,
    /// Outcome class
    pub operation: CacheOperation,
    /// Wall-clock time the operation took
    pub latency_ms: f64,
    /// Payload size where known, 0 otherwise
    pub size_bytes: u64,
    /// TTL attached on `set`, absent on reads
    pub ttl_seconds: Option<u64>,
    /// Tags attached on `set`
    pub tags: Vec<String>,
    /// When the operation completed
    pub timestamp: DateTime<Utc>,
}

impl AnalyticsRecord {
    /// Builds a record stamped with the current time.
    pub fn new(key: &str, operation: CacheOperation, latency_ms: f64, size_bytes: u64) -> Self {
        Self {
            key: key.to_string(),
            operation,
            latency_ms,
            size_bytes,
            ttl_seconds: None,
            tags: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Attaches the write options recorded for `set` rows.
    pub fn with_write_opts(mut self, ttl_seconds: u64, tags: &[String]) -> Self {
        self.ttl_seconds = Some(ttl_seconds);
        self.tags = tags.to_vec();
        self
    }
}

// == Diagnostic ==
/// Internal corruption event.
///
/// Callers still observe a plain miss; these exist so operators can tell
/// true misses from decode failures without changing the caller contract.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Stored payload failed decompression or deserialization
    DecodeFailure { key: String, reason: String },
    /// Caller value failed serialization on `set`
    EncodeFailure { key: String, reason: String },
}

// == Analytics Log ==
/// Bounded ring of analytics records and diagnostics.
///
/// Uses a std `Mutex`: every critical section is a push/drain with no await
/// points, so holding it across threads is uncontended and brief.
#[derive(Debug)]
pub struct AnalyticsLog {
    records: Mutex<VecDeque<AnalyticsRecord>>,
    diagnostics: Mutex<VecDeque<Diagnostic>>,
    capacity: usize,
}

impl AnalyticsLog {
    // == Constructor ==
    /// Creates a log retaining at most `capacity` records of each kind.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            diagnostics: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    // == Record ==
    /// Appends an analytics record, dropping the oldest at capacity.
    pub fn record(&self, record: AnalyticsRecord) {
        let mut records = self.records.lock().expect("analytics lock poisoned");
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Appends a diagnostic event, dropping the oldest at capacity.
    pub fn diagnose(&self, diagnostic: Diagnostic) {
        let mut diagnostics = self.diagnostics.lock().expect("analytics lock poisoned");
        if diagnostics.len() == self.capacity {
            diagnostics.pop_front();
        }
        diagnostics.push_back(diagnostic);
    }

    // == Drain ==
    /// Removes and returns all buffered records, oldest first.
    pub fn drain(&self) -> Vec<AnalyticsRecord> {
        let mut records = self.records.lock().expect("analytics lock poisoned");
        records.drain(..).collect()
    }

    /// Removes and returns all buffered diagnostics, oldest first.
    pub fn drain_diagnostics(&self) -> Vec<Diagnostic> {
        let mut diagnostics = self.diagnostics.lock().expect("analytics lock poisoned");
        diagnostics.drain(..).collect()
    }

    /// Number of buffered records.
    pub fn len(&self) -> usize {
        self.records.lock().expect("analytics lock poisoned").len()
    }

    /// True if no records are buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
