//! Connection Pool Module
//!
//! Fixed-size pool of SQLite handles, created eagerly at startup and
//! recycled through a bounded channel. Acquisition waits with an explicit
//! timeout and fails with a typed error instead of spinning.

use std::ops::Deref;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;

use crate::cache::current_timestamp_ms;
use crate::error::{CacheError, Result};

/// Prepared statements cached per handle; the hot paths reuse a small,
/// fixed set of statements so the plan cache stays warm.
const STATEMENT_CACHE_CAPACITY: usize = 64;

// == Store Connection ==
/// A pooled SQLite handle plus recycling metadata.
#[derive(Debug)]
pub struct StoreConn {
    conn: Connection,
    /// Last time the handle was returned to the pool (Unix ms)
    pub last_used_at: u64,
}

// == Store Pool ==
/// Fixed pool of N store handles.
///
/// Handles live for the process lifetime: configured once at creation for
/// write concurrency (WAL journal, relaxed sync) and query-plan reuse, then
/// recycled through the channel on every acquire/release.
#[derive(Debug)]
pub struct StorePool {
    tx: mpsc::Sender<StoreConn>,
    rx: Mutex<mpsc::Receiver<StoreConn>>,
    acquire_timeout: Duration,
    size: usize,
    closed: AtomicBool,
}

impl StorePool {
    // == Constructor ==
    /// Opens `size` connections against the database eagerly.
    pub fn open(db_path: impl AsRef<Path>, size: usize, acquire_timeout: Duration) -> Result<Self> {
        if size == 0 {
            return Err(CacheError::Config("pool size must be at least 1".into()));
        }

        let (tx, rx) = mpsc::channel(size);
        for _ in 0..size {
            let conn = Self::open_handle(db_path.as_ref())?;
            tx.try_send(StoreConn {
                conn,
                last_used_at: current_timestamp_ms(),
            })
            .expect("pool channel sized to hold every handle");
        }

        debug!(size, "store pool ready");
        Ok(Self {
            tx,
            rx: Mutex::new(rx),
            acquire_timeout,
            size,
            closed: AtomicBool::new(false),
        })
    }

    /// One-time handle configuration, amortized over its lifetime.
    fn open_handle(db_path: &Path) -> Result<Connection> {
        let conn = Connection::open(db_path)?;

        // WAL lets readers proceed during writes; NORMAL sync is safe under
        // WAL and skips the second fsync per transaction.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        // Negative cache_size is KiB of page cache
        conn.pragma_update(None, "cache_size", -8192)?;
        conn.set_prepared_statement_cache_capacity(STATEMENT_CACHE_CAPACITY);

        Ok(conn)
    }

    // == Acquire ==
    /// Takes a free handle, waiting up to the configured timeout.
    ///
    /// Times out with [`CacheError::PoolTimeout`] rather than waiting
    /// indefinitely; sustained overload becomes an explicit error the
    /// caller can act on.
    pub async fn acquire(&self) -> Result<PooledConn> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Shutdown);
        }

        let mut rx = self.rx.lock().await;
        match timeout(self.acquire_timeout, rx.recv()).await {
            Ok(Some(inner)) => Ok(PooledConn {
                inner: Some(inner),
                tx: self.tx.clone(),
            }),
            Ok(None) => Err(CacheError::Shutdown),
            Err(_) => Err(CacheError::PoolTimeout {
                waited_ms: self.acquire_timeout.as_millis() as u64,
            }),
        }
    }

    // == Shutdown ==
    /// Stops handing out connections and drops every idle handle.
    ///
    /// Handles currently lent out are dropped when their guards release
    /// them back into the closed pool.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        let mut rx = self.rx.lock().await;
        while rx.try_recv().is_ok() {}
        debug!("store pool shut down");
    }

    /// Number of handles the pool was created with.
    pub fn size(&self) -> usize {
        self.size
    }
}

// == Pooled Connection Guard ==
/// Guard over a borrowed handle; releases it back to the pool on drop.
#[derive(Debug)]
pub struct PooledConn {
    inner: Option<StoreConn>,
    tx: mpsc::Sender<StoreConn>,
}

impl Deref for PooledConn {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.inner.as_ref().expect("connection present until drop").conn
    }
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            inner.last_used_at = current_timestamp_ms();
            // A full or closed channel means the pool shut down; the handle
            // just closes here instead of recycling.
            let _ = self.tx.try_send(inner);
        }
    }
}
