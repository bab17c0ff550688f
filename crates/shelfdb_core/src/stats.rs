//! Repository statistics.
//!
//! Counters are atomic and can be read while writes are in flight.
//!
//! ```rust,ignore
//! let stats = repo.stats();
//! println!("batches: {} durable writes: {}", stats.batches_flushed, stats.durable_writes);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Repository statistics.
#[derive(Debug, Default)]
pub struct RepositoryStats {
    // Operation counters
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    queries: AtomicU64,
    purged: AtomicU64,

    // Batcher counters
    batches_flushed: AtomicU64,
    durable_writes: AtomicU64,
    write_retries: AtomicU64,
    failed_batches: AtomicU64,
    bytes_written: AtomicU64,
}

impl RepositoryStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_writes(&self, count: u64) {
        self.writes.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_deletes(&self, count: u64) {
        self.deletes.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_purged(&self, count: u64) {
        self.purged.fetch_add(count, Ordering::Relaxed);
    }

    /// Records a successful batch flush of `bytes` bytes.
    pub(crate) fn record_flush(&self, bytes: u64) {
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
        self.durable_writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.write_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed_batch(&self) {
        self.failed_batches.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of read operations.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Returns the number of records written through the batcher.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Returns the number of records deleted.
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Returns the number of queries executed.
    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    /// Returns the number of records removed by purges.
    pub fn purged(&self) -> u64 {
        self.purged.load(Ordering::Relaxed)
    }

    /// Returns the number of batches flushed.
    pub fn batches_flushed(&self) -> u64 {
        self.batches_flushed.load(Ordering::Relaxed)
    }

    /// Returns the number of successful durable writes.
    ///
    /// One per flushed batch, regardless of how many records it carried.
    pub fn durable_writes(&self) -> u64 {
        self.durable_writes.load(Ordering::Relaxed)
    }

    /// Returns the number of retried write attempts.
    pub fn write_retries(&self) -> u64 {
        self.write_retries.load(Ordering::Relaxed)
    }

    /// Returns the number of batches that exhausted their retries.
    pub fn failed_batches(&self) -> u64 {
        self.failed_batches.load(Ordering::Relaxed)
    }

    /// Returns the total bytes written to the backend.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reads: self.reads(),
            writes: self.writes(),
            deletes: self.deletes(),
            queries: self.queries(),
            purged: self.purged(),
            batches_flushed: self.batches_flushed(),
            durable_writes: self.durable_writes(),
            write_retries: self.write_retries(),
            failed_batches: self.failed_batches(),
            bytes_written: self.bytes_written(),
        }
    }
}

/// A point-in-time copy of [`RepositoryStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Read operations.
    pub reads: u64,
    /// Records written.
    pub writes: u64,
    /// Records deleted.
    pub deletes: u64,
    /// Queries executed.
    pub queries: u64,
    /// Records removed by purges.
    pub purged: u64,
    /// Batches flushed.
    pub batches_flushed: u64,
    /// Successful durable writes.
    pub durable_writes: u64,
    /// Retried write attempts.
    pub write_retries: u64,
    /// Batches that exhausted their retries.
    pub failed_batches: u64,
    /// Bytes written to the backend.
    pub bytes_written: u64,
}
