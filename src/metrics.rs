use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing a processing run.
#[derive(Default)]
pub struct ProcessingStats {
    processed: AtomicU64,
    failed: AtomicU64,
    total_bytes: AtomicU64,
    total_chunks: AtomicU64,
    persistence_failures: AtomicU64,
}

impl ProcessingStats {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a document that reached `Done`.
    pub fn record_success(&self, size_bytes: u64, chunk_count: u64) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.total_bytes.fetch_add(size_bytes, Ordering::Relaxed);
        self.total_chunks.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a document that ended in `Failed`.
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record artifacts that could not be written.
    pub fn record_persistence_failures(&self, artifacts: u64) {
        self.persistence_failures
            .fetch_add(artifacts, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            total_chunks: self.total_chunks.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the run counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StatsSnapshot {
    /// Documents that completed the pipeline.
    pub processed: u64,
    /// Documents that failed.
    pub failed: u64,
    /// Bytes of source files processed successfully.
    pub total_bytes: u64,
    /// Chunks produced across processed documents.
    pub total_chunks: u64,
    /// Artifacts the persistence sink failed to write.
    pub persistence_failures: u64,
}

impl StatsSnapshot {
    /// Documents attempted, successful or not.
    pub fn attempted(&self) -> u64 {
        self.processed + self.failed
    }

    /// Percentage of attempted documents that succeeded; `0.0` when nothing ran.
    pub fn success_rate(&self) -> f64 {
        let attempted = self.attempted();
        if attempted == 0 {
            0.0
        } else {
            self.processed as f64 / attempted as f64 * 100.0
        }
    }
}
