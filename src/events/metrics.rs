//! Lock-free metrics for dispatch operations
//!
//! All counters use `Ordering::SeqCst` so snapshot reads stay coherent
//! across fields. Cycle time (event creation to index commit) is the
//! primary lag signal and is recorded exactly once per merged partial
//! result, at commit time rather than at enqueue time.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for dual-path dispatch using lock-free atomic operations
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    pub events_offered: AtomicU64,
    pub events_dropped: AtomicU64,
    pub batches_committed: AtomicU64,
    pub fast_path_failures: AtomicU64,
    pub durable_enqueued: AtomicU64,
    pub messages_acknowledged: AtomicU64,
    cycle_time_total_ms: AtomicU64,
    cycle_time_count: AtomicU64,
    cycle_time_max_ms: AtomicU64,
}

impl DispatchMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_offered(&self) {
        self.events_offered.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_committed(&self) {
        self.batches_committed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_fast_path_failures(&self) {
        self.fast_path_failures.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_durable_enqueued(&self) {
        self.durable_enqueued.fetch_add(1, Ordering::SeqCst);
    }

    pub fn add_acknowledged(&self, count: u64) {
        self.messages_acknowledged.fetch_add(count, Ordering::SeqCst);
    }

    /// Record one event's creation-to-commit cycle time
    pub fn record_cycle_time(&self, created_at: DateTime<Utc>) {
        let elapsed_ms = (Utc::now() - created_at).num_milliseconds().max(0) as u64;
        self.cycle_time_total_ms.fetch_add(elapsed_ms, Ordering::SeqCst);
        self.cycle_time_count.fetch_add(1, Ordering::SeqCst);
        let _ = self.cycle_time_max_ms.fetch_max(elapsed_ms, Ordering::SeqCst);
    }

    /// Get a consistent snapshot of all counters
    #[must_use]
    pub fn snapshot(&self) -> DispatchMetricsSnapshot {
        DispatchMetricsSnapshot {
            events_offered: self.events_offered.load(Ordering::SeqCst),
            events_dropped: self.events_dropped.load(Ordering::SeqCst),
            batches_committed: self.batches_committed.load(Ordering::SeqCst),
            fast_path_failures: self.fast_path_failures.load(Ordering::SeqCst),
            durable_enqueued: self.durable_enqueued.load(Ordering::SeqCst),
            messages_acknowledged: self.messages_acknowledged.load(Ordering::SeqCst),
            cycle_time_total_ms: self.cycle_time_total_ms.load(Ordering::SeqCst),
            cycle_time_count: self.cycle_time_count.load(Ordering::SeqCst),
            cycle_time_max_ms: self.cycle_time_max_ms.load(Ordering::SeqCst),
        }
    }
}

/// Immutable snapshot of dispatch metrics
#[derive(Debug, Clone, Copy)]
pub struct DispatchMetricsSnapshot {
    pub events_offered: u64,
    pub events_dropped: u64,
    pub batches_committed: u64,
    pub fast_path_failures: u64,
    pub durable_enqueued: u64,
    pub messages_acknowledged: u64,
    pub cycle_time_total_ms: u64,
    pub cycle_time_count: u64,
    pub cycle_time_max_ms: u64,
}

impl DispatchMetricsSnapshot {
    /// Mean creation-to-commit cycle time in milliseconds
    ///
    /// Returns 0.0 before any result has been committed.
    #[must_use]
    pub fn average_cycle_time_ms(&self) -> f64 {
        if self.cycle_time_count == 0 {
            return 0.0;
        }
        self.cycle_time_total_ms as f64 / self.cycle_time_count as f64
    }
}
