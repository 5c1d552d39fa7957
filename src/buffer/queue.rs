//! Bounded blocking buffer with a fixed-period flush worker
//!
//! Producers offer items from arbitrary tasks; a single background worker
//! drains the whole buffer every flush interval and delivers it as one
//! batch to the injected consumer. An offer arriving after a full idle
//! interval bypasses the buffer and dispatches as a singleton batch, so
//! sparse traffic never waits for the next scheduled flush. Capacity is a
//! deliberate backpressure point: a persistently full buffer means the
//! consumer is the bottleneck, and the producer is told so.

use anyhow::Result;
use async_trait::async_trait;
use smallvec::SmallVec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::sync::mpsc::{
    self,
    error::{SendTimeoutError, TryRecvError},
};
use tokio::task::JoinHandle;

use super::handle::{DeliveryHandle, DeliveryOutcome, DeliverySlot};
use crate::events::DispatchError;

/// Inline capacity for drained batches before spilling to the heap
const BATCH_INLINE: usize = 32;

/// Receives each flushed batch
///
/// A returned error fails the batch in aggregate: every item in it
/// resolves as not delivered. There is no partial success inside one
/// buffered batch; the buffer trades batch-failure granularity for
/// throughput.
#[async_trait]
pub trait BatchConsumer<T: Send + 'static>: Send + Sync {
    async fn consume(&self, batch: Vec<T>) -> Result<()>;
}

/// One buffered item paired with its completion slot
struct Buffered<T> {
    item: T,
    slot: DeliverySlot,
}

type Batch<T> = SmallVec<[Buffered<T>; BATCH_INLINE]>;

/// Lock-free delivery statistics
#[derive(Debug, Default)]
pub struct BufferStats {
    pub batches_attempted: AtomicU64,
    pub batches_failed: AtomicU64,
    pub items_delivered: AtomicU64,
    pub items_failed: AtomicU64,
}

impl BufferStats {
    #[must_use]
    pub fn snapshot(&self) -> BufferStatsSnapshot {
        BufferStatsSnapshot {
            batches_attempted: self.batches_attempted.load(Ordering::SeqCst),
            batches_failed: self.batches_failed.load(Ordering::SeqCst),
            items_delivered: self.items_delivered.load(Ordering::SeqCst),
            items_failed: self.items_failed.load(Ordering::SeqCst),
        }
    }
}

/// Immutable snapshot of buffer delivery statistics
#[derive(Debug, Clone, Copy)]
pub struct BufferStatsSnapshot {
    pub batches_attempted: u64,
    pub batches_failed: u64,
    pub items_delivered: u64,
    pub items_failed: u64,
}

/// Bounded, time-windowed batching buffer with per-item completion handles
///
/// The worker task is not spawned until `start()`; `stop()` performs one
/// final best-effort flush before the worker exits, so tests can construct
/// independent instances without global state.
pub struct BufferedDispatchQueue<T: Send + 'static> {
    tx: mpsc::Sender<Buffered<T>>,
    rx: parking_lot::Mutex<Option<mpsc::Receiver<Buffered<T>>>>,
    consumer: Arc<dyn BatchConsumer<T>>,
    flush_interval: Duration,
    depth: Arc<AtomicUsize>,
    last_attempt: Arc<parking_lot::Mutex<Instant>>,
    shutdown: Arc<Notify>,
    running: Arc<AtomicBool>,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
    stats: Arc<BufferStats>,
}

impl<T: Send + 'static> BufferedDispatchQueue<T> {
    /// Create a queue with the given capacity and flush interval
    ///
    /// `capacity` must be at least 1. The worker does not run until
    /// `start()` is called.
    #[must_use]
    pub fn new(
        capacity: usize,
        flush_interval: Duration,
        consumer: Arc<dyn BatchConsumer<T>>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: parking_lot::Mutex::new(Some(rx)),
            consumer,
            flush_interval,
            depth: Arc::new(AtomicUsize::new(0)),
            last_attempt: Arc::new(parking_lot::Mutex::new(Instant::now())),
            shutdown: Arc::new(Notify::new()),
            running: Arc::new(AtomicBool::new(false)),
            worker: parking_lot::Mutex::new(None),
            stats: Arc::new(BufferStats::default()),
        }
    }

    /// Spawn the background flush worker
    pub fn start(&self) -> Result<(), DispatchError> {
        let receiver = self
            .rx
            .lock()
            .take()
            .ok_or(DispatchError::AlreadyStarted)?;
        self.running.store(true, Ordering::Release);

        let consumer = self.consumer.clone();
        let depth = self.depth.clone();
        let last_attempt = self.last_attempt.clone();
        let shutdown = self.shutdown.clone();
        let stats = self.stats.clone();
        let flush_interval = self.flush_interval;

        let handle = tokio::spawn(async move {
            worker_loop(
                receiver,
                consumer,
                flush_interval,
                depth,
                last_attempt,
                shutdown,
                stats,
            )
            .await;
        });
        *self.worker.lock() = Some(handle);
        Ok(())
    }

    /// Offer one item for batched delivery
    ///
    /// If at least one flush interval has elapsed since the last delivery
    /// attempt, the item dispatches immediately as a singleton batch,
    /// bypassing the buffer. Otherwise it is buffered; when the buffer is
    /// full the call waits up to one flush interval for space before
    /// failing with `DispatchError::BufferFull`.
    pub async fn offer(&self, item: T) -> Result<DeliveryHandle, DispatchError> {
        if !self.running.load(Ordering::Acquire) {
            return Err(DispatchError::Shutdown);
        }

        let (slot, handle) = DeliverySlot::pair();
        let buffered = Buffered { item, slot };

        let immediate = {
            let mut last = self.last_attempt.lock();
            if last.elapsed() >= self.flush_interval {
                *last = Instant::now();
                true
            } else {
                false
            }
        };
        if immediate {
            let mut batch: Batch<T> = SmallVec::new();
            batch.push(buffered);
            deliver(self.consumer.as_ref(), batch, &self.stats).await;
            return Ok(handle);
        }

        match self.tx.send_timeout(buffered, self.flush_interval).await {
            Ok(()) => {
                self.depth.fetch_add(1, Ordering::SeqCst);
                Ok(handle)
            }
            Err(SendTimeoutError::Timeout(_)) => Err(DispatchError::BufferFull),
            Err(SendTimeoutError::Closed(_)) => Err(DispatchError::Shutdown),
        }
    }

    /// Stop the worker after one final best-effort flush
    ///
    /// A batch that fails during this flush is lost from the fast path;
    /// callers requiring guarantees use the durable strategy instead.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.shutdown.notify_one();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Current buffer depth, for monitoring
    #[must_use]
    pub fn size(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Get current delivery statistics
    #[must_use]
    pub fn stats(&self) -> BufferStatsSnapshot {
        self.stats.snapshot()
    }
}

/// Fixed-period flush loop; exits after the final flush on shutdown
async fn worker_loop<T: Send + 'static>(
    mut receiver: mpsc::Receiver<Buffered<T>>,
    consumer: Arc<dyn BatchConsumer<T>>,
    flush_interval: Duration,
    depth: Arc<AtomicUsize>,
    last_attempt: Arc<parking_lot::Mutex<Instant>>,
    shutdown: Arc<Notify>,
    stats: Arc<BufferStats>,
) {
    let mut ticker = tokio::time::interval(flush_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let batch = drain(&mut receiver, &depth);
                if !batch.is_empty() {
                    *last_attempt.lock() = Instant::now();
                    deliver(consumer.as_ref(), batch, &stats).await;
                }
            }
            _ = shutdown.notified() => {
                let batch = drain(&mut receiver, &depth);
                if !batch.is_empty() {
                    log::debug!("final flush of {} buffered items", batch.len());
                    *last_attempt.lock() = Instant::now();
                    deliver(consumer.as_ref(), batch, &stats).await;
                }
                break;
            }
        }
    }
}

/// Take everything currently buffered
fn drain<T: Send + 'static>(
    receiver: &mut mpsc::Receiver<Buffered<T>>,
    depth: &AtomicUsize,
) -> Batch<T> {
    let mut batch: Batch<T> = SmallVec::new();
    loop {
        match receiver.try_recv() {
            Ok(buffered) => {
                depth.fetch_sub(1, Ordering::SeqCst);
                batch.push(buffered);
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
        }
    }
    batch
}

/// The single delivery routine shared by the scheduled flush, the
/// offer-triggered immediate dispatch, and the final flush on stop
async fn deliver<T: Send + 'static>(
    consumer: &dyn BatchConsumer<T>,
    batch: Batch<T>,
    stats: &BufferStats,
) {
    let mut items = Vec::with_capacity(batch.len());
    let mut slots = Vec::with_capacity(batch.len());
    for buffered in batch {
        let Buffered { item, mut slot } = buffered;
        if slot.is_cancelled() {
            slot.resolve(DeliveryOutcome::NotDelivered);
            continue;
        }
        items.push(item);
        slots.push(slot);
    }
    if items.is_empty() {
        return;
    }

    stats.batches_attempted.fetch_add(1, Ordering::SeqCst);
    match consumer.consume(items).await {
        Ok(()) => {
            stats
                .items_delivered
                .fetch_add(slots.len() as u64, Ordering::SeqCst);
            for mut slot in slots {
                slot.resolve(DeliveryOutcome::Delivered);
            }
        }
        Err(err) => {
            log::warn!("batch of {} failed to deliver: {err:#}", slots.len());
            stats.batches_failed.fetch_add(1, Ordering::SeqCst);
            stats
                .items_failed
                .fetch_add(slots.len() as u64, Ordering::SeqCst);
            for mut slot in slots {
                slot.resolve(DeliveryOutcome::NotDelivered);
            }
        }
    }
}
