//! Polling consumer for the durable path
//!
//! Repeatedly receives a batch from the durable queue and feeds it through
//! the dispatcher's handler path. Messages are acknowledged only after the
//! commit that subsumes them succeeds; a failed batch stays in flight and
//! is redelivered, which is what makes the durable path at-least-once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::DurableQueueClient;
use crate::dispatch::DualPathDispatcher;
use crate::events::DispatchError;

/// Background worker draining the durable queue into the dispatcher
pub struct DurableQueueConsumer {
    dispatcher: Arc<DualPathDispatcher>,
    queue: Arc<dyn DurableQueueClient>,
    batch_size: usize,
    poll_interval: Duration,
    shutdown: Arc<Notify>,
    running: Arc<AtomicBool>,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl DurableQueueConsumer {
    #[must_use]
    pub fn new(
        dispatcher: Arc<DualPathDispatcher>,
        queue: Arc<dyn DurableQueueClient>,
        batch_size: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            dispatcher,
            queue,
            batch_size,
            poll_interval,
            shutdown: Arc::new(Notify::new()),
            running: Arc::new(AtomicBool::new(false)),
            worker: parking_lot::Mutex::new(None),
        }
    }

    /// Spawn the polling worker
    pub fn start(&self) -> Result<(), DispatchError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(DispatchError::AlreadyStarted);
        }
        let dispatcher = self.dispatcher.clone();
        let queue = self.queue.clone();
        let batch_size = self.batch_size;
        let poll_interval = self.poll_interval;
        let shutdown = self.shutdown.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        poll_once(&dispatcher, queue.as_ref(), batch_size).await;
                    }
                    _ = shutdown.notified() => break,
                }
            }
        });
        *self.worker.lock() = Some(handle);
        Ok(())
    }

    /// Stop the polling worker
    ///
    /// Any batch already received but not yet committed stays in flight
    /// and is redelivered.
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

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

async fn poll_once(
    dispatcher: &DualPathDispatcher,
    queue: &dyn DurableQueueClient,
    batch_size: usize,
) {
    let messages = match queue.receive(batch_size).await {
        Ok(messages) => messages,
        Err(err) => {
            log::warn!("durable queue receive failed: {err:#}");
            return;
        }
    };
    if messages.is_empty() {
        return;
    }

    let count = messages.len();
    match dispatcher.process_received(messages).await {
        Ok(acked) => log::debug!("processed {count} durable messages, acknowledged {acked}"),
        Err(err) => {
            log::warn!(
                "durable batch of {count} failed, left unacknowledged for redelivery: {err:#}"
            );
        }
    }
}
