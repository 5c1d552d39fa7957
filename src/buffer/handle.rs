//! Per-item delivery completion handles
//!
//! Every buffered item resolves to exactly one outcome. The producer-facing
//! handle supports waiting with an optional timeout and best-effort
//! cancellation; the buffer-side slot resolves at most once, and dropping
//! an unresolved slot resolves the handle as not delivered so a dead worker
//! can never leave a caller waiting forever.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;

/// Final status of one buffered item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The batch containing this item was delivered to the consumer
    Delivered,
    /// The batch failed, the item was cancelled, or the worker went away
    NotDelivered,
}

/// Producer-facing handle resolving to the item's delivery outcome
#[derive(Debug)]
pub struct DeliveryHandle {
    receiver: oneshot::Receiver<DeliveryOutcome>,
    cancelled: Arc<AtomicBool>,
}

impl DeliveryHandle {
    /// Wait until the item's batch is attempted
    ///
    /// Resolves `NotDelivered` if the buffer worker is gone.
    pub async fn wait(self) -> DeliveryOutcome {
        self.receiver.await.unwrap_or(DeliveryOutcome::NotDelivered)
    }

    /// Wait for at most `timeout`; `None` means the outcome is still pending
    /// and the handle stays usable for a later wait
    pub async fn wait_timeout(&mut self, timeout: Duration) -> Option<DeliveryOutcome> {
        tokio::time::timeout(timeout, &mut self.receiver)
            .await
            .ok()
            .map(|result| result.unwrap_or(DeliveryOutcome::NotDelivered))
    }

    /// Request that the item not be delivered
    ///
    /// Best-effort: honored only if the item has not yet been drained into
    /// a batch attempt. A cancelled item resolves `NotDelivered` at drain
    /// time; cancelling after drain is a no-op.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

/// Buffer-side resolver paired with one `DeliveryHandle`
#[derive(Debug)]
pub(crate) struct DeliverySlot {
    sender: Option<oneshot::Sender<DeliveryOutcome>>,
    cancelled: Arc<AtomicBool>,
}

impl DeliverySlot {
    /// Create a connected slot/handle pair
    pub(crate) fn pair() -> (Self, DeliveryHandle) {
        let (sender, receiver) = oneshot::channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let slot = Self {
            sender: Some(sender),
            cancelled: cancelled.clone(),
        };
        let handle = DeliveryHandle {
            receiver,
            cancelled,
        };
        (slot, handle)
    }

    /// Resolve the handle; resolving twice is a no-op
    pub(crate) fn resolve(&mut self, outcome: DeliveryOutcome) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(outcome);
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Drop for DeliverySlot {
    fn drop(&mut self) {
        self.resolve(DeliveryOutcome::NotDelivered);
    }
}
