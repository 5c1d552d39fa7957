//! Durable queue seam, in-memory implementation, and polling consumer
//!
//! The durable path survives process restarts and guarantees at-least-once
//! handling. This core only enqueues on the fallback/async path and
//! acknowledges after a successful commit; the broker transport behind the
//! trait is owned elsewhere.

use anyhow::Result;
use async_trait::async_trait;

use crate::events::{EventEnvelope, QueueMessage, ReceiptHandle};

// Sub-modules
pub mod consumer;
pub mod memory;

// Re-exports for public API
pub use consumer::DurableQueueConsumer;
pub use memory::InMemoryDurableQueue;

/// Client for the persistent queue backing the durable path
#[async_trait]
pub trait DurableQueueClient: Send + Sync {
    /// Durably store one event for later handling
    ///
    /// Returns the stored message; its id is unique to this enqueue
    /// attempt.
    async fn enqueue(&self, event: EventEnvelope) -> Result<QueueMessage>;

    /// Delete a received message once the commit subsuming it succeeded
    ///
    /// A receipt is valid for at most one acknowledgement.
    async fn acknowledge(&self, handle: &ReceiptHandle) -> Result<()>;

    /// Receive up to `batch_size` messages for processing
    ///
    /// Received messages stay in flight until acknowledged; an
    /// unacknowledged message is eventually redelivered with a fresh
    /// receipt.
    async fn receive(&self, batch_size: usize) -> Result<Vec<QueueMessage>>;
}
