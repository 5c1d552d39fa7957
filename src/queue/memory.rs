//! In-process durable queue for tests and single-node deployments
//!
//! Bodies round-trip through serialized bytes so the queue exercises the
//! same serializability contract a real broker transport requires.
//! Received messages move to an in-flight map keyed by receipt;
//! acknowledging removes them, and `redeliver()` returns everything still
//! in flight to the ready queue the way a visibility timeout would.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::DurableQueueClient;
use crate::events::{EventEnvelope, QueueMessage, ReceiptHandle};

#[derive(Debug, Clone)]
struct StoredMessage {
    body: Vec<u8>,
}

#[derive(Debug, Default)]
struct QueueInner {
    ready: VecDeque<StoredMessage>,
    in_flight: ahash::AHashMap<String, StoredMessage>,
}

/// In-memory `DurableQueueClient` implementation
#[derive(Debug, Default)]
pub struct InMemoryDurableQueue {
    inner: Mutex<QueueInner>,
}

impl InMemoryDurableQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages waiting to be received
    pub async fn ready_len(&self) -> usize {
        self.inner.lock().await.ready.len()
    }

    /// Number of received but unacknowledged messages
    pub async fn in_flight_len(&self) -> usize {
        self.inner.lock().await.in_flight.len()
    }

    /// Return every in-flight message to the ready queue
    ///
    /// Simulates visibility-timeout expiry: unacknowledged messages become
    /// receivable again with fresh ids and receipts. Returns the number of
    /// messages redelivered.
    pub async fn redeliver(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let count = inner.in_flight.len();
        let redelivered: Vec<StoredMessage> = inner.in_flight.drain().map(|(_, m)| m).collect();
        inner.ready.extend(redelivered);
        count
    }
}

#[async_trait]
impl DurableQueueClient for InMemoryDurableQueue {
    async fn enqueue(&self, event: EventEnvelope) -> Result<QueueMessage> {
        let body = serde_json::to_vec(&event).context("failed to serialize event")?;
        let mut inner = self.inner.lock().await;
        inner.ready.push_back(StoredMessage { body });
        Ok(QueueMessage {
            id: Uuid::new_v4(),
            body: event,
            handle: None,
        })
    }

    async fn acknowledge(&self, handle: &ReceiptHandle) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .in_flight
            .remove(handle.as_str())
            .map(|_| ())
            .ok_or_else(|| anyhow!("unknown or already acknowledged receipt"))
    }

    async fn receive(&self, batch_size: usize) -> Result<Vec<QueueMessage>> {
        let mut inner = self.inner.lock().await;
        let mut messages = Vec::new();
        while messages.len() < batch_size {
            let Some(stored) = inner.ready.pop_front() else {
                break;
            };
            let event: EventEnvelope = serde_json::from_slice(&stored.body)
                .context("failed to deserialize stored event")?;
            let receipt = Uuid::new_v4().to_string();
            inner.in_flight.insert(receipt.clone(), stored);
            messages.push(QueueMessage::durable(
                Uuid::new_v4(),
                event,
                ReceiptHandle::new(receipt),
            ));
        }
        Ok(messages)
    }
}
