//! Queue message wrapper carrying events through either delivery path
//!
//! Both the buffered fast path and the durable queue hand events to the
//! handler set wrapped in a `QueueMessage`, so there is exactly one handler
//! invocation path regardless of where a message came from.

use imstr::ImString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::EventEnvelope;

/// Opaque receipt needed to acknowledge a durably-received message
///
/// Receipts are minted by the durable queue at delivery time; redelivery of
/// the same logical event produces a fresh receipt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReceiptHandle(#[serde(with = "crate::imstr_serde")] ImString);

impl ReceiptHandle {
    #[must_use]
    pub fn new(token: impl Into<ImString>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A mutation event in transit through a delivery path
///
/// The `id` is unique per enqueue attempt, not per logical event; the
/// durable queue assigns a new one on every redelivery. A message is
/// acknowledged at most once, and only after the combined index operation
/// that subsumes it has been committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    pub id: Uuid,
    pub body: EventEnvelope,
    /// Present only for messages received from the durable queue
    pub handle: Option<ReceiptHandle>,
}

impl QueueMessage {
    /// Wrap an event for the fast path, which never touches durable storage
    ///
    /// Synthetic messages carry a locally-generated id and no receipt, so
    /// there is nothing to acknowledge after a successful commit.
    #[must_use]
    pub fn synthetic(body: EventEnvelope) -> Self {
        Self {
            id: Uuid::new_v4(),
            body,
            handle: None,
        }
    }

    /// Wrap an event delivered from the durable queue
    #[must_use]
    pub fn durable(id: Uuid, body: EventEnvelope, handle: ReceiptHandle) -> Self {
        Self {
            id,
            body,
            handle: Some(handle),
        }
    }
}
