//! Event handler seam and per-handler partial results
//!
//! One handler implementation exists per event kind, supplied by the
//! store-of-record write path and graph layer. Handlers are invoked with a
//! queue message and re-read current state from the store; they return
//! partial results that the aggregator folds into one combined operation.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::aggregate::IndexOperation;
use crate::events::QueueMessage;

/// The index mutations and acknowledgement claim produced by one handler
/// invocation for one message
///
/// A handler that found nothing to do (entity already gone, edge already
/// deleted) returns a result with the message present and no operation:
/// the event was legitimately fully handled, so the message is still
/// acknowledgeable once the batch commits.
#[derive(Debug, Clone)]
pub struct PartialIndexResult {
    /// When the originating event was created, for cycle-time metrics
    pub created_at: DateTime<Utc>,
    /// Present if this result should be acknowledged on commit success
    pub message: Option<QueueMessage>,
    /// Present if this handler produced index mutations to apply
    pub operation: Option<IndexOperation>,
}

impl PartialIndexResult {
    /// A handled message that produced index mutations
    #[must_use]
    pub fn applied(message: QueueMessage, operation: IndexOperation) -> Self {
        Self {
            created_at: message.body.timestamp(),
            message: Some(message),
            operation: Some(operation),
        }
    }

    /// A handled message with nothing left to index
    #[must_use]
    pub fn consumed(message: QueueMessage) -> Self {
        Self {
            created_at: message.body.timestamp(),
            message: Some(message),
            operation: None,
        }
    }

    /// An index mutation with no message of its own
    ///
    /// Used when one message fans out into many mutations; only one of the
    /// results carries the message, the rest carry operations only.
    #[must_use]
    pub fn operation_only(created_at: DateTime<Utc>, operation: IndexOperation) -> Self {
        Self {
            created_at,
            message: None,
            operation: Some(operation),
        }
    }
}

/// Turns one queue message into zero or more partial index results
///
/// Implementations must not return `Err` for expected conditions such as a
/// missing entity; those are modeled as consumed results. Only unexpected
/// infrastructure failures may escape, and the dispatcher treats any such
/// failure as the whole dispatch attempt failing.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle a message, returning an empty list for event kinds this
    /// handler does not recognize
    async fn handle(&self, message: &QueueMessage) -> Result<Vec<PartialIndexResult>>;
}
