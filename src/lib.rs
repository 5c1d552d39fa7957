//! Dual-path event dispatch and batching for search index replication
//!
//! Mutations committed to a store of record must be reflected in a
//! secondary search index that is slower and less available than the
//! store itself. This crate takes the stream of mutation events and
//! delivers them either through a buffered, low-latency fast path or
//! through a durable, at-least-once queue, governed by a per-call
//! indexing strategy and with automatic fallback from the fast path to
//! the durable path on failure.

pub mod aggregate;
pub mod buffer;

/// serde glue for `imstr::ImString`, which does not implement
/// `Serialize`/`Deserialize` in the available crate version. An immutable
/// string serializes exactly as its string contents.
pub(crate) mod imstr_serde {
    use imstr::ImString;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S>(value: &ImString, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value.as_str())
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<ImString, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(ImString::from(s))
    }
}

pub mod config;
pub mod dispatch;
pub mod events;
pub mod handlers;
pub mod index;
pub mod queue;
pub mod strategy;

pub use aggregate::{
    AggregatedBatch, CombinedIndexOperation, DocumentKey, IndexOperation, aggregate,
};
pub use buffer::{
    BatchConsumer, BufferStatsSnapshot, BufferedDispatchQueue, DeliveryHandle, DeliveryOutcome,
};
pub use config::{ConfigSource, DispatchConfig, DispatchSettings, SharedSettings};
pub use dispatch::DualPathDispatcher;
pub use events::{
    ApplicationScope, CollectionScope, DispatchError, DispatchMetrics, DispatchMetricsSnapshot,
    Edge, EntityId, EventEnvelope, IndexLocation, QueueMessage, ReceiptHandle,
};
pub use handlers::{EventHandler, PartialIndexResult};
pub use index::SearchIndexProvider;
pub use queue::{DurableQueueClient, DurableQueueConsumer, InMemoryDurableQueue};
pub use strategy::{IndexingStrategy, ResolvedStrategy, resolve};
