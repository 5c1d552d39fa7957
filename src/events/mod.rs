//! Mutation event types and dispatch plumbing shared by both delivery paths
//!
//! This module defines the closed set of mutation events produced by the
//! store of record, the queue message wrapper they travel in, and the
//! error and metrics types used by the dispatch layer.

// Sub-modules
pub mod errors;
pub mod message;
pub mod metrics;
pub mod types;

// Re-exports for public API
pub use errors::DispatchError;
pub use message::{QueueMessage, ReceiptHandle};
pub use metrics::{DispatchMetrics, DispatchMetricsSnapshot};
pub use types::{
    ApplicationScope, CollectionScope, Edge, EntityId, EventEnvelope, IndexLocation,
};
