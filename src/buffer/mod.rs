//! Bounded, time-windowed batching buffer for the fast path
//!
//! Many small fast-path items are batched into fewer, larger calls to a
//! downstream consumer, bounding both the maximum buffering delay and the
//! memory footprint, while each caller learns through a completion handle
//! whether their item was ultimately delivered.

// Sub-modules
pub mod handle;
pub mod queue;

// Re-exports for public API
pub use handle::{DeliveryHandle, DeliveryOutcome};
pub use queue::{
    BatchConsumer, BufferStats, BufferStatsSnapshot, BufferedDispatchQueue,
};
