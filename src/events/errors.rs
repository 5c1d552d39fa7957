//! Error types for dispatch operations
//!
//! Only two failures ever reach a producer: buffer-full backpressure on the
//! fast path, and a durable enqueue that could not be completed. Transient
//! downstream failures are recovered internally by falling back to the
//! durable path and are never surfaced here.

/// Error types for dispatch operations
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Fast-path buffer stayed full for the whole bounded wait
    ///
    /// The producer decides whether to retry, drop, or escalate; retrying
    /// inside the dispatcher could recursively re-block the caller.
    #[error("fast path buffer is full (capacity exceeded)")]
    BufferFull,

    /// The dispatcher or its buffer worker has been stopped
    #[error("dispatcher is shut down")]
    Shutdown,

    /// The buffer worker was already started
    #[error("buffer worker already started")]
    AlreadyStarted,

    /// The durable queue rejected an enqueue
    #[error("durable queue enqueue failed: {0}")]
    DurableEnqueue(anyhow::Error),
}
