//! Configuration for the dual-path dispatcher
//!
//! Strategy-relevant settings are read as a fresh snapshot on every offer,
//! so a deployment can change its default strategy or debug mode at
//! runtime without restarting producers.

use std::time::Duration;

use crate::strategy::ResolvedStrategy;

/// Default fast-path buffer capacity
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;

/// Default flush interval for the fast-path buffer
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 100;

/// Default batch size when receiving from the durable queue
pub const DEFAULT_RECEIVE_BATCH_SIZE: usize = 50;

/// Default poll interval for the durable queue consumer
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// The strategy-relevant slice of configuration, snapshotted per offer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Strategy used when callers request `Config`, and the downgrade
    /// target for privileged strategies outside debug mode
    pub default_strategy: ResolvedStrategy,
    /// Relaxes strategy gating in non-production deployments
    pub debug_mode: bool,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            default_strategy: ResolvedStrategy::Async,
            debug_mode: false,
        }
    }
}

/// Provides the current settings snapshot
///
/// Called once per offer; implementations must not block.
pub trait ConfigSource: Send + Sync {
    fn current(&self) -> DispatchSettings;
}

/// Full dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Strategy used when callers request `Config`
    pub default_strategy: ResolvedStrategy,
    /// Whether privileged strategies are honored
    pub debug_mode: bool,
    /// Maximum number of fast-path items that can be buffered
    pub buffer_capacity: usize,
    /// Flush period for the fast-path buffer; also the bound on how long
    /// an offer waits for buffer space
    pub flush_interval: Duration,
    /// Messages per receive call when draining the durable queue
    pub receive_batch_size: usize,
    /// How often the durable queue consumer polls for messages
    pub poll_interval: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_strategy: ResolvedStrategy::Async,
            debug_mode: false,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            flush_interval: Duration::from_millis(DEFAULT_FLUSH_INTERVAL_MS),
            receive_batch_size: DEFAULT_RECEIVE_BATCH_SIZE,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl DispatchConfig {
    /// The strategy-relevant slice of this configuration
    #[must_use]
    pub fn settings(&self) -> DispatchSettings {
        DispatchSettings {
            default_strategy: self.default_strategy,
            debug_mode: self.debug_mode,
        }
    }
}

impl ConfigSource for DispatchConfig {
    fn current(&self) -> DispatchSettings {
        self.settings()
    }
}

/// Runtime-mutable settings source
///
/// Useful for deployments that flip debug mode or the default strategy
/// without restarting, and for tests that exercise the gating behavior.
#[derive(Debug, Default)]
pub struct SharedSettings {
    inner: parking_lot::RwLock<DispatchSettings>,
}

impl SharedSettings {
    #[must_use]
    pub fn new(settings: DispatchSettings) -> Self {
        Self {
            inner: parking_lot::RwLock::new(settings),
        }
    }

    pub fn set_debug_mode(&self, debug_mode: bool) {
        self.inner.write().debug_mode = debug_mode;
    }

    pub fn set_default_strategy(&self, strategy: ResolvedStrategy) {
        self.inner.write().default_strategy = strategy;
    }
}

impl ConfigSource for SharedSettings {
    fn current(&self) -> DispatchSettings {
        *self.inner.read()
    }
}
