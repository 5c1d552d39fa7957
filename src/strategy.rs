//! Indexing strategy resolution
//!
//! Callers request a strategy per offer; the deployment's configured
//! default and debug-mode flag decide what actually runs. Resolution is a
//! pure total function so it is safe to call on every event without
//! synchronization, and the debug flag is an explicit argument sourced from
//! the config snapshot at the call site rather than hidden global state.

use serde::{Deserialize, Serialize};

/// Strategy a caller may request for one offered event
///
/// Ordered by increasing risk: `NoIndex` drops the event, `DirectOnly`
/// uses the buffered fast path with no durability until commit, `Async`
/// uses the durable queue, `Config` defers to the configured default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexingStrategy {
    /// Drop the event entirely (debug deployments only)
    NoIndex,
    /// Buffered fast path, low latency, best effort (debug deployments only)
    DirectOnly,
    /// Durable queue, at-least-once, higher latency
    Async,
    /// Defer to the globally configured default
    #[default]
    Config,
}

/// Strategy the dispatcher actually acts on
///
/// `Config` indirection is resolved away before dispatch, so downstream
/// code never has to re-consult configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedStrategy {
    NoIndex,
    DirectOnly,
    #[default]
    Async,
}

/// Resolve a requested strategy against the configured default and the
/// deployment's debug-mode flag
///
/// `NoIndex` and `DirectOnly` are privileged: they are honored only when
/// `debug_mode` is true and silently downgraded to the configured default
/// otherwise, so production traffic can never skip indexing or durability
/// through a per-call strategy.
#[must_use]
pub fn resolve(
    requested: IndexingStrategy,
    configured_default: ResolvedStrategy,
    debug_mode: bool,
) -> ResolvedStrategy {
    match requested {
        IndexingStrategy::Config => configured_default,
        IndexingStrategy::Async => ResolvedStrategy::Async,
        IndexingStrategy::NoIndex if debug_mode => ResolvedStrategy::NoIndex,
        IndexingStrategy::DirectOnly if debug_mode => ResolvedStrategy::DirectOnly,
        IndexingStrategy::NoIndex | IndexingStrategy::DirectOnly => configured_default,
    }
}
