//! Search-engine commit seam
//!
//! Abstracts the underlying search index implementation so backends can be
//! injected, and tests can observe commits without a real engine.

use anyhow::Result;
use async_trait::async_trait;

use crate::aggregate::CombinedIndexOperation;

/// Commits combined index operations to the search engine
///
/// Implementations apply the whole operation as a single unit. Any failure
/// means the caller must assume nothing was applied; that is safe because
/// the document-level mutations are idempotent, so a retried operation
/// converges to the same index state.
#[async_trait]
pub trait SearchIndexProvider: Send + Sync {
    /// Commit a combined operation
    ///
    /// # Arguments
    ///
    /// * `operation` - The merged document mutations to apply as one unit
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The operation was durably applied
    /// * `Err(_)` - Assume nothing was applied; the caller retries or
    ///   falls back to the durable path
    async fn commit(&self, operation: CombinedIndexOperation) -> Result<()>;
}
