//! Folding partial results into one combined index operation
//!
//! The aggregator merges the index mutations produced by every handler in
//! a batch into a single operation for one commit call, and separates the
//! messages that become acknowledgeable once that commit succeeds from
//! results that carry no message.

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use imstr::ImString;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::events::{ApplicationScope, Edge, EntityId, IndexLocation, QueueMessage};
use crate::handlers::PartialIndexResult;

/// Scope-qualified identity of one document in the search index
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentKey(#[serde(with = "crate::imstr_serde")] ImString);

impl DocumentKey {
    #[must_use]
    pub fn new(key: impl Into<ImString>) -> Self {
        Self(key.into())
    }

    /// Key for an entity's document
    #[must_use]
    pub fn for_entity(scope: &ApplicationScope, entity: &EntityId) -> Self {
        Self(ImString::from(format!(
            "{}/{}/{}",
            scope.application_id, entity.kind, entity.uuid
        )))
    }

    /// Key for an edge's denormalized document
    #[must_use]
    pub fn for_edge(scope: &ApplicationScope, edge: &Edge) -> Self {
        Self(ImString::from(format!(
            "{}/{}/{}--{}-->{}",
            scope.application_id, edge.source.kind, edge.source.uuid, edge.edge_type, edge.target.uuid
        )))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One document-level mutation against the search index
///
/// Upserts and deletes are idempotent and keyed by document identity, so
/// re-applying a committed operation is harmless. `Bootstrap` is keyless
/// index creation and always survives deduplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IndexOperation {
    /// Create or replace a document
    Upsert {
        document: DocumentKey,
        body: serde_json::Value,
    },
    /// Remove a document
    Delete { document: DocumentKey },
    /// Create the backing index for an application
    Bootstrap {
        scope: ApplicationScope,
        location: IndexLocation,
    },
}

impl IndexOperation {
    /// The document this operation is keyed by, if any
    #[must_use]
    pub fn document(&self) -> Option<&DocumentKey> {
        match self {
            Self::Upsert { document, .. } | Self::Delete { document } => Some(document),
            Self::Bootstrap { .. } => None,
        }
    }
}

/// The merged set of document mutations committed as a single unit
///
/// Merging is shallow: operations accumulate in batch order and conflicts
/// on the same document are resolved at aggregation time, last writer wins.
/// Ordering between different documents in one batch carries no meaning,
/// because the store of record, not the index, is authoritative.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CombinedIndexOperation {
    ops: Vec<IndexOperation>,
}

impl CombinedIndexOperation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one operation in batch order
    pub fn merge(&mut self, operation: IndexOperation) {
        self.ops.push(operation);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn operations(&self) -> &[IndexOperation] {
        &self.ops
    }

    #[must_use]
    pub fn into_operations(self) -> Vec<IndexOperation> {
        self.ops
    }
}

/// Output of one aggregation pass over a batch of partial results
#[derive(Debug)]
pub struct AggregatedBatch {
    /// The combined operation to commit, deduplicated last-writer-wins
    pub operation: CombinedIndexOperation,
    /// Messages safe to acknowledge once the operation commits
    pub ackable: Vec<QueueMessage>,
    /// Creation time of every merged result, recorded against cycle-time
    /// metrics at commit time
    pub creation_times: SmallVec<[DateTime<Utc>; 8]>,
}

/// Fold a batch of partial results into one combined operation plus the
/// messages that become acknowledgeable when it commits
///
/// Results with a message and no operation still contribute the message:
/// nothing to index, but the event was fully handled. Results with neither
/// contribute nothing. An empty input yields an empty operation and an
/// empty acknowledgeable list, which is a legal no-op.
///
/// When two results in the same batch touch the same document, the last
/// operation in batch order wins; a single forward pass records the last
/// occurrence per key and a filtering pass keeps only those.
#[must_use]
pub fn aggregate(results: Vec<PartialIndexResult>) -> AggregatedBatch {
    let mut ops: Vec<IndexOperation> = Vec::with_capacity(results.len());
    let mut ackable = Vec::new();
    let mut creation_times: SmallVec<[DateTime<Utc>; 8]> = SmallVec::new();

    for result in results {
        if result.message.is_none() && result.operation.is_none() {
            continue;
        }
        creation_times.push(result.created_at);
        if let Some(message) = result.message {
            ackable.push(message);
        }
        if let Some(operation) = result.operation {
            ops.push(operation);
        }
    }

    let mut key_last_index: AHashMap<DocumentKey, usize> = AHashMap::with_capacity(ops.len());
    for (idx, op) in ops.iter().enumerate() {
        if let Some(key) = op.document() {
            key_last_index.insert(key.clone(), idx);
        }
    }

    let mut operation = CombinedIndexOperation::new();
    for (idx, op) in ops.into_iter().enumerate() {
        let keep = match op.document() {
            Some(key) => key_last_index.get(key) == Some(&idx),
            None => true,
        };
        if keep {
            operation.merge(op);
        }
    }

    AggregatedBatch {
        operation,
        ackable,
        creation_times,
    }
}
