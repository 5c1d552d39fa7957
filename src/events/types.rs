//! Event type definitions for the index dispatch system
//!
//! This module contains the mutation event envelope and the identity types
//! it carries. Events are notifications of change, not snapshots: handlers
//! re-read the current entity or edge state from the store of record at
//! handling time, because the subject may have been further mutated or
//! deleted since the event was created.

use chrono::{DateTime, Utc};
use imstr::ImString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tenant scope a mutation belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationScope {
    pub application_id: Uuid,
    #[serde(with = "crate::imstr_serde")]
    pub name: ImString,
}

impl ApplicationScope {
    #[must_use]
    pub fn new(application_id: Uuid, name: impl Into<ImString>) -> Self {
        Self {
            application_id,
            name: name.into(),
        }
    }
}

/// Identity of an entity in the store of record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId {
    pub uuid: Uuid,
    #[serde(with = "crate::imstr_serde")]
    pub kind: ImString,
}

impl EntityId {
    #[must_use]
    pub fn new(uuid: Uuid, kind: impl Into<ImString>) -> Self {
        Self {
            uuid,
            kind: kind.into(),
        }
    }
}

/// A directed, timestamped graph edge between two entities
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: EntityId,
    pub target: EntityId,
    #[serde(with = "crate::imstr_serde")]
    pub edge_type: ImString,
    pub timestamp: DateTime<Utc>,
}

impl Edge {
    #[must_use]
    pub fn new(
        source: EntityId,
        target: EntityId,
        edge_type: impl Into<ImString>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            source,
            target,
            edge_type: edge_type.into(),
            timestamp,
        }
    }
}

/// A named collection of entities within an application
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionScope {
    #[serde(with = "crate::imstr_serde")]
    pub name: ImString,
}

impl CollectionScope {
    #[must_use]
    pub fn new(name: impl Into<ImString>) -> Self {
        Self { name: name.into() }
    }
}

/// Names the physical index an application's documents live in
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexLocation {
    #[serde(with = "crate::imstr_serde")]
    pub name: ImString,
}

impl IndexLocation {
    #[must_use]
    pub fn new(name: impl Into<ImString>) -> Self {
        Self { name: name.into() }
    }
}

/// Mutation events produced when a store-of-record write commits
///
/// Each variant carries the minimal identifying data needed to re-derive
/// the current state at handling time, plus the instant the event was
/// created. Envelopes are immutable and consumed exactly once by the
/// dispatcher, either committed to the search index or durably enqueued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventEnvelope {
    /// Index an entity if its last-modified time is at or after `updated_after`
    ///
    /// The lower bound guards against indexing a since-superseded version
    /// and supports resumable re-indexing.
    EntityIndex {
        scope: ApplicationScope,
        entity: EntityId,
        updated_after: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
    /// Remove an entity from the index if its tombstone or modification
    /// time is at or before `updated_before`
    EntityDelete {
        scope: ApplicationScope,
        entity: EntityId,
        is_collection_delete: bool,
        updated_before: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
    /// Index a graph edge's denormalized index entry
    EdgeIndex {
        scope: ApplicationScope,
        entity: EntityId,
        edge: Edge,
        timestamp: DateTime<Utc>,
    },
    /// Remove a graph edge's denormalized index entry
    EdgeDelete {
        scope: ApplicationScope,
        entity: EntityId,
        edge: Edge,
        timestamp: DateTime<Utc>,
    },
    /// Remove every entity in a collection as of a given version
    ///
    /// A fan-out event: one handler invocation expands it into one delete
    /// per collection member.
    CollectionClear {
        scope: ApplicationScope,
        collection: CollectionScope,
        collection_version: u64,
        timestamp: DateTime<Utc>,
    },
    /// Bootstrap the backing index for an application before any entity
    /// events are handled against it
    InitializeIndex {
        scope: ApplicationScope,
        location: IndexLocation,
        timestamp: DateTime<Utc>,
    },
}

/// Helper functions for creating events at the moment a mutation commits
impl EventEnvelope {
    /// Create an `EntityIndex` event
    #[must_use]
    pub fn entity_index(
        scope: ApplicationScope,
        entity: EntityId,
        updated_after: DateTime<Utc>,
    ) -> Self {
        Self::EntityIndex {
            scope,
            entity,
            updated_after,
            timestamp: Utc::now(),
        }
    }

    /// Create an `EntityDelete` event
    #[must_use]
    pub fn entity_delete(
        scope: ApplicationScope,
        entity: EntityId,
        is_collection_delete: bool,
        updated_before: DateTime<Utc>,
    ) -> Self {
        Self::EntityDelete {
            scope,
            entity,
            is_collection_delete,
            updated_before,
            timestamp: Utc::now(),
        }
    }

    /// Create an `EdgeIndex` event
    #[must_use]
    pub fn edge_index(scope: ApplicationScope, entity: EntityId, edge: Edge) -> Self {
        Self::EdgeIndex {
            scope,
            entity,
            edge,
            timestamp: Utc::now(),
        }
    }

    /// Create an `EdgeDelete` event
    #[must_use]
    pub fn edge_delete(scope: ApplicationScope, entity: EntityId, edge: Edge) -> Self {
        Self::EdgeDelete {
            scope,
            entity,
            edge,
            timestamp: Utc::now(),
        }
    }

    /// Create a `CollectionClear` event
    #[must_use]
    pub fn collection_clear(
        scope: ApplicationScope,
        collection: CollectionScope,
        collection_version: u64,
    ) -> Self {
        Self::CollectionClear {
            scope,
            collection,
            collection_version,
            timestamp: Utc::now(),
        }
    }

    /// Create an `InitializeIndex` event
    #[must_use]
    pub fn initialize_index(scope: ApplicationScope, location: IndexLocation) -> Self {
        Self::InitializeIndex {
            scope,
            location,
            timestamp: Utc::now(),
        }
    }

    /// The instant this event was created, used for cycle-time metrics
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::EntityIndex { timestamp, .. }
            | Self::EntityDelete { timestamp, .. }
            | Self::EdgeIndex { timestamp, .. }
            | Self::EdgeDelete { timestamp, .. }
            | Self::CollectionClear { timestamp, .. }
            | Self::InitializeIndex { timestamp, .. } => *timestamp,
        }
    }

    /// The tenant scope this event belongs to
    #[must_use]
    pub fn scope(&self) -> &ApplicationScope {
        match self {
            Self::EntityIndex { scope, .. }
            | Self::EntityDelete { scope, .. }
            | Self::EdgeIndex { scope, .. }
            | Self::EdgeDelete { scope, .. }
            | Self::CollectionClear { scope, .. }
            | Self::InitializeIndex { scope, .. } => scope,
        }
    }

    /// Short kind label for logging
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EntityIndex { .. } => "entity_index",
            Self::EntityDelete { .. } => "entity_delete",
            Self::EdgeIndex { .. } => "edge_index",
            Self::EdgeDelete { .. } => "edge_delete",
            Self::CollectionClear { .. } => "collection_clear",
            Self::InitializeIndex { .. } => "initialize_index",
        }
    }
}
