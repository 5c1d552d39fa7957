//! Test fakes and helper functions for the indexrelay test suite

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use uuid::Uuid;

use indexrelay::{
    ApplicationScope, CombinedIndexOperation, DocumentKey, EntityId, EventEnvelope, EventHandler,
    IndexOperation, PartialIndexResult, QueueMessage, SearchIndexProvider,
};

/// In-memory search index that records commits and applies operations
#[derive(Debug, Default)]
pub struct RecordingIndex {
    pub documents: DashMap<String, serde_json::Value>,
    pub bootstrapped: DashMap<String, ()>,
    commit_calls: AtomicUsize,
    failing: AtomicBool,
}

#[allow(dead_code)]
impl RecordingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent commit fail, or stop failing
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn commit_calls(&self) -> usize {
        self.commit_calls.load(Ordering::SeqCst)
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn has_document(&self, key: &DocumentKey) -> bool {
        self.documents.contains_key(key.as_str())
    }

    /// Pre-populate a document without going through a commit
    pub fn insert_document(&self, key: &DocumentKey, body: serde_json::Value) {
        self.documents.insert(key.as_str().to_string(), body);
    }
}

#[async_trait]
impl SearchIndexProvider for RecordingIndex {
    async fn commit(&self, operation: CombinedIndexOperation) -> Result<()> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("search engine unreachable"));
        }
        for op in operation.into_operations() {
            match op {
                IndexOperation::Upsert { document, body } => {
                    self.documents.insert(document.as_str().to_string(), body);
                }
                IndexOperation::Delete { document } => {
                    self.documents.remove(document.as_str());
                }
                IndexOperation::Bootstrap { location, .. } => {
                    self.bootstrapped.insert(location.name.to_string(), ());
                }
            }
        }
        Ok(())
    }
}

/// One row in the fake store of record
#[derive(Debug, Clone)]
pub struct StoredEntity {
    pub body: serde_json::Value,
    pub modified: DateTime<Utc>,
}

/// Fake store of record that handlers re-read current state from
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entities: DashMap<String, StoredEntity>,
    collections: DashMap<String, Vec<EntityId>>,
}

#[allow(dead_code)]
impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_entity(
        &self,
        scope: &ApplicationScope,
        entity: &EntityId,
        body: serde_json::Value,
        modified: DateTime<Utc>,
    ) {
        let key = DocumentKey::for_entity(scope, entity);
        self.entities
            .insert(key.as_str().to_string(), StoredEntity { body, modified });
    }

    pub fn put_collection_member(&self, collection: &str, entity: EntityId) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(entity);
    }

    fn entity(&self, key: &str) -> Option<StoredEntity> {
        self.entities.get(key).map(|entry| entry.value().clone())
    }

    fn members(&self, collection: &str) -> Vec<EntityId> {
        self.collections
            .get(collection)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }
}

/// Handler backed by the fake store, covering every event kind
pub struct StoreHandler {
    store: Arc<InMemoryStore>,
}

impl StoreHandler {
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for StoreHandler {
    async fn handle(&self, message: &QueueMessage) -> Result<Vec<PartialIndexResult>> {
        match &message.body {
            EventEnvelope::EntityIndex {
                scope,
                entity,
                updated_after,
                ..
            } => {
                let key = DocumentKey::for_entity(scope, entity);
                Ok(match self.store.entity(key.as_str()) {
                    Some(stored) if stored.modified >= *updated_after => {
                        vec![PartialIndexResult::applied(
                            message.clone(),
                            IndexOperation::Upsert {
                                document: key,
                                body: stored.body,
                            },
                        )]
                    }
                    // missing or superseded: nothing to index, message consumable
                    _ => vec![PartialIndexResult::consumed(message.clone())],
                })
            }
            EventEnvelope::EntityDelete {
                scope,
                entity,
                updated_before,
                ..
            } => {
                let key = DocumentKey::for_entity(scope, entity);
                Ok(match self.store.entity(key.as_str()) {
                    // a newer write exists, leave its document alone
                    Some(stored) if stored.modified > *updated_before => {
                        vec![PartialIndexResult::consumed(message.clone())]
                    }
                    _ => vec![PartialIndexResult::applied(
                        message.clone(),
                        IndexOperation::Delete { document: key },
                    )],
                })
            }
            EventEnvelope::EdgeIndex { scope, edge, .. } => Ok(vec![PartialIndexResult::applied(
                message.clone(),
                IndexOperation::Upsert {
                    document: DocumentKey::for_edge(scope, edge),
                    body: serde_json::json!({
                        "source": edge.source.uuid,
                        "target": edge.target.uuid,
                        "edge_type": edge.edge_type.to_string(),
                    }),
                },
            )]),
            EventEnvelope::EdgeDelete { scope, edge, .. } => {
                Ok(vec![PartialIndexResult::applied(
                    message.clone(),
                    IndexOperation::Delete {
                        document: DocumentKey::for_edge(scope, edge),
                    },
                )])
            }
            EventEnvelope::CollectionClear {
                scope, collection, ..
            } => {
                let members = self.store.members(&collection.name);
                if members.is_empty() {
                    return Ok(vec![PartialIndexResult::consumed(message.clone())]);
                }
                let created_at = message.body.timestamp();
                let mut results = Vec::with_capacity(members.len());
                for (position, entity) in members.iter().enumerate() {
                    let operation = IndexOperation::Delete {
                        document: DocumentKey::for_entity(scope, entity),
                    };
                    // one result carries the message so it is acked exactly once
                    if position == 0 {
                        results.push(PartialIndexResult::applied(message.clone(), operation));
                    } else {
                        results.push(PartialIndexResult::operation_only(created_at, operation));
                    }
                }
                Ok(results)
            }
            EventEnvelope::InitializeIndex {
                scope, location, ..
            } => Ok(vec![PartialIndexResult::applied(
                message.clone(),
                IndexOperation::Bootstrap {
                    scope: scope.clone(),
                    location: location.clone(),
                },
            )]),
        }
    }
}

/// Handler that always fails with an infrastructure error
pub struct FailingHandler;

#[async_trait]
impl EventHandler for FailingHandler {
    async fn handle(&self, _message: &QueueMessage) -> Result<Vec<PartialIndexResult>> {
        Err(anyhow!("handler infrastructure failure"))
    }
}

#[allow(dead_code)]
pub fn test_scope() -> ApplicationScope {
    ApplicationScope::new(Uuid::new_v4(), "test-app")
}

#[allow(dead_code)]
pub fn test_entity(kind: &str) -> EntityId {
    EntityId::new(Uuid::new_v4(), kind.to_string())
}
