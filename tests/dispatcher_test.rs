mod common;

use chrono::Utc;
use common::{
    FailingHandler, InMemoryStore, RecordingIndex, StoreHandler, test_entity, test_scope,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use indexrelay::{
    CollectionScope, DispatchConfig, DocumentKey, DualPathDispatcher, DurableQueueClient,
    DurableQueueConsumer, Edge, EventEnvelope, EventHandler, IndexLocation, IndexOperation,
    IndexingStrategy, InMemoryDurableQueue, PartialIndexResult, SearchIndexProvider, SharedSettings,
    aggregate,
};

struct Fixture {
    dispatcher: Arc<DualPathDispatcher>,
    index: Arc<RecordingIndex>,
    queue: Arc<InMemoryDurableQueue>,
    store: Arc<InMemoryStore>,
    settings: Arc<SharedSettings>,
}

fn build_fixture(
    config: &DispatchConfig,
    handlers: Vec<Arc<dyn EventHandler>>,
    store: Arc<InMemoryStore>,
) -> Fixture {
    let index = Arc::new(RecordingIndex::new());
    let queue = Arc::new(InMemoryDurableQueue::new());
    let settings = Arc::new(SharedSettings::new(config.settings()));
    let dispatcher = Arc::new(DualPathDispatcher::new(
        handlers,
        index.clone(),
        queue.clone(),
        settings.clone(),
        config,
    ));
    dispatcher.start().unwrap();
    Fixture {
        dispatcher,
        index,
        queue,
        store,
        settings,
    }
}

fn fixture(config: &DispatchConfig) -> Fixture {
    let store = Arc::new(InMemoryStore::new());
    let handlers: Vec<Arc<dyn EventHandler>> = vec![Arc::new(StoreHandler::new(store.clone()))];
    build_fixture(config, handlers, store)
}

fn fixture_with_handlers(config: &DispatchConfig, handlers: Vec<Arc<dyn EventHandler>>) -> Fixture {
    build_fixture(config, handlers, Arc::new(InMemoryStore::new()))
}

fn debug_config() -> DispatchConfig {
    DispatchConfig {
        debug_mode: true,
        flush_interval: Duration::from_millis(100),
        ..Default::default()
    }
}

#[tokio::test]
async fn three_events_for_one_entity_commit_once_with_the_latest_state() {
    let f = fixture(&debug_config());
    let scope = test_scope();
    let entity = test_entity("item");
    let now = Utc::now();
    f.store
        .put_entity(&scope, &entity, json!({"name": "latest"}), now);

    for seconds_back in [30i64, 20, 10] {
        let event = EventEnvelope::entity_index(
            scope.clone(),
            entity.clone(),
            now - chrono::Duration::seconds(seconds_back),
        );
        f.dispatcher
            .offer(event, IndexingStrategy::DirectOnly)
            .await
            .unwrap();
    }
    assert_eq!(f.dispatcher.size(), 3);

    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(f.index.commit_calls(), 1);
    assert_eq!(f.index.document_count(), 1);
    let key = DocumentKey::for_entity(&scope, &entity);
    assert_eq!(
        f.index.documents.get(key.as_str()).unwrap().value().clone(),
        json!({"name": "latest"})
    );
    // fast path only: zero durable-queue interactions
    assert_eq!(f.queue.ready_len().await, 0);

    let metrics = f.dispatcher.metrics();
    assert_eq!(metrics.batches_committed, 1);
    assert_eq!(metrics.cycle_time_count, 3);

    f.dispatcher.shutdown().await;
}

#[tokio::test]
async fn fast_path_failure_requeues_every_event_exactly_once() {
    let f = fixture(&debug_config());
    f.index.set_failing(true);
    let scope = test_scope();
    let now = Utc::now();

    for _ in 0..2 {
        let entity = test_entity("item");
        f.store.put_entity(&scope, &entity, json!({}), now);
        let event = EventEnvelope::entity_index(scope.clone(), entity, now);
        f.dispatcher
            .offer(event, IndexingStrategy::DirectOnly)
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(f.queue.ready_len().await, 2);
    assert_eq!(f.index.document_count(), 0);

    let metrics = f.dispatcher.metrics();
    assert_eq!(metrics.fast_path_failures, 1);
    assert_eq!(metrics.durable_enqueued, 2);

    f.dispatcher.shutdown().await;
}

#[tokio::test]
async fn noindex_is_honored_only_in_debug_mode() {
    let f = fixture(&DispatchConfig::default());
    let scope = test_scope();

    // production: silently downgraded to the configured default (Async)
    let event = EventEnvelope::entity_index(scope.clone(), test_entity("item"), Utc::now());
    f.dispatcher
        .offer(event, IndexingStrategy::NoIndex)
        .await
        .unwrap();
    assert_eq!(f.queue.ready_len().await, 1);
    assert_eq!(f.dispatcher.metrics().events_dropped, 0);

    // debug deployment: the event is dropped entirely
    f.settings.set_debug_mode(true);
    let event = EventEnvelope::entity_index(scope, test_entity("item"), Utc::now());
    f.dispatcher
        .offer(event, IndexingStrategy::NoIndex)
        .await
        .unwrap();
    assert_eq!(f.queue.ready_len().await, 1);
    assert_eq!(f.dispatcher.metrics().events_dropped, 1);

    f.dispatcher.shutdown().await;
}

#[tokio::test]
async fn collection_clear_fans_out_to_every_member() {
    let f = fixture(&DispatchConfig::default());
    let scope = test_scope();

    for position in 0..50 {
        let entity = test_entity("album");
        f.index.insert_document(
            &DocumentKey::for_entity(&scope, &entity),
            json!({"position": position}),
        );
        f.store.put_collection_member("albums", entity);
    }
    assert_eq!(f.index.document_count(), 50);

    let event =
        EventEnvelope::collection_clear(scope, CollectionScope::new("albums"), 1);
    f.dispatcher
        .offer(event, IndexingStrategy::Async)
        .await
        .unwrap();
    assert_eq!(f.queue.ready_len().await, 1);

    let messages = f.queue.receive(10).await.unwrap();
    let acked = f.dispatcher.process_received(messages).await.unwrap();

    // fifty deletes merged into one operation, committed in one call
    assert_eq!(acked, 1);
    assert_eq!(f.index.commit_calls(), 1);
    assert_eq!(f.index.document_count(), 0);
    assert_eq!(f.queue.in_flight_len().await, 0);

    f.dispatcher.shutdown().await;
}

#[tokio::test]
async fn messages_are_acknowledged_only_after_a_successful_commit() {
    let f = fixture(&DispatchConfig::default());
    let scope = test_scope();
    let entity = test_entity("item");
    let now = Utc::now();
    f.store.put_entity(&scope, &entity, json!({"v": 1}), now);

    f.index.set_failing(true);
    let event = EventEnvelope::entity_index(scope.clone(), entity.clone(), now);
    f.dispatcher
        .offer(event, IndexingStrategy::Async)
        .await
        .unwrap();

    let messages = f.queue.receive(10).await.unwrap();
    assert!(f.dispatcher.process_received(messages).await.is_err());
    // nothing acknowledged, the message stays in flight for redelivery
    assert_eq!(f.queue.in_flight_len().await, 1);
    assert_eq!(f.queue.redeliver().await, 1);

    f.index.set_failing(false);
    let messages = f.queue.receive(10).await.unwrap();
    assert_eq!(f.dispatcher.process_received(messages).await.unwrap(), 1);

    assert!(f.index.has_document(&DocumentKey::for_entity(&scope, &entity)));
    assert_eq!(f.queue.in_flight_len().await, 0);
    assert_eq!(f.dispatcher.metrics().messages_acknowledged, 1);

    f.dispatcher.shutdown().await;
}

#[tokio::test]
async fn handler_failure_fails_the_whole_batch_over_to_the_durable_path() {
    let f = fixture_with_handlers(&debug_config(), vec![Arc::new(FailingHandler)]);
    let scope = test_scope();

    for _ in 0..2 {
        let event = EventEnvelope::entity_index(scope.clone(), test_entity("item"), Utc::now());
        f.dispatcher
            .offer(event, IndexingStrategy::DirectOnly)
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    // no partial commit, both events fall back individually
    assert_eq!(f.index.commit_calls(), 0);
    assert_eq!(f.queue.ready_len().await, 2);

    f.dispatcher.shutdown().await;
}

#[tokio::test]
async fn edges_and_deletes_flow_through_the_same_fast_path() {
    let f = fixture(&debug_config());
    let scope = test_scope();

    // entity already gone from the store, its document still indexed
    let deleted = test_entity("item");
    let deleted_key = DocumentKey::for_entity(&scope, &deleted);
    f.index.insert_document(&deleted_key, json!({"stale": true}));

    let edge = Edge::new(test_entity("user"), test_entity("device"), "owns", Utc::now());
    let edge_key = DocumentKey::for_edge(&scope, &edge);

    f.dispatcher
        .offer(
            EventEnvelope::entity_delete(scope.clone(), deleted, false, Utc::now()),
            IndexingStrategy::DirectOnly,
        )
        .await
        .unwrap();
    f.dispatcher
        .offer(
            EventEnvelope::edge_index(scope.clone(), edge.source.clone(), edge),
            IndexingStrategy::DirectOnly,
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(!f.index.has_document(&deleted_key));
    assert!(f.index.has_document(&edge_key));

    f.dispatcher.shutdown().await;
}

#[tokio::test]
async fn initialize_index_bootstraps_through_the_commit_path() {
    let f = fixture(&DispatchConfig::default());
    let scope = test_scope();

    let event = EventEnvelope::initialize_index(scope, IndexLocation::new("primary"));
    f.dispatcher
        .offer(event, IndexingStrategy::Async)
        .await
        .unwrap();

    let messages = f.queue.receive(10).await.unwrap();
    assert_eq!(f.dispatcher.process_received(messages).await.unwrap(), 1);
    assert!(f.index.bootstrapped.contains_key("primary"));

    f.dispatcher.shutdown().await;
}

#[tokio::test]
async fn recommitting_the_same_operation_is_idempotent() {
    let index = RecordingIndex::new();
    let now = Utc::now();
    let kept = DocumentKey::new("app/item/kept");
    let removed = DocumentKey::new("app/item/removed");
    index.insert_document(&removed, json!({"old": true}));

    let batch = aggregate(vec![
        PartialIndexResult::operation_only(
            now,
            IndexOperation::Upsert {
                document: kept.clone(),
                body: json!({"v": 1}),
            },
        ),
        PartialIndexResult::operation_only(
            now,
            IndexOperation::Delete {
                document: removed.clone(),
            },
        ),
    ]);

    let replay = batch.operation.clone();
    index.commit(batch.operation).await.unwrap();
    assert!(index.has_document(&kept));
    assert!(!index.has_document(&removed));
    let count_after_first = index.document_count();

    index.commit(replay).await.unwrap();
    assert!(index.has_document(&kept));
    assert!(!index.has_document(&removed));
    assert_eq!(index.document_count(), count_after_first);
}

#[tokio::test]
async fn durable_consumer_drains_the_queue_end_to_end() {
    let f = fixture(&DispatchConfig::default());
    let scope = test_scope();
    let entity = test_entity("item");
    let now = Utc::now();
    f.store.put_entity(&scope, &entity, json!({"v": 1}), now);

    let consumer = DurableQueueConsumer::new(
        f.dispatcher.clone(),
        f.queue.clone(),
        10,
        Duration::from_millis(50),
    );
    consumer.start().unwrap();

    // Config defers to the configured default, which is Async
    let event = EventEnvelope::entity_index(scope.clone(), entity.clone(), now);
    f.dispatcher
        .offer(event, IndexingStrategy::Config)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(f.index.has_document(&DocumentKey::for_entity(&scope, &entity)));
    assert_eq!(f.queue.ready_len().await, 0);
    assert_eq!(f.queue.in_flight_len().await, 0);
    assert_eq!(f.dispatcher.metrics().messages_acknowledged, 1);

    consumer.stop().await;
    f.dispatcher.shutdown().await;
}
