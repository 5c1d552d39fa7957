//! Dual-path dispatch orchestration
//!
//! The dispatcher receives mutation events, resolves the effective
//! indexing strategy against a fresh config snapshot, and routes each
//! event to the buffered fast path, the durable queue, or the bin. The
//! fast path batches events into one search-engine commit per flush
//! window; when a batch fails, every event in it is re-offered to the
//! durable queue individually so nothing is silently lost.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::aggregate::aggregate;
use crate::buffer::{BatchConsumer, BufferedDispatchQueue};
use crate::config::{ConfigSource, DispatchConfig};
use crate::events::{
    DispatchError, DispatchMetrics, DispatchMetricsSnapshot, EventEnvelope, QueueMessage,
};
use crate::handlers::EventHandler;
use crate::index::SearchIndexProvider;
use crate::queue::DurableQueueClient;
use crate::strategy::{IndexingStrategy, ResolvedStrategy, resolve};

/// Shared state behind both the producer API and the buffer's consumer
struct DispatcherCore {
    handlers: Vec<Arc<dyn EventHandler>>,
    index: Arc<dyn SearchIndexProvider>,
    durable: Arc<dyn DurableQueueClient>,
    config: Arc<dyn ConfigSource>,
    metrics: Arc<DispatchMetrics>,
}

impl DispatcherCore {
    /// Run every registered handler over every message, merge the partial
    /// results, and commit the combined operation once
    ///
    /// Returns the messages that became acknowledgeable. A handler error
    /// fails the whole attempt before anything is committed; a commit
    /// error means nothing was applied.
    async fn handle_and_commit(&self, messages: &[QueueMessage]) -> Result<Vec<QueueMessage>> {
        let mut results = Vec::new();
        for message in messages {
            for handler in &self.handlers {
                results.extend(handler.handle(message).await?);
            }
        }

        let batch = aggregate(results);
        if !batch.operation.is_empty() {
            self.index.commit(batch.operation).await?;
            self.metrics.increment_committed();
        }
        for created_at in &batch.creation_times {
            self.metrics.record_cycle_time(*created_at);
        }
        Ok(batch.ackable)
    }

    /// The buffered fast path's delivery routine
    ///
    /// Wraps each event as a synthetic message, commits the whole batch at
    /// once, and on any failure re-offers every event to the durable queue
    /// before reporting the batch failed.
    async fn dispatch_to_search_engine(&self, events: Vec<EventEnvelope>) -> Result<()> {
        let messages: Vec<QueueMessage> = events
            .iter()
            .cloned()
            .map(QueueMessage::synthetic)
            .collect();

        match self.handle_and_commit(&messages).await {
            Ok(_ackable) => Ok(()),
            Err(err) => {
                log::warn!(
                    "fast path batch of {} failed, falling back to durable queue: {err:#}",
                    events.len()
                );
                self.metrics.increment_fast_path_failures();
                for event in events {
                    let kind = event.kind();
                    match self.durable.enqueue(event).await {
                        Ok(_) => self.metrics.increment_durable_enqueued(),
                        Err(enqueue_err) => {
                            // nothing further to fall back to
                            log::error!(
                                "durable fallback enqueue failed, {kind} event lost from fast path: {enqueue_err:#}"
                            );
                        }
                    }
                }
                Err(err)
            }
        }
    }

    /// Process messages received from the durable queue and acknowledge
    /// the consumable ones, in that order
    async fn process_received(&self, messages: Vec<QueueMessage>) -> Result<usize> {
        let ackable = self.handle_and_commit(&messages).await?;
        let mut acked = 0u64;
        for message in &ackable {
            if let Some(handle) = &message.handle {
                self.durable.acknowledge(handle).await?;
                acked += 1;
            }
        }
        self.metrics.add_acknowledged(acked);
        Ok(acked as usize)
    }

    async fn enqueue_durable(&self, event: EventEnvelope) -> Result<(), DispatchError> {
        self.durable
            .enqueue(event)
            .await
            .map_err(DispatchError::DurableEnqueue)?;
        self.metrics.increment_durable_enqueued();
        Ok(())
    }
}

/// Adapter feeding flushed fast-path batches back into the core
struct FastPathConsumer {
    core: Arc<DispatcherCore>,
}

#[async_trait]
impl BatchConsumer<EventEnvelope> for FastPathConsumer {
    async fn consume(&self, batch: Vec<EventEnvelope>) -> Result<()> {
        self.core.dispatch_to_search_engine(batch).await
    }
}

/// The orchestrator tying strategy resolution, the buffered fast path,
/// and the durable queue together
///
/// `offer` is the sole entry point for producers of mutation events. None
/// of the downstream failures propagate to the producer: the originating
/// store-of-record write already committed, so indexing lag or loss is
/// observable only through metrics and eventual consistency of search
/// results, never as a failed request.
pub struct DualPathDispatcher {
    core: Arc<DispatcherCore>,
    buffer: BufferedDispatchQueue<EventEnvelope>,
}

impl DualPathDispatcher {
    /// Assemble a dispatcher from its collaborators
    ///
    /// The fast-path buffer worker does not run until `start()`.
    #[must_use]
    pub fn new(
        handlers: Vec<Arc<dyn EventHandler>>,
        index: Arc<dyn SearchIndexProvider>,
        durable: Arc<dyn DurableQueueClient>,
        config_source: Arc<dyn ConfigSource>,
        config: &DispatchConfig,
    ) -> Self {
        let core = Arc::new(DispatcherCore {
            handlers,
            index,
            durable,
            config: config_source,
            metrics: Arc::new(DispatchMetrics::new()),
        });
        let consumer = Arc::new(FastPathConsumer { core: core.clone() });
        let buffer =
            BufferedDispatchQueue::new(config.buffer_capacity, config.flush_interval, consumer);
        Self { core, buffer }
    }

    /// Start the fast-path buffer worker
    pub fn start(&self) -> Result<(), DispatchError> {
        self.buffer.start()
    }

    /// Offer one mutation event for dispatch
    ///
    /// The requested strategy is resolved against a fresh config snapshot;
    /// privileged strategies are silently downgraded outside debug mode.
    /// The only producer-visible failures are fast-path backpressure and a
    /// durable enqueue that could not be completed.
    pub async fn offer(
        &self,
        event: EventEnvelope,
        requested: IndexingStrategy,
    ) -> Result<(), DispatchError> {
        let settings = self.core.config.current();
        let effective = resolve(requested, settings.default_strategy, settings.debug_mode);
        self.core.metrics.increment_offered();

        match effective {
            ResolvedStrategy::NoIndex => {
                log::debug!("dropping {} event under no-index strategy", event.kind());
                self.core.metrics.increment_dropped();
                Ok(())
            }
            ResolvedStrategy::DirectOnly => {
                let _handle = self.buffer.offer(event).await?;
                Ok(())
            }
            ResolvedStrategy::Async => self.core.enqueue_durable(event).await,
        }
    }

    /// Process a batch received from the durable queue
    ///
    /// The same handler path the fast path uses: handlers, aggregation,
    /// one commit, then acknowledgement of every consumable message.
    /// Returns the number acknowledged. On error nothing further is
    /// acknowledged and the unacknowledged messages are redelivered later.
    pub async fn process_received(&self, messages: Vec<QueueMessage>) -> Result<usize> {
        self.core.process_received(messages).await
    }

    /// Current fast-path buffer depth, for health endpoints
    #[must_use]
    pub fn size(&self) -> usize {
        self.buffer.size()
    }

    /// Get a snapshot of dispatch metrics
    #[must_use]
    pub fn metrics(&self) -> DispatchMetricsSnapshot {
        self.core.metrics.snapshot()
    }

    /// Stop the fast-path buffer worker after one final flush
    pub async fn shutdown(&self) {
        self.buffer.stop().await;
    }
}
