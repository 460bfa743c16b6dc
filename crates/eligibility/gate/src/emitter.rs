//! Block-event emission
//!
//! When the gate blocks, it hands a [`BlockEvent`] to a [`BlockEmitter`].
//! The emitter only enqueues (`try_send` on a bounded channel); a worker
//! task drains the queue into an [`AnalyticsSink`]. A full queue drops the
//! event, a failing or panicking sink is logged. Neither reaches the caller.

use crate::context::EligibilityContext;
use crate::decision::{BlockedBy, Metadata};
use crate::error::SinkError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Analytics event name for gate blocks
pub const BLOCK_EVENT_NAME: &str = "ingestion_blocked";

/// Enriched record of a gate block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockEvent {
    pub event: String,
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub request_id: Uuid,
    pub user_id: String,
    pub account_id: Option<String>,
    pub platform: Option<String>,
    pub flow: String,
    pub policy: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
    /// Metadata of the blocking policy result
    #[serde(default)]
    pub metadata: Metadata,
}

impl BlockEvent {
    pub fn new(context: &EligibilityContext, blocked_by: &BlockedBy, metadata: Metadata) -> Self {
        Self {
            event: BLOCK_EVENT_NAME.to_string(),
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            request_id: context.request_id(),
            user_id: context.user_id().to_string(),
            account_id: context.account_id().map(str::to_string),
            platform: context.platform().map(|p| p.as_str().to_string()),
            flow: context.flow().as_str().to_string(),
            policy: blocked_by.policy.clone(),
            reason: blocked_by.reason.as_str().to_string(),
            retry_after_seconds: blocked_by.retry_after_seconds,
            metadata,
        }
    }
}

/// Write-only analytics destination
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn track(&self, event: &BlockEvent) -> Result<(), SinkError>;
}

/// Handle used by the gate to enqueue block events
#[derive(Debug, Clone)]
pub struct BlockEmitter {
    tx: mpsc::Sender<BlockEvent>,
}

impl BlockEmitter {
    /// Spawn the delivery worker and return the emitter handle
    ///
    /// Must be called inside a Tokio runtime. The worker exits once every
    /// clone of the emitter is dropped and the queue is drained.
    pub fn spawn(sink: Arc<dyn AnalyticsSink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(Self::run(sink, rx));
        (Self { tx }, handle)
    }

    /// Enqueue an event without waiting
    pub fn emit(&self, event: BlockEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    request_id = %event.request_id,
                    policy = %event.policy,
                    "Block event queue full, dropping event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                warn!(
                    request_id = %event.request_id,
                    "Block event worker stopped, dropping event"
                );
            }
        }
    }

    async fn run(sink: Arc<dyn AnalyticsSink>, mut rx: mpsc::Receiver<BlockEvent>) {
        while let Some(event) = rx.recv().await {
            match AssertUnwindSafe(sink.track(&event)).catch_unwind().await {
                Ok(Ok(())) => {
                    debug!(event_id = %event.event_id, "Block event delivered");
                }
                Ok(Err(e)) => {
                    error!(
                        request_id = %event.request_id,
                        error = %e,
                        "Failed to deliver block event"
                    );
                }
                Err(_) => {
                    error!(
                        request_id = %event.request_id,
                        "Analytics sink panicked while delivering block event"
                    );
                }
            }
        }
        debug!("Block event worker finished");
    }
}

/// In-memory sink for testing
#[derive(Debug, Default)]
pub struct MemoryAnalyticsSink {
    events: Mutex<Vec<BlockEvent>>,
}

impl MemoryAnalyticsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<BlockEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

#[async_trait]
impl AnalyticsSink for MemoryAnalyticsSink {
    async fn track(&self, event: &BlockEvent) -> Result<(), SinkError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Sink that writes block events as structured log lines
#[derive(Debug, Default)]
pub struct TracingAnalyticsSink;

#[async_trait]
impl AnalyticsSink for TracingAnalyticsSink {
    async fn track(&self, event: &BlockEvent) -> Result<(), SinkError> {
        let payload = serde_json::to_string(event).map_err(|e| SinkError(e.to_string()))?;
        info!(
            target: "eligibility::analytics",
            event = %event.event,
            request_id = %event.request_id,
            policy = %event.policy,
            reason = %event.reason,
            payload = %payload,
            "Analytics event"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::BlockReason;
    use eligibility_types::{IngestionFlow, Platform};

    fn sample_event() -> BlockEvent {
        let ctx = EligibilityContext::new("u1", "a1", Platform::X, IngestionFlow::Timeline);
        let blocked_by = BlockedBy {
            policy: "CreditPolicy".into(),
            reason: BlockReason::CreditExhausted,
            retry_after_seconds: None,
        };
        let mut metadata = Metadata::new();
        metadata.insert("remaining".into(), 0.into());
        BlockEvent::new(&ctx, &blocked_by, metadata)
    }

    #[derive(Debug)]
    struct FailingSink;

    #[async_trait]
    impl AnalyticsSink for FailingSink {
        async fn track(&self, _event: &BlockEvent) -> Result<(), SinkError> {
            Err(SinkError("sink offline".into()))
        }
    }

    #[derive(Debug)]
    struct PanickingSink;

    #[async_trait]
    impl AnalyticsSink for PanickingSink {
        async fn track(&self, _event: &BlockEvent) -> Result<(), SinkError> {
            panic!("sink exploded");
        }
    }

    #[test]
    fn test_event_enrichment() {
        let event = sample_event();
        assert_eq!(event.event, BLOCK_EVENT_NAME);
        assert_eq!(event.platform.as_deref(), Some("x"));
        assert_eq!(event.flow, "timeline");
        assert_eq!(event.reason, "credit_exhausted");
        assert_eq!(event.metadata["remaining"], 0);
    }

    #[tokio::test]
    async fn test_events_delivered_to_sink() {
        let sink = Arc::new(MemoryAnalyticsSink::new());
        let (emitter, handle) = BlockEmitter::spawn(sink.clone(), 8);

        emitter.emit(sample_event());
        emitter.emit(sample_event());
        drop(emitter);
        handle.await.unwrap();

        assert_eq!(sink.events().len(), 2);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let sink = Arc::new(MemoryAnalyticsSink::new());
        let (tx, rx) = mpsc::channel(1);
        let emitter = BlockEmitter { tx };

        emitter.emit(sample_event());
        emitter.emit(sample_event());

        drop(emitter);
        BlockEmitter::run(sink.clone(), rx).await;
        assert_eq!(sink.events().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_sink_keeps_worker_alive() {
        let (emitter, handle) = BlockEmitter::spawn(Arc::new(FailingSink), 8);
        emitter.emit(sample_event());
        emitter.emit(sample_event());
        drop(emitter);
        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn test_panicking_sink_keeps_worker_alive() {
        let (emitter, handle) = BlockEmitter::spawn(Arc::new(PanickingSink), 8);
        emitter.emit(sample_event());
        emitter.emit(sample_event());
        drop(emitter);
        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn test_emit_after_worker_stopped_is_silent() {
        let sink = Arc::new(MemoryAnalyticsSink::new());
        let (emitter, handle) = BlockEmitter::spawn(sink, 8);
        handle.abort();
        let _ = handle.await;
        emitter.emit(sample_event());
    }

    #[tokio::test]
    async fn test_tracing_sink_accepts_events() {
        let sink = TracingAnalyticsSink;
        assert!(sink.track(&sample_event()).await.is_ok());
    }
}
