#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **aegis-ingest** – Ingestion service for Aegis.
//!
//! The [`Ingestor`] accepts batches of raw vendor records, normalizes each
//! one and hands persistence to background tasks: every normalized event is
//! written to the store and its id published onto the work queue. The batch
//! call returns as soon as normalization finishes; durability is traded for
//! request latency by design.
//!
//! Failure handling per path:
//! * a record that fails normalization is logged and dropped, the batch
//!   continues;
//! * a store write failure is surfaced on the synchronous
//!   [`Ingestor::store_and_publish`] path and logged on the background path;
//! * a queue publish failure is only ever logged - ingestion has already
//!   succeeded by then.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, warn};

use aegis_normalize::{
    normalize_cloud_audit, normalize_custom, normalize_threat_detector, NormalizeError,
};
use aegis_queue::EventQueue;
use aegis_store_core::EventStore;
use aegis_types::{CanonicalEvent, QueueEventMessage};

/// Outcome of one batch ingestion call.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReceipt {
    /// Always `accepted`; per-record failures never fail the batch.
    pub status: String,
    /// Number of records received.
    pub received: usize,
    /// Number of records that normalized successfully.
    pub normalized: usize,
    /// Ids assigned to the normalized events, in input order.
    pub event_ids: Vec<String>,
}

/// Batch ingestion front of the pipeline.
#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn EventStore>,
    queue: Arc<dyn EventQueue>,
}

impl Ingestor {
    /// Create an ingestor over the given store and queue.
    pub fn new(store: Arc<dyn EventStore>, queue: Arc<dyn EventQueue>) -> Self {
        Self { store, queue }
    }

    /// Ingest a batch of cloud audit-log records.
    pub fn ingest_cloud_audit(&self, records: &[Value]) -> IngestReceipt {
        self.ingest_batch(records, normalize_cloud_audit, "cloud audit record")
    }

    /// Ingest a batch of threat-detector findings.
    pub fn ingest_threat_detector(&self, records: &[Value]) -> IngestReceipt {
        self.ingest_batch(records, normalize_threat_detector, "threat-detector finding")
    }

    /// Ingest a batch of pre-normalized custom records.
    pub fn ingest_custom(&self, records: &[Value]) -> IngestReceipt {
        self.ingest_batch(records, normalize_custom, "custom record")
    }

    fn ingest_batch(
        &self,
        records: &[Value],
        normalize: fn(&Value) -> Result<CanonicalEvent, NormalizeError>,
        kind: &'static str,
    ) -> IngestReceipt {
        let mut event_ids = Vec::new();
        for record in records {
            match normalize(record) {
                Ok(event) => {
                    event_ids.push(event.event_id.clone());
                    self.spawn_persist(event);
                }
                Err(err) => warn!(%err, kind, "dropping malformed record"),
            }
        }
        IngestReceipt {
            status: "accepted".to_string(),
            received: records.len(),
            normalized: event_ids.len(),
            event_ids,
        }
    }

    /// Persist and enqueue in the background, after the batch has returned.
    fn spawn_persist(&self, event: CanonicalEvent) {
        let store = Arc::clone(&self.store);
        let queue = Arc::clone(&self.queue);
        tokio::spawn(async move {
            let event_id = event.event_id.clone();
            if let Err(err) = persist_event(store, queue, &event).await {
                error!(%err, %event_id, "failed to persist ingested event");
            }
        });
    }

    /// Store `event` and publish its id onto the work queue, synchronously.
    ///
    /// The store write is mandatory and its failure propagates; the queue
    /// publish is best-effort and its failure is only logged.
    pub async fn store_and_publish(&self, event: &CanonicalEvent) -> Result<()> {
        persist_event(Arc::clone(&self.store), Arc::clone(&self.queue), event).await
    }
}

/// Queue message attributes mirroring severity and source.
pub fn message_attributes(event: &CanonicalEvent) -> HashMap<String, String> {
    HashMap::from([
        ("severity".to_string(), event.severity.as_str().to_string()),
        ("source".to_string(), event.source.as_str().to_string()),
    ])
}

async fn persist_event(
    store: Arc<dyn EventStore>,
    queue: Arc<dyn EventQueue>,
    event: &CanonicalEvent,
) -> Result<()> {
    store.put(event).await?;

    let body = serde_json::to_string(&QueueEventMessage::for_event(event))?;
    if let Err(err) = queue.publish(body, message_attributes(event)).await {
        warn!(%err, event_id = %event.event_id, "queue publish failed, event stored unqueued");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_queue::{MemoryQueue, QueueMessage};
    use aegis_store_memory::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    fn audit_record(event_name: &str) -> Value {
        json!({
            "eventName": event_name,
            "eventSource": "iam.amazonaws.com",
            "eventTime": "2026-03-01T10:00:00Z",
            "sourceIPAddress": "198.51.100.4"
        })
    }

    async fn wait_for_store(store: &MemoryStore, expected: usize) {
        for _ in 0..100 {
            if store.len().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("store never reached {expected} events");
    }

    #[tokio::test]
    async fn batch_receipt_counts_malformed_records() {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::default());
        let ingestor = Ingestor::new(store.clone(), queue);

        let receipt = ingestor.ingest_cloud_audit(&[
            audit_record("ConsoleLogin"),
            json!({"eventSource": "iam.amazonaws.com"}),
        ]);

        assert_eq!(receipt.status, "accepted");
        assert_eq!(receipt.received, 2);
        assert_eq!(receipt.normalized, 1);
        assert_eq!(receipt.event_ids.len(), 1);

        wait_for_store(&store, 1).await;
    }

    #[tokio::test]
    async fn background_persistence_stores_and_queues() {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::default());
        let ingestor = Ingestor::new(store.clone(), queue.clone());

        let receipt = ingestor.ingest_cloud_audit(&[audit_record("CreateUser")]);
        wait_for_store(&store, 1).await;

        let stored = store.get(&receipt.event_ids[0]).await.unwrap().unwrap();
        assert_eq!(stored.event_type, "CreateUser");

        let messages = queue.receive(10, Duration::from_millis(50)).await.unwrap();
        assert_eq!(messages.len(), 1);
        let body: QueueEventMessage = serde_json::from_str(&messages[0].body).unwrap();
        assert_eq!(body.event_id, receipt.event_ids[0]);
        assert_eq!(body.event_type, "CreateUser");
        assert_eq!(messages[0].attributes["severity"], "high");
        assert_eq!(messages[0].attributes["source"], "cloud_audit");
    }

    #[tokio::test]
    async fn threat_detector_and_custom_paths_ingest() {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::default());
        let ingestor = Ingestor::new(store.clone(), queue);

        ingestor.ingest_threat_detector(&[json!({
            "Type": "Recon:EC2/Portscan",
            "Severity": 5.0,
            "CreatedAt": "2026-03-01T10:00:00Z"
        })]);
        ingestor.ingest_custom(&[json!({"title": "Manual finding"})]);

        wait_for_store(&store, 2).await;
    }

    struct FailingQueue;

    #[async_trait]
    impl EventQueue for FailingQueue {
        async fn publish(&self, _body: String, _attributes: HashMap<String, String>) -> Result<()> {
            anyhow::bail!("queue offline")
        }
        async fn receive(&self, _max: usize, _wait: Duration) -> Result<Vec<QueueMessage>> {
            Ok(Vec::new())
        }
        async fn delete(&self, _receipt_handle: &str) -> Result<()> {
            Ok(())
        }
        async fn health(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn publish_failure_does_not_fail_ingestion() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = Ingestor::new(store.clone(), Arc::new(FailingQueue));

        let event = aegis_normalize::normalize_cloud_audit(&audit_record("ConsoleLogin")).unwrap();
        ingestor.store_and_publish(&event).await.unwrap();

        assert!(store.get(&event.event_id).await.unwrap().is_some());
    }
}
