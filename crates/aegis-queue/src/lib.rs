#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **aegis-queue** – Messaging abstractions for Aegis.
//!
//! Two seams are defined here: the FIFO work queue that couples the ingestor
//! to the processor, and the pub-sub alert sink the processor dispatches
//! notifications through. Both are traits so real drivers (cloud queues,
//! notification topics) can live in separate crates; the in-memory
//! implementations in this crate back tests and single-process deployments.
//!
//! The queue contract follows at-least-once delivery: a received message
//! stays invisible until its visibility timeout elapses, and is redelivered
//! unless deleted via its receipt handle.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time::Instant;

/// Default visibility timeout for the in-memory queue.
const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

//─────────────────────────────
//  Queue contract
//─────────────────────────────

/// A message handed out by [`EventQueue::receive`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage {
    /// Opaque message body.
    pub body: String,
    /// Handle used to delete the message once handled.
    pub receipt_handle: String,
    /// Message attributes supplied at publish time.
    pub attributes: HashMap<String, String>,
}

/// FIFO work queue between the ingestor and the processor.
#[async_trait]
pub trait EventQueue: Send + Sync {
    /// Enqueue a message. Best-effort: callers treat failure as non-fatal.
    async fn publish(&self, body: String, attributes: HashMap<String, String>) -> Result<()>;

    /// Receive up to `max` messages, long-polling for at most `wait`.
    ///
    /// Returned messages become invisible to other consumers until their
    /// visibility timeout expires or they are deleted.
    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<QueueMessage>>;

    /// Delete a received message so it is never redelivered.
    async fn delete(&self, receipt_handle: &str) -> Result<()>;

    /// Whether the queue is reachable.
    async fn health(&self) -> bool;
}

/// Errors produced by queue drivers.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The receipt handle is unknown or its message was already redelivered.
    #[error("unknown receipt handle: {0}")]
    UnknownReceipt(String),
}

//─────────────────────────────
//  In-memory queue
//─────────────────────────────

#[derive(Debug, Clone)]
struct StoredMessage {
    body: String,
    attributes: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct QueueInner {
    pending: VecDeque<StoredMessage>,
    in_flight: HashMap<String, (StoredMessage, Instant)>,
}

/// In-memory [`EventQueue`] with receipt handles and visibility timeouts.
#[derive(Debug, Clone)]
pub struct MemoryQueue {
    inner: Arc<Mutex<QueueInner>>,
    notify: Arc<Notify>,
    visibility_timeout: Duration,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(DEFAULT_VISIBILITY_TIMEOUT)
    }
}

impl MemoryQueue {
    /// Create a queue with the given visibility timeout.
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueInner::default())),
            notify: Arc::new(Notify::new()),
            visibility_timeout,
        }
    }

    /// Number of messages currently waiting for delivery.
    pub async fn pending_len(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    /// Number of delivered-but-unacked messages.
    pub async fn in_flight_len(&self) -> usize {
        self.inner.lock().await.in_flight.len()
    }

    /// Move expired in-flight messages back to the pending queue.
    fn requeue_expired(inner: &mut QueueInner, now: Instant) {
        let expired: Vec<String> = inner
            .in_flight
            .iter()
            .filter(|(_, (_, visible_again))| *visible_again <= now)
            .map(|(handle, _)| handle.clone())
            .collect();
        for handle in expired {
            if let Some((message, _)) = inner.in_flight.remove(&handle) {
                inner.pending.push_back(message);
            }
        }
    }

    /// Pop up to `max` pending messages, marking each in-flight.
    fn take_batch(&self, inner: &mut QueueInner, max: usize, now: Instant) -> Vec<QueueMessage> {
        let mut batch = Vec::new();
        while batch.len() < max {
            let Some(message) = inner.pending.pop_front() else {
                break;
            };
            let receipt_handle = uuid::Uuid::new_v4().to_string();
            inner.in_flight.insert(
                receipt_handle.clone(),
                (message.clone(), now + self.visibility_timeout),
            );
            batch.push(QueueMessage {
                body: message.body,
                receipt_handle,
                attributes: message.attributes,
            });
        }
        batch
    }
}

#[async_trait]
impl EventQueue for MemoryQueue {
    async fn publish(&self, body: String, attributes: HashMap<String, String>) -> Result<()> {
        self.inner
            .lock()
            .await
            .pending
            .push_back(StoredMessage { body, attributes });
        self.notify.notify_one();
        Ok(())
    }

    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<QueueMessage>> {
        let deadline = Instant::now() + wait;
        loop {
            let now = Instant::now();
            let batch = {
                let mut inner = self.inner.lock().await;
                Self::requeue_expired(&mut inner, now);
                self.take_batch(&mut inner, max, now)
            };
            if !batch.is_empty() || now >= deadline {
                return Ok(batch);
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep_until(deadline) => {}
            }
        }
    }

    async fn delete(&self, receipt_handle: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .in_flight
            .remove(receipt_handle)
            .ok_or_else(|| QueueError::UnknownReceipt(receipt_handle.to_string()))?;
        Ok(())
    }

    async fn health(&self) -> bool {
        true
    }
}

//─────────────────────────────
//  Alert sink contract
//─────────────────────────────

/// Outbound pub-sub sink alerts are delivered through.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Publish one notification. The processor treats failure as
    /// fire-and-forget: logged, never retried.
    async fn publish(
        &self,
        subject: &str,
        body: &str,
        attributes: &HashMap<String, String>,
    ) -> Result<()>;
}

/// A notification captured by [`MemorySink`].
#[derive(Debug, Clone, PartialEq)]
pub struct SinkRecord {
    /// Notification subject line.
    pub subject: String,
    /// Notification body.
    pub body: String,
    /// Notification attributes.
    pub attributes: HashMap<String, String>,
}

/// In-memory [`AlertSink`] that records every publication.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    published: Arc<RwLock<Vec<SinkRecord>>>,
    failing: Arc<RwLock<bool>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications published so far, in order.
    pub async fn published(&self) -> Vec<SinkRecord> {
        self.published.read().await.clone()
    }

    /// Make every subsequent publish fail. Drives the fire-and-forget path.
    pub async fn set_failing(&self, failing: bool) {
        *self.failing.write().await = failing;
    }
}

#[async_trait]
impl AlertSink for MemorySink {
    async fn publish(
        &self,
        subject: &str,
        body: &str,
        attributes: &HashMap<String, String>,
    ) -> Result<()> {
        if *self.failing.read().await {
            anyhow::bail!("sink unavailable");
        }
        self.published.write().await.push(SinkRecord {
            subject: subject.to_string(),
            body: body.to_string(),
            attributes: attributes.clone(),
        });
        Ok(())
    }
}
