//! The queue-driven processing loop.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use aegis_correlate::{correlate, risk_score};
use aegis_queue::{AlertSink, EventQueue, QueueMessage};
use aegis_store_core::{EventPatch, EventStore, ScanFilter};
use aegis_types::{CanonicalEvent, CorrelationRecord, EventStatus, QueueEventMessage};

use crate::alerting::{send_correlation_alert, send_event_alert, should_alert};
use crate::config::ProcessorConfig;

/// Counters maintained by the poll loop and snapshotted by stats handlers.
///
/// Mutated only by the single loop task; readers get a clone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    /// Messages fully processed since startup.
    pub events_processed: u64,
    /// Event alerts successfully dispatched since startup.
    pub alerts_sent: u64,
    /// Correlations found by the most recent tick.
    pub correlations_found: usize,
    /// Completion instant of the most recently processed event.
    pub last_processed_at: Option<DateTime<Utc>>,
}

/// Result of a manual correlation pass.
#[derive(Debug, Clone, Serialize)]
pub struct CorrelationPass {
    /// Number of events in the loaded window.
    pub window_size: usize,
    /// Correlations found over that window.
    pub correlations: Vec<CorrelationRecord>,
}

/// Long-running processor: pulls queued event ids, correlates the recent
/// window, scores risk, dispatches alerts and records outcomes.
#[derive(Clone)]
pub struct Processor {
    store: Arc<dyn EventStore>,
    queue: Arc<dyn EventQueue>,
    sink: Arc<dyn AlertSink>,
    config: ProcessorConfig,
    stats: Arc<RwLock<PipelineStats>>,
    is_running: Arc<Mutex<bool>>,
}

impl Processor {
    /// Create a processor over the given collaborators.
    pub fn new(
        store: Arc<dyn EventStore>,
        queue: Arc<dyn EventQueue>,
        sink: Arc<dyn AlertSink>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            store,
            queue,
            sink,
            config,
            stats: Arc::new(RwLock::new(PipelineStats::default())),
            is_running: Arc::new(Mutex::new(false)),
        }
    }

    /// Start the poll loop. Idempotent; a second call is a no-op.
    pub async fn start(&self) {
        {
            let mut is_running = self.is_running.lock().await;
            if *is_running {
                return;
            }
            *is_running = true;
        }
        info!("processor loop started");

        let processor = self.clone();
        tokio::spawn(async move {
            // The flag is checked between ticks, so an in-flight tick
            // always completes before the loop exits.
            while *processor.is_running.lock().await {
                if let Err(err) = processor.tick().await {
                    warn!(%err, "processing tick failed");
                }
            }
            info!("processor loop stopped");
        });
    }

    /// Request a graceful stop; the in-flight tick finishes first.
    pub async fn stop(&self) {
        *self.is_running.lock().await = false;
    }

    /// Whether the poll loop is active.
    pub async fn is_running(&self) -> bool {
        *self.is_running.lock().await
    }

    /// Snapshot of the processing counters.
    pub async fn stats(&self) -> PipelineStats {
        self.stats.read().await.clone()
    }

    /// Whether both collaborators answer health probes.
    pub async fn health(&self) -> bool {
        self.store.health().await && self.queue.health().await
    }

    /// Load the lookback window and run the correlator without touching
    /// the queue. Used by operators to inspect current patterns.
    pub async fn run_correlation_pass(&self) -> Result<CorrelationPass> {
        let window = self.load_window().await?;
        let correlations = correlate(&window);
        Ok(CorrelationPass {
            window_size: window.len(),
            correlations,
        })
    }

    /// One poll cycle. Returns the number of fully processed messages.
    pub async fn tick(&self) -> Result<usize> {
        let messages = match self
            .queue
            .receive(self.config.batch_size, self.config.poll_interval)
            .await
        {
            Ok(messages) => messages,
            Err(err) => {
                warn!(%err, "queue receive failed, backing off");
                tokio::time::sleep(self.config.poll_interval).await;
                return Ok(0);
            }
        };
        if messages.is_empty() {
            return Ok(0);
        }

        // One window load and one correlation run per batch; every message
        // in the batch sees the same correlation set.
        let window = match self.load_window().await {
            Ok(window) => window,
            Err(err) => {
                warn!(%err, "window load failed, leaving batch unacked");
                return Ok(0);
            }
        };
        let correlations = correlate(&window);
        self.stats.write().await.correlations_found = correlations.len();

        let mut processed = 0;
        for message in &messages {
            if self.process_message(message, &window, &correlations).await {
                if let Err(err) = self.queue.delete(&message.receipt_handle).await {
                    warn!(%err, "failed to ack processed message");
                }
                processed += 1;
            }
        }
        Ok(processed)
    }

    async fn load_window(&self) -> Result<Vec<CanonicalEvent>> {
        let since = Utc::now() - Duration::minutes(self.config.correlation_window_minutes);
        self.store.scan(&ScanFilter::default().since(since)).await
    }

    /// Handle one queue message. Returns `true` only when the event was
    /// fully processed and its outcome persisted; anything else leaves the
    /// message for redelivery.
    async fn process_message(
        &self,
        message: &QueueMessage,
        window: &[CanonicalEvent],
        correlations: &[CorrelationRecord],
    ) -> bool {
        let parsed: QueueEventMessage = match serde_json::from_str(&message.body) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(%err, "unparsable queue message, leaving for redelivery");
                return false;
            }
        };

        let Some(event) = window.iter().find(|e| e.event_id == parsed.event_id) else {
            warn!(
                event_id = %parsed.event_id,
                "event not in window yet, leaving message for a later tick"
            );
            return false;
        };

        let score = risk_score(event, correlations);
        let event_correlations: Vec<&CorrelationRecord> = correlations
            .iter()
            .filter(|c| c.contains(&event.event_id))
            .collect();

        let mut alerted = false;
        if should_alert(event, score, &self.config) {
            alerted = send_event_alert(self.sink.as_ref(), event, score, &event_correlations).await;
        }

        // A correlation is announced exactly once: by whichever message
        // carries its chronologically-first member.
        for correlation in correlations {
            if correlation.first_event_id() == Some(event.event_id.as_str()) {
                send_correlation_alert(self.sink.as_ref(), correlation).await;
            }
        }

        // A correlation boost may raise severity; it never lowers it.
        let boosted_severity = event_correlations
            .iter()
            .map(|c| c.severity)
            .max_by_key(|s| s.rank())
            .filter(|s| s.rank() > event.severity.rank());

        let patch = EventPatch {
            status: Some(EventStatus::Processed),
            processed_at: Some(Utc::now()),
            risk_score: Some(score),
            correlation_id: event_correlations
                .first()
                .map(|c| c.correlation_id.clone()),
            severity: boosted_severity,
        };
        if let Err(err) = self.store.update(&event.event_id, patch).await {
            warn!(%err, event_id = %event.event_id, "store update failed, leaving unacked");
            return false;
        }

        let mut stats = self.stats.write().await;
        stats.events_processed += 1;
        if alerted {
            stats.alerts_sent += 1;
        }
        stats.last_processed_at = Some(Utc::now());
        info!(
            event_id = %event.event_id,
            risk_score = score,
            correlations = event_correlations.len(),
            "processed event"
        );
        true
    }
}
