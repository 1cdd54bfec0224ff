#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **aegis-store-core** – Core storage abstractions for Aegis.
//!
//! This crate defines the contract between the event pipeline and whatever
//! keyed store backs it, without providing a concrete implementation.
//! Drivers (in-memory, cloud document stores, ...) implement [`EventStore`]
//! in separate crates that depend on this abstraction.
//!
//! The pipeline is deliberately index-agnostic: [`ScanFilter`] describes an
//! AND-joined predicate and drivers may answer it with a table scan or any
//! index strategy they like.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use aegis_types::{CanonicalEvent, EventSource, EventStatus, Severity};

//─────────────────────────────
//  Scan filter
//─────────────────────────────

/// AND-joined predicate for [`EventStore::scan`].
///
/// Every populated field must match for an event to be returned. An empty
/// filter matches everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanFilter {
    /// Only events with `event_time >= start_time`.
    pub start_time: Option<DateTime<Utc>>,
    /// Only events with `event_time <= end_time`.
    pub end_time: Option<DateTime<Utc>>,
    /// Only events from one of these sources.
    pub sources: Option<Vec<EventSource>>,
    /// Only events with one of these severities.
    pub severities: Option<Vec<Severity>>,
    /// Only events with one of these type strings.
    pub event_types: Option<Vec<String>>,
    /// Cap on the number of returned events.
    pub limit: Option<usize>,
}

impl ScanFilter {
    /// Filter down to events that occurred at or after `t`.
    pub fn since(mut self, t: DateTime<Utc>) -> Self {
        self.start_time = Some(t);
        self
    }

    /// Filter down to events that occurred at or before `t`.
    pub fn until(mut self, t: DateTime<Utc>) -> Self {
        self.end_time = Some(t);
        self
    }

    /// Cap the result set at `n` events.
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Whether `event` satisfies every populated predicate.
    ///
    /// Shared by drivers so the AND-join semantics stay uniform.
    pub fn matches(&self, event: &CanonicalEvent) -> bool {
        if let Some(start) = self.start_time {
            if event.event_time < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if event.event_time > end {
                return false;
            }
        }
        if let Some(sources) = &self.sources {
            if !sources.contains(&event.source) {
                return false;
            }
        }
        if let Some(severities) = &self.severities {
            if !severities.contains(&event.severity) {
                return false;
            }
        }
        if let Some(types) = &self.event_types {
            if !types.iter().any(|t| *t == event.event_type) {
                return false;
            }
        }
        true
    }
}

//─────────────────────────────
//  Partial update
//─────────────────────────────

/// Named-field partial update applied atomically by [`EventStore::update`].
///
/// Only the fields the processor is allowed to mutate appear here; `raw`
/// and everything set at normalization stay immutable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventPatch {
    /// New lifecycle state.
    pub status: Option<EventStatus>,
    /// Completion instant.
    pub processed_at: Option<DateTime<Utc>>,
    /// Computed risk score.
    pub risk_score: Option<u8>,
    /// Correlation the event joined.
    pub correlation_id: Option<String>,
    /// Severity upgrade from a correlation boost.
    pub severity: Option<Severity>,
}

impl EventPatch {
    /// Apply this patch to `event` in place.
    ///
    /// Lifecycle state never moves backward and severity never downgrades;
    /// a patch that would violate either is ignored for that field.
    pub fn apply(&self, event: &mut CanonicalEvent) {
        if let Some(status) = self.status {
            if status.rank() >= event.status.rank() {
                event.status = status;
            }
        }
        if let Some(processed_at) = self.processed_at {
            event.processed_at = Some(processed_at);
        }
        if let Some(score) = self.risk_score {
            event.risk_score = Some(score);
        }
        if let Some(correlation_id) = &self.correlation_id {
            event.correlation_id = Some(correlation_id.clone());
        }
        if let Some(severity) = self.severity {
            if severity.rank() > event.severity.rank() {
                event.severity = severity;
            }
        }
    }
}

//─────────────────────────────
//  Store trait
//─────────────────────────────

/// Abstraction over the durable keyed event store.
///
/// All implementations must be thread-safe; every operation may suspend the
/// calling task. `event_id` is the single source of identity: `put` is
/// idempotent by it and `update` addresses the record through it.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist an event, replacing any record with the same `event_id`.
    async fn put(&self, event: &CanonicalEvent) -> anyhow::Result<()>;

    /// Fetch an event by id. Returns `None` when no such record exists.
    async fn get(&self, event_id: &str) -> anyhow::Result<Option<CanonicalEvent>>;

    /// Return events matching `filter`, oldest first.
    async fn scan(&self, filter: &ScanFilter) -> anyhow::Result<Vec<CanonicalEvent>>;

    /// Atomically apply `patch` to the named event.
    ///
    /// Fails with [`StoreError::EventNotFound`] when the id is unknown.
    async fn update(&self, event_id: &str, patch: EventPatch) -> anyhow::Result<()>;

    /// Whether the backing store is reachable.
    async fn health(&self) -> bool;
}

//─────────────────────────────
//  Error types
//─────────────────────────────

/// Errors produced by store drivers.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Update addressed an id the store has never seen.
    #[error("event not found: {0}")]
    EventNotFound(String),
    /// The backend rejected or failed the operation.
    #[error("store operation failed: {0}")]
    Backend(String),
}

//─────────────────────────────
//  Aggregate statistics
//─────────────────────────────

/// Aggregated view over the stored events, for dashboards and operators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    /// Total stored events.
    pub total_events: usize,
    /// Event counts keyed by severity wire name.
    pub events_by_severity: Vec<(String, usize)>,
    /// Event counts keyed by source wire name.
    pub events_by_source: Vec<(String, usize)>,
    /// Event counts keyed by category wire name.
    pub events_by_category: Vec<(String, usize)>,
    /// Events in the 24 hours before the reference instant.
    pub events_last_24h: usize,
    /// Critical events in the same window.
    pub critical_events_last_24h: usize,
    /// Ten most frequent event types, most frequent first.
    pub top_event_types: Vec<(String, usize)>,
    /// Ten most frequent source IPs, most frequent first.
    pub top_source_ips: Vec<(String, usize)>,
}

/// Scan the whole store and aggregate [`StoreStats`] relative to `now`.
///
/// A full scan is acceptable at the traffic this system targets; larger
/// deployments would push these aggregates into the driver.
pub async fn store_stats(store: &dyn EventStore, now: DateTime<Utc>) -> anyhow::Result<StoreStats> {
    let events = store.scan(&ScanFilter::default()).await?;
    let cutoff_24h = now - Duration::hours(24);

    let mut by_severity: Vec<(String, usize)> = Vec::new();
    let mut by_source: Vec<(String, usize)> = Vec::new();
    let mut by_category: Vec<(String, usize)> = Vec::new();
    let mut by_type: Vec<(String, usize)> = Vec::new();
    let mut by_ip: Vec<(String, usize)> = Vec::new();
    let mut last_24h = 0usize;
    let mut critical_24h = 0usize;

    fn bump(counts: &mut Vec<(String, usize)>, key: &str) {
        match counts.iter_mut().find(|(k, _)| k == key) {
            Some((_, n)) => *n += 1,
            None => counts.push((key.to_string(), 1)),
        }
    }

    for event in &events {
        bump(&mut by_severity, event.severity.as_str());
        bump(&mut by_source, event.source.as_str());
        bump(&mut by_category, event.event_category.as_str());
        bump(&mut by_type, &event.event_type);
        if let Some(ip) = event.source_ip() {
            bump(&mut by_ip, ip);
        }
        if event.event_time >= cutoff_24h {
            last_24h += 1;
            if event.severity == Severity::Critical {
                critical_24h += 1;
            }
        }
    }

    fn top10(mut counts: Vec<(String, usize)>) -> Vec<(String, usize)> {
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts.truncate(10);
        counts
    }

    Ok(StoreStats {
        total_events: events.len(),
        events_by_severity: by_severity,
        events_by_source: by_source,
        events_by_category: by_category,
        events_last_24h: last_24h,
        critical_events_last_24h: critical_24h,
        top_event_types: top10(by_type),
        top_source_ips: top10(by_ip),
    })
}
