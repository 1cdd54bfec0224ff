#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **aegis-store-memory** – In-memory event store driver for Aegis.
//!
//! A fast, non-persistent [`EventStore`] suitable for tests, development and
//! single-process deployments. All data lives in a `HashMap` behind a
//! `RwLock` and is lost when the process terminates.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use aegis_store_core::{EventPatch, EventStore, ScanFilter, StoreError};
use aegis_types::CanonicalEvent;

/// An in-memory, non-persistent event store keyed by `event_id`.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    events: Arc<RwLock<HashMap<String, CanonicalEvent>>>,
}

impl MemoryStore {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current number of stored events.
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    /// Whether the store holds no events.
    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    /// Remove every stored event. Useful to reset state between tests.
    pub async fn clear(&self) {
        self.events.write().await.clear();
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn put(&self, event: &CanonicalEvent) -> Result<()> {
        self.events
            .write()
            .await
            .insert(event.event_id.clone(), event.clone());
        Ok(())
    }

    async fn get(&self, event_id: &str) -> Result<Option<CanonicalEvent>> {
        Ok(self.events.read().await.get(event_id).cloned())
    }

    async fn scan(&self, filter: &ScanFilter) -> Result<Vec<CanonicalEvent>> {
        let events = self.events.read().await;
        let mut matched: Vec<CanonicalEvent> = events
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        // Oldest first; id tiebreak keeps scans stable across runs.
        matched.sort_by(|a, b| {
            a.event_time
                .cmp(&b.event_time)
                .then_with(|| a.event_id.cmp(&b.event_id))
        });
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn update(&self, event_id: &str, patch: EventPatch) -> Result<()> {
        let mut events = self.events.write().await;
        let event = events
            .get_mut(event_id)
            .ok_or_else(|| StoreError::EventNotFound(event_id.to_string()))?;
        patch.apply(event);
        Ok(())
    }

    async fn health(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_store_core::store_stats;
    use aegis_types::{
        new_event_id, EventCategory, EventSource, EventStatus, NetworkInfo, Severity,
    };
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn event(event_type: &str, minutes_ago: i64, severity: Severity) -> CanonicalEvent {
        let now = Utc::now();
        CanonicalEvent {
            event_id: new_event_id(),
            source: EventSource::CloudAudit,
            source_event_id: None,
            event_time: now - Duration::minutes(minutes_ago),
            ingested_at: now,
            processed_at: None,
            event_type: event_type.into(),
            event_category: EventCategory::Other,
            severity,
            status: EventStatus::New,
            title: event_type.into(),
            description: None,
            cloud_context: None,
            actor: None,
            network: Some(NetworkInfo {
                source_ip: Some("203.0.113.9".into()),
                ..NetworkInfo::default()
            }),
            technique: None,
            correlation_id: None,
            related_event_ids: Vec::new(),
            raw: json!({"eventName": event_type}),
            tags: Vec::new(),
            metadata: serde_json::Map::new(),
            risk_score: None,
        }
    }

    #[tokio::test]
    async fn put_get_round_trip() {
        let store = MemoryStore::new();
        let e = event("ConsoleLogin", 1, Severity::High);
        store.put(&e).await.unwrap();

        let fetched = store.get(&e.event_id).await.unwrap().unwrap();
        assert_eq!(fetched, e);
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_is_idempotent_by_event_id() {
        let store = MemoryStore::new();
        let e = event("ConsoleLogin", 1, Severity::High);
        store.put(&e).await.unwrap();
        store.put(&e).await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn scan_filters_by_time_and_sorts_oldest_first() {
        let store = MemoryStore::new();
        let old = event("DescribeInstances", 120, Severity::Low);
        let mid = event("ListBuckets", 30, Severity::Low);
        let new = event("ConsoleLogin", 1, Severity::High);
        for e in [&old, &mid, &new] {
            store.put(e).await.unwrap();
        }

        let window = ScanFilter::default().since(Utc::now() - Duration::minutes(60));
        let events = store.scan(&window).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_id, mid.event_id);
        assert_eq!(events[1].event_id, new.event_id);
    }

    #[tokio::test]
    async fn scan_respects_limit() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.put(&event("ListUsers", i, Severity::Low)).await.unwrap();
        }
        let events = store.scan(&ScanFilter::default().limit(3)).await.unwrap();
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn update_applies_patch_atomically() {
        let store = MemoryStore::new();
        let e = event("ConsoleLogin", 1, Severity::High);
        store.put(&e).await.unwrap();

        let now = Utc::now();
        store
            .update(
                &e.event_id,
                EventPatch {
                    status: Some(EventStatus::Processed),
                    processed_at: Some(now),
                    risk_score: Some(90),
                    correlation_id: Some("deadbeefdeadbeef".into()),
                    severity: None,
                },
            )
            .await
            .unwrap();

        let updated = store.get(&e.event_id).await.unwrap().unwrap();
        assert_eq!(updated.status, EventStatus::Processed);
        assert_eq!(updated.processed_at, Some(now));
        assert_eq!(updated.risk_score, Some(90));
        assert_eq!(updated.correlation_id.as_deref(), Some("deadbeefdeadbeef"));
        // Everything set at normalization is untouched.
        assert_eq!(updated.raw, e.raw);
        assert_eq!(updated.severity, e.severity);
    }

    #[tokio::test]
    async fn update_unknown_id_fails() {
        let store = MemoryStore::new();
        let err = store
            .update("missing", EventPatch::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("event not found"));
    }

    #[tokio::test]
    async fn stats_aggregate_over_the_whole_store() {
        let store = MemoryStore::new();
        store.put(&event("ConsoleLogin", 1, Severity::Critical)).await.unwrap();
        store.put(&event("ConsoleLogin", 2, Severity::High)).await.unwrap();
        store.put(&event("ListBuckets", 60 * 30, Severity::Low)).await.unwrap();

        let stats = store_stats(&store, Utc::now()).await.unwrap();
        assert_eq!(stats.total_events, 3);
        assert_eq!(stats.events_last_24h, 2);
        assert_eq!(stats.critical_events_last_24h, 1);
        assert_eq!(stats.top_event_types[0].0, "ConsoleLogin");
        assert_eq!(stats.top_event_types[0].1, 2);
        assert_eq!(stats.top_source_ips[0], ("203.0.113.9".to_string(), 3));
    }
}
