//! Normalizer for pre-normalized custom records.
//!
//! Custom tooling submits records that already resemble the canonical
//! schema; this path applies the defaulting rules and stamps identity.

use chrono::{DateTime, Utc};
use serde_json::Value;

use aegis_types::{
    new_event_id, push_tag, CanonicalEvent, EventCategory, EventSource, EventStatus, Severity,
};

use crate::{parse_time_or, NormalizeError};

/// Normalize one custom record.
pub fn normalize_custom(raw: &Value) -> Result<CanonicalEvent, NormalizeError> {
    normalize_custom_with(raw, Utc::now(), new_event_id())
}

/// Normalize one custom record with an explicit clock and id.
pub fn normalize_custom_with(
    raw: &Value,
    now: DateTime<Utc>,
    event_id: String,
) -> Result<CanonicalEvent, NormalizeError> {
    let event_time = parse_time_or(raw.get("event_time").and_then(Value::as_str), now);
    let event_type = raw
        .get("event_type")
        .and_then(Value::as_str)
        .unwrap_or("custom");
    let category = raw
        .get("event_category")
        .and_then(Value::as_str)
        .map(EventCategory::from_wire)
        .unwrap_or(EventCategory::Other);
    let severity = raw
        .get("severity")
        .and_then(Value::as_str)
        .map(Severity::from_wire)
        .unwrap_or(Severity::Info);
    let title = raw
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or("Custom Security Event");
    let description = raw
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_owned);

    let mut tags = Vec::new();
    match raw.get("tags").and_then(Value::as_array) {
        Some(supplied) => {
            for tag in supplied.iter().filter_map(Value::as_str) {
                push_tag(&mut tags, tag);
            }
        }
        None => push_tag(&mut tags, "custom"),
    }

    Ok(CanonicalEvent {
        event_id,
        source: EventSource::Custom,
        source_event_id: raw
            .get("source_event_id")
            .and_then(Value::as_str)
            .map(str::to_owned),
        event_time,
        ingested_at: now,
        processed_at: None,
        event_type: event_type.to_string(),
        event_category: category,
        severity,
        status: EventStatus::New,
        title: title.to_string(),
        description,
        cloud_context: None,
        actor: None,
        network: None,
        technique: None,
        correlation_id: None,
        related_event_ids: Vec::new(),
        raw: raw.clone(),
        tags,
        metadata: serde_json::Map::new(),
        risk_score: None,
    })
}
