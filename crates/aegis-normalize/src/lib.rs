#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **aegis-normalize** – Vendor telemetry normalizers for Aegis.
//!
//! Each normalizer maps one loosely-structured vendor format into a
//! [`CanonicalEvent`](aegis_types::CanonicalEvent): cloud audit-log records
//! ([`normalize_cloud_audit`]), threat-detector findings
//! ([`normalize_threat_detector`]) and pre-normalized custom records
//! ([`normalize_custom`]).
//!
//! Field extraction runs against opaque [`serde_json::Value`] trees and is
//! deliberately partial and defensive: vendor payloads have no fixed schema,
//! so missing branches simply yield `None`. Only the one field a record is
//! meaningless without (the event/finding type) is required.
//!
//! Every normalizer has a `*_with` variant taking the wall clock and the
//! fresh event id as arguments; given identical inputs those are pure
//! functions, which is what the test suites pin.

use chrono::{DateTime, Utc};
use serde_json::Value;

mod cloud_audit;
mod custom;
mod threat_detector;

pub use cloud_audit::{normalize_cloud_audit, normalize_cloud_audit_with};
pub use custom::{normalize_custom, normalize_custom_with};
pub use threat_detector::{normalize_threat_detector, normalize_threat_detector_with};

/// Errors produced while normalizing a single record.
///
/// A failing record is logged and dropped by callers; it never fails the
/// surrounding batch.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// The record lacks the one field it cannot be interpreted without.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
}

/// Extract a string at a JSON pointer, owned.
pub(crate) fn str_at(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_owned)
}

/// Parse an ISO-8601 timestamp (trailing `Z` accepted as UTC).
///
/// Vendors occasionally ship garbage timestamps; those fall back to the
/// supplied wall-clock instant instead of failing the record.
pub(crate) fn parse_time_or(value: Option<&str>, fallback: DateTime<Utc>) -> DateTime<Utc> {
    match value {
        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(t) => t.with_timezone(&Utc),
            Err(err) => {
                tracing::debug!(raw, %err, "unparsable event time, using wall clock");
                fallback
            }
        },
        None => fallback,
    }
}

/// Extract a port number at a JSON pointer.
pub(crate) fn port_at(value: &Value, pointer: &str) -> Option<u16> {
    value
        .pointer(pointer)
        .and_then(Value::as_u64)
        .and_then(|p| u16::try_from(p).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn time_parsing_accepts_trailing_z() {
        let fallback = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let parsed = parse_time_or(Some("2026-03-01T12:30:00Z"), fallback);
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap());
    }

    #[test]
    fn time_parsing_falls_back_on_garbage() {
        let fallback = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_time_or(Some("not-a-time"), fallback), fallback);
        assert_eq!(parse_time_or(None, fallback), fallback);
    }
}
