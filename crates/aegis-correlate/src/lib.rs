#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **aegis-correlate** – Correlation engine for Aegis.
//!
//! The correlator consumes a window of canonical events and emits
//! [`CorrelationRecord`]s for multi-event attack patterns. Four rule
//! evaluators run on every invocation:
//!
//! * [`rules::brute_force`] – repeated failed logins from one address
//! * [`rules::privilege_escalation`] – identity changes following a login
//! * [`rules::logging_tampering`] – audit-trail modifications
//! * [`rules::reconnaissance`] – discovery-call floods from one address
//!
//! The engine is deterministic: identical input windows produce identical
//! output (buckets iterate in insertion order, members are sorted
//! chronologically before ids are derived) and the risk scorer is a pure
//! function. The correlator itself enforces no time window; callers hand it
//! whatever slice of history they consider current.

use sha2::{Digest, Sha256};
use tracing::warn;

use aegis_types::{CanonicalEvent, CorrelationRecord};

pub mod rules;
mod score;

pub use score::risk_score;

/// Stable identifier of the brute-force rule.
pub const BRUTE_FORCE: &str = "brute_force";
/// Stable identifier of the privilege-escalation rule.
pub const PRIVILEGE_ESCALATION: &str = "privilege_escalation";
/// Stable identifier of the logging-tampering rule.
pub const LOGGING_TAMPERING: &str = "logging_tampering";
/// Stable identifier of the reconnaissance rule.
pub const RECONNAISSANCE: &str = "reconnaissance";

type RuleFn = fn(&[CanonicalEvent]) -> anyhow::Result<Option<CorrelationRecord>>;

/// Run every correlation rule over `events`.
///
/// A rule that fails on unexpected input is logged and skipped; the
/// remaining rules still run. Output order follows the fixed rule order.
pub fn correlate(events: &[CanonicalEvent]) -> Vec<CorrelationRecord> {
    let evaluators: [(&str, RuleFn); 4] = [
        (BRUTE_FORCE, rules::brute_force),
        (PRIVILEGE_ESCALATION, rules::privilege_escalation),
        (LOGGING_TAMPERING, rules::logging_tampering),
        (RECONNAISSANCE, rules::reconnaissance),
    ];

    let mut records = Vec::new();
    for (name, evaluate) in evaluators {
        match evaluate(events) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(err) => warn!(rule = name, %err, "rule evaluation failed"),
        }
    }
    records
}

/// Derive the deterministic 16-hex-char correlation id.
///
/// The hash covers the rule name plus the type and source IP of the
/// chronologically-first member, so the same pattern keeps the same id
/// across evaluations regardless of the order members arrived in.
pub fn correlation_id(rule: &str, members: &[&CanonicalEvent]) -> String {
    let event_type = members.first().map(|e| e.event_type.as_str()).unwrap_or("");
    let source_ip = members
        .first()
        .and_then(|e| e.source_ip())
        .unwrap_or("");
    let digest = Sha256::digest(format!("{rule}:{event_type}:{source_ip}").as_bytes());
    digest
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Sort event references chronologically, id as tiebreak for stability.
pub(crate) fn sort_chronological(events: &mut [&CanonicalEvent]) {
    events.sort_by(|a, b| {
        a.event_time
            .cmp(&b.event_time)
            .then_with(|| a.event_id.cmp(&b.event_id))
    });
}

/// Bucket key for events grouped by source IP.
pub(crate) fn ip_bucket(event: &CanonicalEvent) -> String {
    event.source_ip().unwrap_or("unknown").to_string()
}
