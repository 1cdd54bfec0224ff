//! Risk scoring.
//!
//! A pure function of one event and the correlation set from the same
//! evaluation; the processor persists the result on the event.

use aegis_types::{CanonicalEvent, CorrelationRecord, Severity};

/// Compute the 0-100 risk score for `event`.
///
/// Base score comes from severity, with additive boosts for correlation
/// membership (+20 each), a technique mapping (+10) and root-account
/// activity (+30), clamped to 100.
pub fn risk_score(event: &CanonicalEvent, correlations: &[CorrelationRecord]) -> u8 {
    let mut score: u32 = match event.severity {
        Severity::Critical => 80,
        Severity::High => 60,
        Severity::Medium => 40,
        Severity::Low => 20,
        Severity::Info => 10,
    };

    score += 20
        * correlations
            .iter()
            .filter(|c| c.contains(&event.event_id))
            .count() as u32;

    if event.technique.is_some() {
        score += 10;
    }
    if event.has_tag("root-account") {
        score += 30;
    }

    score.min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_types::{EventCategory, EventSource, EventStatus, TechniqueInfo};
    use chrono::Utc;
    use serde_json::json;

    fn event(severity: Severity) -> CanonicalEvent {
        CanonicalEvent {
            event_id: "evt-1".into(),
            source: EventSource::CloudAudit,
            source_event_id: None,
            event_time: Utc::now(),
            ingested_at: Utc::now(),
            processed_at: None,
            event_type: "ConsoleLogin".into(),
            event_category: EventCategory::Authentication,
            severity,
            status: EventStatus::New,
            title: "t".into(),
            description: None,
            cloud_context: None,
            actor: None,
            network: None,
            technique: None,
            correlation_id: None,
            related_event_ids: Vec::new(),
            raw: json!({}),
            tags: Vec::new(),
            metadata: serde_json::Map::new(),
            risk_score: None,
        }
    }

    fn correlation_with(event_ids: &[&str]) -> CorrelationRecord {
        CorrelationRecord {
            rule: "brute_force".into(),
            description: "d".into(),
            severity: Severity::High,
            correlation_id: "0011223344556677".into(),
            event_ids: event_ids.iter().map(|s| s.to_string()).collect(),
            event_count: event_ids.len(),
            source_ip: None,
            actor: None,
            sequence: None,
            event_types: None,
        }
    }

    #[test]
    fn base_scores_follow_severity() {
        assert_eq!(risk_score(&event(Severity::Critical), &[]), 80);
        assert_eq!(risk_score(&event(Severity::High), &[]), 60);
        assert_eq!(risk_score(&event(Severity::Medium), &[]), 40);
        assert_eq!(risk_score(&event(Severity::Low), &[]), 20);
        assert_eq!(risk_score(&event(Severity::Info), &[]), 10);
    }

    #[test]
    fn boosts_compose_additively() {
        let mut e = event(Severity::High);
        e.technique = Some(TechniqueInfo::new("Initial Access", "T1078", "Valid Accounts"));
        let correlations = [correlation_with(&["evt-1", "evt-2"])];

        // 60 base + 10 technique + 20 membership.
        assert_eq!(risk_score(&e, &correlations), 90);

        // Root-account pushes past the cap.
        e.tags.push("root-account".into());
        assert_eq!(risk_score(&e, &correlations), 100);
    }

    #[test]
    fn non_member_correlations_do_not_count() {
        let e = event(Severity::Low);
        let correlations = [correlation_with(&["someone-else"])];
        assert_eq!(risk_score(&e, &correlations), 20);
    }

    #[test]
    fn scoring_is_pure() {
        let e = event(Severity::Medium);
        let correlations = [correlation_with(&["evt-1"])];
        assert_eq!(
            risk_score(&e, &correlations),
            risk_score(&e, &correlations)
        );
    }
}
