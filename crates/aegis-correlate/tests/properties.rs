//! Property tests for the pure parts of the correlation engine.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::json;

use aegis_correlate::{correlation_id, risk_score, BRUTE_FORCE};
use aegis_types::{
    CanonicalEvent, CorrelationRecord, EventCategory, EventSource, EventStatus, NetworkInfo,
    Severity, TechniqueInfo,
};

fn event(n: usize, minutes: i64, ip: &str) -> CanonicalEvent {
    CanonicalEvent {
        event_id: format!("evt-{n:03}"),
        source: EventSource::CloudAudit,
        source_event_id: None,
        event_time: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes),
        ingested_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        processed_at: None,
        event_type: "ConsoleLogin".into(),
        event_category: EventCategory::Authentication,
        severity: Severity::High,
        status: EventStatus::New,
        title: "t".into(),
        description: None,
        cloud_context: None,
        actor: None,
        network: Some(NetworkInfo {
            source_ip: Some(ip.into()),
            ..NetworkInfo::default()
        }),
        technique: None,
        correlation_id: None,
        related_event_ids: Vec::new(),
        raw: json!({}),
        tags: Vec::new(),
        metadata: serde_json::Map::new(),
        risk_score: None,
    }
}

fn severity_strategy() -> impl Strategy<Value = Severity> {
    prop_oneof![
        Just(Severity::Critical),
        Just(Severity::High),
        Just(Severity::Medium),
        Just(Severity::Low),
        Just(Severity::Info),
    ]
}

proptest! {
    #[test]
    fn correlation_id_ignores_member_order(order in Just(vec![0usize, 1, 2, 3, 4]).prop_shuffle()) {
        let events: Vec<CanonicalEvent> =
            (0..5).map(|n| event(n, n as i64, "198.51.100.7")).collect();
        let shuffled: Vec<CanonicalEvent> =
            order.iter().map(|&n| event(n, n as i64, "198.51.100.7")).collect();

        let mut canonical: Vec<&CanonicalEvent> = events.iter().collect();
        let mut permuted: Vec<&CanonicalEvent> = shuffled.iter().collect();
        canonical.sort_by(|a, b| a.event_time.cmp(&b.event_time));
        permuted.sort_by(|a, b| a.event_time.cmp(&b.event_time));

        prop_assert_eq!(
            correlation_id(BRUTE_FORCE, &canonical),
            correlation_id(BRUTE_FORCE, &permuted)
        );
    }

    #[test]
    fn risk_score_stays_in_bounds(
        severity in severity_strategy(),
        memberships in 0usize..6,
        technique in any::<bool>(),
        root in any::<bool>(),
    ) {
        let mut e = event(0, 0, "203.0.113.1");
        e.severity = severity;
        if technique {
            e.technique = Some(TechniqueInfo::new("Impact", "T1496", "Resource Hijacking"));
        }
        if root {
            e.tags.push("root-account".into());
        }
        let correlations: Vec<CorrelationRecord> = (0..memberships)
            .map(|i| CorrelationRecord {
                rule: format!("rule-{i}"),
                description: "d".into(),
                severity: Severity::High,
                correlation_id: format!("{i:016x}"),
                event_ids: vec![e.event_id.clone()],
                event_count: 1,
                source_ip: None,
                actor: None,
                sequence: None,
                event_types: None,
            })
            .collect();

        let score = risk_score(&e, &correlations);
        prop_assert!(score <= 100);
        prop_assert!(score >= 10);
        // Pure: same inputs, same output.
        prop_assert_eq!(score, risk_score(&e, &correlations));
    }
}
