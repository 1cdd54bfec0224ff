//! The four correlation rule evaluators.
//!
//! Every rule scans the whole window it is handed and emits at most one
//! record per invocation. Grouping uses insertion-ordered maps so the
//! "first qualifying bucket" is the same on every run over the same input.

use anyhow::Result;
use indexmap::IndexMap;

use aegis_types::{CanonicalEvent, CorrelationRecord, Severity};

use crate::{
    correlation_id, ip_bucket, sort_chronological, BRUTE_FORCE, LOGGING_TAMPERING,
    PRIVILEGE_ESCALATION, RECONNAISSANCE,
};

/// Minimum failed logins in one bucket before brute force fires.
const BRUTE_FORCE_MIN_EVENTS: usize = 5;
/// Minimum discovery calls in one bucket before reconnaissance fires.
const RECON_MIN_EVENTS: usize = 20;
/// Cap on member ids carried in a reconnaissance record.
const RECON_EVENT_ID_CAP: usize = 20;
/// Cap on distinct event types carried in a reconnaissance record.
const RECON_EVENT_TYPE_CAP: usize = 10;

/// Tags marking a login attempt as failed.
const FAILURE_TAGS: &[&str] = &["accessdenied", "unauthorizedaccess", "error"];
/// Identity changes that count as escalation follow-ups.
const ESCALATION_FOLLOW_UPS: &[&str] = &[
    "CreateAccessKey",
    "CreateUser",
    "AttachUserPolicy",
    "AttachRolePolicy",
];
/// Audit-trail modifications flagged outright.
const TAMPERING_EVENTS: &[&str] = &["StopLogging", "DeleteTrail", "UpdateTrail"];
/// Verb prefixes identifying discovery calls.
const DISCOVERY_PREFIXES: &[&str] = &["List", "Describe", "Get"];

fn member_ids(members: &[&CanonicalEvent]) -> Vec<String> {
    members.iter().map(|e| e.event_id.clone()).collect()
}

fn distinct_types(members: &[&CanonicalEvent]) -> Vec<String> {
    let mut types = Vec::new();
    for event in members {
        if !types.contains(&event.event_type) {
            types.push(event.event_type.clone());
        }
    }
    types
}

/// Repeated failed `ConsoleLogin` attempts from a single address.
pub fn brute_force(events: &[CanonicalEvent]) -> Result<Option<CorrelationRecord>> {
    let logins: Vec<&CanonicalEvent> = events
        .iter()
        .filter(|e| e.event_type == "ConsoleLogin")
        .collect();
    if logins.len() < BRUTE_FORCE_MIN_EVENTS {
        return Ok(None);
    }

    let mut by_ip: IndexMap<String, Vec<&CanonicalEvent>> = IndexMap::new();
    for event in logins {
        by_ip.entry(ip_bucket(event)).or_default().push(event);
    }

    for (ip, bucket) in &by_ip {
        let mut failed: Vec<&CanonicalEvent> = bucket
            .iter()
            .copied()
            .filter(|e| FAILURE_TAGS.iter().any(|t| e.has_tag(t)))
            .collect();
        if failed.len() < BRUTE_FORCE_MIN_EVENTS {
            continue;
        }
        sort_chronological(&mut failed);
        return Ok(Some(CorrelationRecord {
            rule: BRUTE_FORCE.to_string(),
            description: "Multiple failed authentication attempts".to_string(),
            severity: Severity::High,
            correlation_id: correlation_id(BRUTE_FORCE, &failed),
            event_ids: member_ids(&failed),
            event_count: failed.len(),
            source_ip: Some(ip.clone()),
            actor: None,
            sequence: None,
            event_types: None,
        }));
    }
    Ok(None)
}

/// Identity modifications following a successful login by one actor.
pub fn privilege_escalation(events: &[CanonicalEvent]) -> Result<Option<CorrelationRecord>> {
    let mut by_actor: IndexMap<String, Vec<&CanonicalEvent>> = IndexMap::new();
    for event in events {
        let actor_id = event
            .actor
            .as_ref()
            .and_then(|a| a.user_name.as_deref().or(a.identity_arn.as_deref()))
            .unwrap_or("unknown")
            .to_string();
        by_actor.entry(actor_id).or_default().push(event);
    }

    for (actor_id, bucket) in by_actor.iter_mut() {
        sort_chronological(bucket);

        let mut login: Option<&CanonicalEvent> = None;
        let mut follow_ups: Vec<&CanonicalEvent> = Vec::new();
        for event in bucket.iter().copied() {
            if event.event_type == "ConsoleLogin" && !event.has_tag("error") {
                login = Some(event);
            } else if login.is_some() && ESCALATION_FOLLOW_UPS.contains(&event.event_type.as_str())
            {
                follow_ups.push(event);
            }
        }

        let Some(login) = login else { continue };
        if follow_ups.is_empty() {
            continue;
        }

        let mut members = vec![login];
        members.extend(follow_ups);
        sort_chronological(&mut members);
        let sequence: Vec<String> = members.iter().map(|e| e.event_type.clone()).collect();
        return Ok(Some(CorrelationRecord {
            rule: PRIVILEGE_ESCALATION.to_string(),
            description: "Identity modifications following authentication".to_string(),
            severity: Severity::Critical,
            correlation_id: correlation_id(PRIVILEGE_ESCALATION, &members),
            event_ids: member_ids(&members),
            event_count: members.len(),
            source_ip: None,
            actor: Some(actor_id.clone()),
            sequence: Some(sequence),
            event_types: None,
        }));
    }
    Ok(None)
}

/// Any audit-trail modification, flagged immediately.
pub fn logging_tampering(events: &[CanonicalEvent]) -> Result<Option<CorrelationRecord>> {
    let mut tampering: Vec<&CanonicalEvent> = events
        .iter()
        .filter(|e| TAMPERING_EVENTS.contains(&e.event_type.as_str()))
        .collect();
    if tampering.is_empty() {
        return Ok(None);
    }
    sort_chronological(&mut tampering);
    Ok(Some(CorrelationRecord {
        rule: LOGGING_TAMPERING.to_string(),
        description: "Audit logging modifications".to_string(),
        severity: Severity::Critical,
        correlation_id: correlation_id(LOGGING_TAMPERING, &tampering),
        event_ids: member_ids(&tampering),
        event_count: tampering.len(),
        source_ip: None,
        actor: None,
        sequence: None,
        event_types: Some(distinct_types(&tampering)),
    }))
}

/// A flood of discovery calls from a single address.
pub fn reconnaissance(events: &[CanonicalEvent]) -> Result<Option<CorrelationRecord>> {
    let discovery: Vec<&CanonicalEvent> = events
        .iter()
        .filter(|e| {
            DISCOVERY_PREFIXES
                .iter()
                .any(|p| e.event_type.starts_with(p))
        })
        .collect();
    if discovery.len() < RECON_MIN_EVENTS {
        return Ok(None);
    }

    let mut by_ip: IndexMap<String, Vec<&CanonicalEvent>> = IndexMap::new();
    for event in discovery {
        by_ip.entry(ip_bucket(event)).or_default().push(event);
    }

    for (ip, bucket) in by_ip.iter_mut() {
        if bucket.len() < RECON_MIN_EVENTS {
            continue;
        }
        sort_chronological(bucket);
        let mut event_ids = member_ids(bucket);
        event_ids.truncate(RECON_EVENT_ID_CAP);
        let mut event_types = distinct_types(bucket);
        event_types.truncate(RECON_EVENT_TYPE_CAP);
        return Ok(Some(CorrelationRecord {
            rule: RECONNAISSANCE.to_string(),
            description: "Multiple discovery API calls".to_string(),
            severity: Severity::Medium,
            correlation_id: correlation_id(RECONNAISSANCE, bucket),
            event_ids,
            event_count: bucket.len(),
            source_ip: Some(ip.clone()),
            actor: None,
            sequence: None,
            event_types: Some(event_types),
        }));
    }
    Ok(None)
}
