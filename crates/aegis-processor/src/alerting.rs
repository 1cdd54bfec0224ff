//! Alert decision, formatting and fire-and-forget dispatch.

use std::collections::HashMap;

use tracing::{debug, error};

use aegis_queue::AlertSink;
use aegis_types::{CanonicalEvent, CorrelationRecord, Severity};

use crate::config::ProcessorConfig;

const BANNER: &str = "============================================================";
/// User agents are clipped to keep alert bodies readable.
const USER_AGENT_CLIP: usize = 100;
/// At most this many correlated patterns are listed per event alert.
const CORRELATION_LIST_CAP: usize = 5;
/// At most this many member ids are listed per correlation alert.
const EVENT_ID_LIST_CAP: usize = 5;

/// Whether `event` warrants an operator alert.
///
/// Critical always alerts; high alerts when the configured threshold admits
/// it; anything else alerts once its risk score crosses the threshold.
pub fn should_alert(event: &CanonicalEvent, risk_score: u8, config: &ProcessorConfig) -> bool {
    match event.severity {
        Severity::Critical => true,
        Severity::High if config.alert_threshold_severity.rank() <= Severity::High.rank() => true,
        _ => risk_score >= config.alert_threshold_risk_score,
    }
}

fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Subject line for an event alert.
pub fn event_alert_subject(event: &CanonicalEvent) -> String {
    format!(
        "[{}] {}",
        event.severity.as_str().to_uppercase(),
        clip(&event.title, 80)
    )
}

/// Subject line for a correlation alert.
pub fn correlation_alert_subject(correlation: &CorrelationRecord) -> String {
    format!(
        "[CORRELATION] {}: {}",
        correlation.rule,
        clip(&correlation.description, 60)
    )
}

/// Render the plain-text body of an event alert.
pub fn format_event_alert(
    event: &CanonicalEvent,
    risk_score: u8,
    correlations: &[&CorrelationRecord],
) -> String {
    let mut lines = vec![
        BANNER.to_string(),
        "SECURITY ALERT".to_string(),
        BANNER.to_string(),
        String::new(),
        format!("Title: {}", event.title),
        format!("Severity: {}", event.severity.as_str().to_uppercase()),
        format!("Risk Score: {risk_score}/100"),
        String::new(),
        format!("Event ID: {}", event.event_id),
        format!("Source: {}", event.source),
        format!("Event Type: {}", event.event_type),
        format!("Category: {}", event.event_category),
        format!("Time: {}", event.event_time.to_rfc3339()),
        String::new(),
    ];

    if let Some(ctx) = &event.cloud_context {
        lines.push("Cloud Context:".to_string());
        if let Some(account) = &ctx.account {
            lines.push(format!("  Account: {account}"));
        }
        if let Some(region) = &ctx.region {
            lines.push(format!("  Region: {region}"));
        }
        if let Some(service) = &ctx.service {
            lines.push(format!("  Service: {service}"));
        }
        if let Some(resource_id) = &ctx.resource_id {
            lines.push(format!("  Resource: {resource_id}"));
        }
        lines.push(String::new());
    }

    if let Some(actor) = &event.actor {
        lines.push("Actor:".to_string());
        if let Some(user) = &actor.user_name {
            lines.push(format!("  User: {user}"));
        }
        if let Some(arn) = &actor.identity_arn {
            lines.push(format!("  ARN: {arn}"));
        }
        if let Some(principal_type) = &actor.principal_type {
            lines.push(format!("  Type: {principal_type}"));
        }
        lines.push(String::new());
    }

    if let Some(network) = &event.network {
        lines.push("Network:".to_string());
        if let Some(ip) = &network.source_ip {
            lines.push(format!("  Source IP: {ip}"));
        }
        if let Some(agent) = &network.user_agent {
            lines.push(format!("  User Agent: {}", clip(agent, USER_AGENT_CLIP)));
        }
        lines.push(String::new());
    }

    if let Some(technique) = &event.technique {
        lines.push("Technique:".to_string());
        lines.push(format!("  Tactic: {}", technique.tactic));
        lines.push(format!(
            "  Technique: {} - {}",
            technique.technique_id, technique.technique_name
        ));
        lines.push(String::new());
    }

    let member_of: Vec<&&CorrelationRecord> = correlations
        .iter()
        .filter(|c| c.contains(&event.event_id))
        .take(CORRELATION_LIST_CAP)
        .collect();
    if !member_of.is_empty() {
        lines.push("Correlated Patterns:".to_string());
        for correlation in member_of {
            lines.push(format!(
                "  - {}: {}",
                correlation.rule, correlation.description
            ));
        }
        lines.push(String::new());
    }

    if let Some(description) = &event.description {
        lines.push("Description:".to_string());
        lines.push(format!("  {description}"));
        lines.push(String::new());
    }

    lines.push(BANNER.to_string());
    lines.join("\n")
}

/// Render the plain-text body of a correlation alert.
pub fn format_correlation_alert(correlation: &CorrelationRecord) -> String {
    let mut lines = vec![
        BANNER.to_string(),
        "SECURITY CORRELATION ALERT".to_string(),
        BANNER.to_string(),
        String::new(),
        format!("Pattern: {}", correlation.rule),
        format!("Description: {}", correlation.description),
        format!("Severity: {}", correlation.severity.as_str().to_uppercase()),
        String::new(),
        format!("Correlation ID: {}", correlation.correlation_id),
        format!("Event Count: {}", correlation.event_count),
        String::new(),
    ];

    if let Some(source_ip) = &correlation.source_ip {
        lines.push(format!("Source IP: {source_ip}"));
    }
    if let Some(actor) = &correlation.actor {
        lines.push(format!("Actor: {actor}"));
    }
    if let Some(sequence) = &correlation.sequence {
        lines.push(format!("Event Sequence: {}", sequence.join(" -> ")));
    }
    if let Some(event_types) = &correlation.event_types {
        let shown: Vec<&str> = event_types
            .iter()
            .take(EVENT_ID_LIST_CAP)
            .map(String::as_str)
            .collect();
        lines.push(format!("Event Types: {}", shown.join(", ")));
    }

    lines.push(String::new());
    let shown: Vec<&str> = correlation
        .event_ids
        .iter()
        .take(EVENT_ID_LIST_CAP)
        .map(String::as_str)
        .collect();
    lines.push(format!("Related Event IDs: {}", shown.join(", ")));
    if correlation.event_ids.len() > EVENT_ID_LIST_CAP {
        lines.push(format!(
            "  ... and {} more",
            correlation.event_ids.len() - EVENT_ID_LIST_CAP
        ));
    }

    lines.push(String::new());
    lines.push(BANNER.to_string());
    lines.join("\n")
}

/// Dispatch an event alert. Fire-and-forget: failure is logged, never
/// retried, and reported back as `false`.
pub async fn send_event_alert(
    sink: &dyn AlertSink,
    event: &CanonicalEvent,
    risk_score: u8,
    correlations: &[&CorrelationRecord],
) -> bool {
    let subject = event_alert_subject(event);
    let body = format_event_alert(event, risk_score, correlations);
    let attributes = HashMap::from([
        ("severity".to_string(), event.severity.as_str().to_string()),
        ("event_type".to_string(), event.event_type.clone()),
        ("risk_score".to_string(), risk_score.to_string()),
    ]);

    match sink.publish(&subject, &body, &attributes).await {
        Ok(()) => {
            debug!(event_id = %event.event_id, "dispatched event alert");
            true
        }
        Err(err) => {
            error!(%err, event_id = %event.event_id, "failed to dispatch event alert");
            false
        }
    }
}

/// Dispatch a correlation alert. Same fire-and-forget contract.
pub async fn send_correlation_alert(
    sink: &dyn AlertSink,
    correlation: &CorrelationRecord,
) -> bool {
    let subject = correlation_alert_subject(correlation);
    let body = format_correlation_alert(correlation);
    let attributes = HashMap::from([
        ("alert_type".to_string(), "correlation".to_string()),
        ("rule".to_string(), correlation.rule.clone()),
        (
            "severity".to_string(),
            correlation.severity.as_str().to_string(),
        ),
    ]);

    match sink.publish(&subject, &body, &attributes).await {
        Ok(()) => {
            debug!(
                correlation_id = %correlation.correlation_id,
                "dispatched correlation alert"
            );
            true
        }
        Err(err) => {
            error!(
                %err,
                correlation_id = %correlation.correlation_id,
                "failed to dispatch correlation alert"
            );
            false
        }
    }
}
