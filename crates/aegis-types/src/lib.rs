#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **aegis-types** – Canonical security event model for Aegis.
//!
//! The crate is dependency-light and sits at the very bottom of the crate
//! graph so that *every* other crate can depend on it without causing cycles.
//! It defines the uniform schema that all vendor telemetry is normalized
//! into, plus the correlation record emitted by the rule engine and the
//! queue message contract between the ingestor and the processor.
//!
//! Vendor payloads are loosely structured, so `raw` and `metadata` are kept
//! as opaque [`serde_json::Value`] trees rather than typed structs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

//─────────────────────────────
//  Closed enumerations
//─────────────────────────────

/// Event severity, ordered from informational up to critical.
///
/// The set is closed: parsers map unknown wire values to [`Severity::Info`]
/// instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Requires immediate operator attention.
    Critical,
    /// High-risk activity.
    High,
    /// Noteworthy but not urgent.
    Medium,
    /// Low-risk activity.
    Low,
    /// Informational only.
    Info,
}

impl Severity {
    /// Numeric rank used for comparisons; higher means more severe.
    pub fn rank(self) -> u8 {
        match self {
            Severity::Critical => 4,
            Severity::High => 3,
            Severity::Medium => 2,
            Severity::Low => 1,
            Severity::Info => 0,
        }
    }

    /// Wire form of the severity.
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }

    /// Parse a wire string; unknown values default to [`Severity::Info`].
    pub fn from_wire(s: &str) -> Self {
        match s {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            "low" => Severity::Low,
            _ => Severity::Info,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing lifecycle state of an event.
///
/// Status only ever advances (`New` → `Processing` → `Processed` →
/// `Correlated`/`Alerted`); the store drivers enforce this when applying
/// partial updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    /// Freshly normalized, not yet picked up.
    New,
    /// Claimed by a processor.
    Processing,
    /// Fully processed.
    Processed,
    /// Processed and member of a correlation.
    Correlated,
    /// Processed and an alert was dispatched.
    Alerted,
}

impl EventStatus {
    /// Position in the lifecycle; transitions may never decrease it.
    pub fn rank(self) -> u8 {
        match self {
            EventStatus::New => 0,
            EventStatus::Processing => 1,
            EventStatus::Processed => 2,
            EventStatus::Correlated => 3,
            EventStatus::Alerted => 4,
        }
    }

    /// Wire form of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::New => "new",
            EventStatus::Processing => "processing",
            EventStatus::Processed => "processed",
            EventStatus::Correlated => "correlated",
            EventStatus::Alerted => "alerted",
        }
    }
}

/// Telemetry source an event was normalized from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// Cloud provider audit-log records.
    CloudAudit,
    /// Managed threat-detector findings.
    ThreatDetector,
    /// Aggregated findings hub.
    AuditHub,
    /// Pre-normalized records from custom tooling.
    Custom,
}

impl EventSource {
    /// Wire form of the source.
    pub fn as_str(self) -> &'static str {
        match self {
            EventSource::CloudAudit => "cloud_audit",
            EventSource::ThreatDetector => "threat_detector",
            EventSource::AuditHub => "audit_hub",
            EventSource::Custom => "custom",
        }
    }
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broad behavioral category assigned at normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum EventCategory {
    Authentication,
    IdentityManagement,
    NetworkSecurity,
    DataAccess,
    Logging,
    ResourceModification,
    Discovery,
    Reconnaissance,
    UnauthorizedAccess,
    Execution,
    Persistence,
    PrivilegeEscalation,
    DefenseEvasion,
    CredentialAccess,
    Exfiltration,
    Impact,
    Cryptomining,
    Malware,
    Anomaly,
    Pentest,
    PolicyViolation,
    Other,
}

impl EventCategory {
    /// Wire form of the category.
    pub fn as_str(self) -> &'static str {
        match self {
            EventCategory::Authentication => "authentication",
            EventCategory::IdentityManagement => "identity_management",
            EventCategory::NetworkSecurity => "network_security",
            EventCategory::DataAccess => "data_access",
            EventCategory::Logging => "logging",
            EventCategory::ResourceModification => "resource_modification",
            EventCategory::Discovery => "discovery",
            EventCategory::Reconnaissance => "reconnaissance",
            EventCategory::UnauthorizedAccess => "unauthorized_access",
            EventCategory::Execution => "execution",
            EventCategory::Persistence => "persistence",
            EventCategory::PrivilegeEscalation => "privilege_escalation",
            EventCategory::DefenseEvasion => "defense_evasion",
            EventCategory::CredentialAccess => "credential_access",
            EventCategory::Exfiltration => "exfiltration",
            EventCategory::Impact => "impact",
            EventCategory::Cryptomining => "cryptomining",
            EventCategory::Malware => "malware",
            EventCategory::Anomaly => "anomaly",
            EventCategory::Pentest => "pentest",
            EventCategory::PolicyViolation => "policy_violation",
            EventCategory::Other => "other",
        }
    }

    /// Parse a wire string; unknown values default to [`EventCategory::Other`].
    pub fn from_wire(s: &str) -> Self {
        match s {
            "authentication" => EventCategory::Authentication,
            "identity_management" => EventCategory::IdentityManagement,
            "network_security" => EventCategory::NetworkSecurity,
            "data_access" => EventCategory::DataAccess,
            "logging" => EventCategory::Logging,
            "resource_modification" => EventCategory::ResourceModification,
            "discovery" => EventCategory::Discovery,
            "reconnaissance" => EventCategory::Reconnaissance,
            "unauthorized_access" => EventCategory::UnauthorizedAccess,
            "execution" => EventCategory::Execution,
            "persistence" => EventCategory::Persistence,
            "privilege_escalation" => EventCategory::PrivilegeEscalation,
            "defense_evasion" => EventCategory::DefenseEvasion,
            "credential_access" => EventCategory::CredentialAccess,
            "exfiltration" => EventCategory::Exfiltration,
            "impact" => EventCategory::Impact,
            "cryptomining" => EventCategory::Cryptomining,
            "malware" => EventCategory::Malware,
            "anomaly" => EventCategory::Anomaly,
            "pentest" => EventCategory::Pentest,
            "policy_violation" => EventCategory::PolicyViolation,
            _ => EventCategory::Other,
        }
    }
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//─────────────────────────────
//  Nested context records
//─────────────────────────────

/// Cloud-provider context extracted from the raw record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudContext {
    /// Account the activity happened in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// Provider region.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Short service name (e.g. `iam`, `s3`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Identifier of the touched resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    /// Vendor resource type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
}

/// Identity of the principal behind an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActorInfo {
    /// Opaque principal identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal_id: Option<String>,
    /// Principal kind (IAMUser, AssumedRole, Root, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal_type: Option<String>,
    /// Full identity ARN.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_arn: Option<String>,
    /// Access key used, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    /// Friendly user name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Session issuer name for assumed-role activity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_name: Option<String>,
}

/// Network observations attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkInfo {
    /// Remote address the activity originated from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<String>,
    /// Remote port.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_port: Option<u16>,
    /// Local address targeted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_ip: Option<String>,
    /// Local port targeted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_port: Option<u16>,
    /// Transport protocol.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Client user agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// Adversary-framework technique assigned to an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechniqueInfo {
    /// Tactic name (e.g. `Persistence`).
    pub tactic: String,
    /// Technique identifier (e.g. `T1078`).
    pub technique_id: String,
    /// Technique display name.
    pub technique_name: String,
}

impl TechniqueInfo {
    /// Construct a technique mapping entry.
    pub fn new(tactic: &str, technique_id: &str, technique_name: &str) -> Self {
        Self {
            tactic: tactic.to_string(),
            technique_id: technique_id.to_string(),
            technique_name: technique_name.to_string(),
        }
    }
}

//─────────────────────────────
//  Canonical event
//─────────────────────────────

/// The uniform record every telemetry source is normalized into.
///
/// `raw` preserves the original vendor payload verbatim and is never
/// mutated after normalization. All other mutable fields are written only
/// by the processor when it records a processing outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    /// Globally unique identifier, minted at normalization.
    pub event_id: String,
    /// Telemetry source.
    pub source: EventSource,
    /// The vendor's own identifier, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_event_id: Option<String>,
    /// Instant the event occurred, as reported by the source.
    pub event_time: DateTime<Utc>,
    /// Instant the normalizer produced this record.
    pub ingested_at: DateTime<Utc>,
    /// Instant the processor finished handling it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    /// Source-specific type string (e.g. `ConsoleLogin`).
    pub event_type: String,
    /// Behavioral category.
    pub event_category: EventCategory,
    /// Severity derived at normalization.
    pub severity: Severity,
    /// Lifecycle state.
    pub status: EventStatus,
    /// Human-readable title.
    pub title: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Cloud-provider context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_context: Option<CloudContext>,
    /// Acting principal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<ActorInfo>,
    /// Network observations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkInfo>,
    /// Adversary technique mapping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technique: Option<TechniqueInfo>,
    /// Correlation this event joined, once processed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Other events related to this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_event_ids: Vec<String>,
    /// Original vendor payload, preserved verbatim.
    pub raw: Value,
    /// Deduplicated tags in insertion order.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Free-form metadata captured at normalization.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, Value>,
    /// Risk score written by the processor (0-100).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<u8>,
}

impl CanonicalEvent {
    /// Source IP of the event, when network context exists.
    pub fn source_ip(&self) -> Option<&str> {
        self.network.as_ref()?.source_ip.as_deref()
    }

    /// Whether `tag` is present on the event.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Mint a new globally unique event id.
pub fn new_event_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Append `tag` to `tags` unless it is already present.
///
/// Source payloads repeat tags freely; the canonical record keeps an
/// ordered set.
pub fn push_tag(tags: &mut Vec<String>, tag: impl Into<String>) {
    let tag = tag.into();
    if !tags.iter().any(|t| *t == tag) {
        tags.push(tag);
    }
}

//─────────────────────────────
//  Correlation record
//─────────────────────────────

/// A detected multi-event attack pattern.
///
/// Correlation records are transient per-evaluation outputs; membership is
/// made durable on the events themselves via `correlation_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationRecord {
    /// Stable rule identifier (e.g. `brute_force`).
    pub rule: String,
    /// Short human description of the pattern.
    pub description: String,
    /// Severity inherited from the rule.
    pub severity: Severity,
    /// Deterministic 16-hex-char identifier.
    pub correlation_id: String,
    /// Member event ids in chronological order.
    pub event_ids: Vec<String>,
    /// Number of member events (may exceed `event_ids.len()` when capped).
    pub event_count: usize,
    /// Offending source IP, for IP-bucketed rules.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<String>,
    /// Offending actor identity, for actor-bucketed rules.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    /// Observed event-type sequence, for sequence rules.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<Vec<String>>,
    /// Distinct member event types, for aggregate rules.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_types: Option<Vec<String>>,
}

impl CorrelationRecord {
    /// Whether the given event is a member of this correlation.
    pub fn contains(&self, event_id: &str) -> bool {
        self.event_ids.iter().any(|id| id == event_id)
    }

    /// Id of the chronologically-first member.
    pub fn first_event_id(&self) -> Option<&str> {
        self.event_ids.first().map(String::as_str)
    }
}

//─────────────────────────────
//  Queue message contract
//─────────────────────────────

/// Body of the queue message linking the ingestor to the processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEventMessage {
    /// Id of the persisted event.
    pub event_id: String,
    /// Source the event came from.
    pub source: EventSource,
    /// Severity at normalization time.
    pub severity: Severity,
    /// Source-specific event type.
    pub event_type: String,
}

impl QueueEventMessage {
    /// Build the message for a normalized event.
    pub fn for_event(event: &CanonicalEvent) -> Self {
        Self {
            event_id: event.event_id.clone(),
            source: event.source,
            severity: event.severity,
            event_type: event.event_type.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_event() -> CanonicalEvent {
        CanonicalEvent {
            event_id: new_event_id(),
            source: EventSource::CloudAudit,
            source_event_id: Some("abc-123".into()),
            event_time: Utc::now(),
            ingested_at: Utc::now(),
            processed_at: None,
            event_type: "ConsoleLogin".into(),
            event_category: EventCategory::Authentication,
            severity: Severity::High,
            status: EventStatus::New,
            title: "CloudAudit: ConsoleLogin".into(),
            description: None,
            cloud_context: None,
            actor: None,
            network: Some(NetworkInfo {
                source_ip: Some("198.51.100.7".into()),
                ..NetworkInfo::default()
            }),
            technique: None,
            correlation_id: None,
            related_event_ids: Vec::new(),
            raw: json!({"eventName": "ConsoleLogin", "nested": {"k": [1, 2, 3]}}),
            tags: vec!["cloudaudit".into()],
            metadata: serde_json::Map::new(),
            risk_score: None,
        }
    }

    #[test]
    fn severity_wire_round_trip() {
        for sev in [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
            Severity::Info,
        ] {
            assert_eq!(Severity::from_wire(sev.as_str()), sev);
            let json = serde_json::to_string(&sev).unwrap();
            assert_eq!(json, format!("\"{}\"", sev.as_str()));
        }
    }

    #[test]
    fn unknown_wire_values_map_to_defaults() {
        assert_eq!(Severity::from_wire("apocalyptic"), Severity::Info);
        assert_eq!(EventCategory::from_wire("quantum"), EventCategory::Other);
    }

    #[test]
    fn status_rank_is_monotone_along_lifecycle() {
        let order = [
            EventStatus::New,
            EventStatus::Processing,
            EventStatus::Processed,
            EventStatus::Correlated,
            EventStatus::Alerted,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].rank() < pair[1].rank());
        }
    }

    #[test]
    fn push_tag_deduplicates_preserving_order() {
        let mut tags = Vec::new();
        push_tag(&mut tags, "cloudaudit");
        push_tag(&mut tags, "error");
        push_tag(&mut tags, "cloudaudit");
        push_tag(&mut tags, "accessdenied");
        assert_eq!(tags, vec!["cloudaudit", "error", "accessdenied"]);
    }

    #[test]
    fn canonical_event_round_trips_with_raw_preserved() {
        let event = sample_event();
        let json = serde_json::to_string(&event).unwrap();
        let back: CanonicalEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.raw, event.raw);
    }

    #[test]
    fn queue_message_mirrors_event_fields() {
        let event = sample_event();
        let msg = QueueEventMessage::for_event(&event);
        assert_eq!(msg.event_id, event.event_id);
        assert_eq!(msg.source, EventSource::CloudAudit);
        let body = serde_json::to_string(&msg).unwrap();
        assert!(body.contains("\"source\":\"cloud_audit\""));
        assert!(body.contains("\"severity\":\"high\""));
    }
}
