//! Normalizer for cloud audit-log records.
//!
//! Audit records describe management-plane API calls. Severity and category
//! are derived from the event name, the calling identity and the error code;
//! a static table maps well-known event names to adversary techniques.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use aegis_types::{
    new_event_id, push_tag, ActorInfo, CanonicalEvent, CloudContext, EventCategory, EventSource,
    EventStatus, NetworkInfo, Severity, TechniqueInfo,
};

use crate::{parse_time_or, str_at, NormalizeError};

/// Event names that are high severity regardless of outcome.
const HIGH_SEVERITY_EVENTS: &[&str] = &[
    "ConsoleLogin",
    "CreateUser",
    "CreateAccessKey",
    "DeleteTrail",
    "StopLogging",
    "PutBucketPolicy",
    "PutBucketAcl",
    "AuthorizeSecurityGroupIngress",
    "CreateSecurityGroup",
    "ModifyInstanceAttribute",
    "RunInstances",
];

/// Error codes signalling a rejected call.
const DENIAL_ERROR_CODES: &[&str] = &["AccessDenied", "UnauthorizedAccess", "InvalidClientTokenId"];

/// Event names that constitute authentication activity.
const AUTHENTICATION_EVENTS: &[&str] = &[
    "ConsoleLogin",
    "GetFederationToken",
    "GetSessionToken",
    "AssumeRole",
    "AssumeRoleWithSAML",
    "AssumeRoleWithWebIdentity",
];

/// Patterns whose match makes an event critical outright.
static CRITICAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i).*Delete.*Trail.*",
        r"(?i).*Stop.*Logging.*",
        r"(?i).*Disable.*",
        r"(?i).*Root.*",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static severity pattern"))
    .collect()
});

/// Adversary-technique assignments for well-known audit event names.
static TECHNIQUE_MAP: Lazy<Vec<(&'static str, TechniqueInfo)>> = Lazy::new(|| {
    vec![
        // Initial access
        (
            "ConsoleLogin",
            TechniqueInfo::new("Initial Access", "T1078", "Valid Accounts"),
        ),
        // Persistence
        (
            "CreateUser",
            TechniqueInfo::new("Persistence", "T1136.003", "Create Account: Cloud Account"),
        ),
        (
            "CreateAccessKey",
            TechniqueInfo::new(
                "Persistence",
                "T1098.001",
                "Account Manipulation: Additional Cloud Credentials",
            ),
        ),
        (
            "CreateRole",
            TechniqueInfo::new("Persistence", "T1098", "Account Manipulation"),
        ),
        (
            "AttachUserPolicy",
            TechniqueInfo::new("Persistence", "T1098", "Account Manipulation"),
        ),
        (
            "AttachRolePolicy",
            TechniqueInfo::new("Persistence", "T1098", "Account Manipulation"),
        ),
        // Privilege escalation
        (
            "AssumeRole",
            TechniqueInfo::new(
                "Privilege Escalation",
                "T1548",
                "Abuse Elevation Control Mechanism",
            ),
        ),
        (
            "UpdateAssumeRolePolicy",
            TechniqueInfo::new(
                "Privilege Escalation",
                "T1548",
                "Abuse Elevation Control Mechanism",
            ),
        ),
        // Defense evasion
        (
            "StopLogging",
            TechniqueInfo::new(
                "Defense Evasion",
                "T1562.008",
                "Impair Defenses: Disable Cloud Logs",
            ),
        ),
        (
            "DeleteTrail",
            TechniqueInfo::new(
                "Defense Evasion",
                "T1562.008",
                "Impair Defenses: Disable Cloud Logs",
            ),
        ),
        (
            "UpdateTrail",
            TechniqueInfo::new(
                "Defense Evasion",
                "T1562.008",
                "Impair Defenses: Disable Cloud Logs",
            ),
        ),
        (
            "PutEventSelectors",
            TechniqueInfo::new(
                "Defense Evasion",
                "T1562.008",
                "Impair Defenses: Disable Cloud Logs",
            ),
        ),
        (
            "DeleteFlowLogs",
            TechniqueInfo::new(
                "Defense Evasion",
                "T1562.008",
                "Impair Defenses: Disable Cloud Logs",
            ),
        ),
        // Credential access
        (
            "GetSecretValue",
            TechniqueInfo::new(
                "Credential Access",
                "T1555",
                "Credentials from Password Stores",
            ),
        ),
        (
            "GetPasswordData",
            TechniqueInfo::new(
                "Credential Access",
                "T1555",
                "Credentials from Password Stores",
            ),
        ),
        // Discovery
        (
            "DescribeInstances",
            TechniqueInfo::new("Discovery", "T1580", "Cloud Infrastructure Discovery"),
        ),
        (
            "ListBuckets",
            TechniqueInfo::new("Discovery", "T1580", "Cloud Infrastructure Discovery"),
        ),
        (
            "ListUsers",
            TechniqueInfo::new("Discovery", "T1087.004", "Account Discovery: Cloud Account"),
        ),
        (
            "ListRoles",
            TechniqueInfo::new("Discovery", "T1087.004", "Account Discovery: Cloud Account"),
        ),
        // Exfiltration
        (
            "GetObject",
            TechniqueInfo::new("Exfiltration", "T1530", "Data from Cloud Storage"),
        ),
        // Impact
        (
            "DeleteBucket",
            TechniqueInfo::new("Impact", "T1485", "Data Destruction"),
        ),
        (
            "TerminateInstances",
            TechniqueInfo::new("Impact", "T1489", "Service Stop"),
        ),
    ]
});

fn technique_for(event_name: &str) -> Option<TechniqueInfo> {
    TECHNIQUE_MAP
        .iter()
        .find(|(name, _)| *name == event_name)
        .map(|(_, t)| t.clone())
}

/// Derive severity; first matching rule wins.
fn classify_severity(
    event_name: &str,
    error_code: Option<&str>,
    principal_type: Option<&str>,
) -> Severity {
    if principal_type == Some("Root") {
        return Severity::Critical;
    }
    if CRITICAL_PATTERNS.iter().any(|re| re.is_match(event_name)) {
        return Severity::Critical;
    }
    if error_code.is_some_and(|code| DENIAL_ERROR_CODES.contains(&code)) {
        return Severity::High;
    }
    if HIGH_SEVERITY_EVENTS.contains(&event_name) {
        return Severity::High;
    }
    if ["List", "Describe", "Get"]
        .iter()
        .any(|p| event_name.starts_with(p))
    {
        return Severity::Low;
    }
    Severity::Info
}

/// Derive the category; first matching rule wins.
fn classify_category(event_name: &str, event_source: &str) -> EventCategory {
    if AUTHENTICATION_EVENTS.contains(&event_name) {
        return EventCategory::Authentication;
    }
    if event_source == "iam.amazonaws.com" {
        return EventCategory::IdentityManagement;
    }
    if event_source == "ec2.amazonaws.com"
        && ["SecurityGroup", "Vpc", "Subnet", "Route", "NetworkAcl"]
            .iter()
            .any(|x| event_name.contains(x))
    {
        return EventCategory::NetworkSecurity;
    }
    if event_source == "s3.amazonaws.com"
        || ["GetObject", "PutObject", "DeleteObject"].contains(&event_name)
    {
        return EventCategory::DataAccess;
    }
    if ["cloudtrail.amazonaws.com", "logs.amazonaws.com"].contains(&event_source) {
        return EventCategory::Logging;
    }
    if ["Create", "Delete", "Modify", "Update", "Terminate"]
        .iter()
        .any(|p| event_name.starts_with(p))
    {
        return EventCategory::ResourceModification;
    }
    if ["List", "Describe", "Get"]
        .iter()
        .any(|p| event_name.starts_with(p))
    {
        return EventCategory::Discovery;
    }
    EventCategory::Other
}

/// Normalize one cloud audit-log record.
pub fn normalize_cloud_audit(raw: &Value) -> Result<CanonicalEvent, NormalizeError> {
    normalize_cloud_audit_with(raw, Utc::now(), new_event_id())
}

/// Normalize one cloud audit-log record with an explicit clock and id.
pub fn normalize_cloud_audit_with(
    raw: &Value,
    now: DateTime<Utc>,
    event_id: String,
) -> Result<CanonicalEvent, NormalizeError> {
    let event_name = raw
        .get("eventName")
        .and_then(Value::as_str)
        .ok_or(NormalizeError::MissingField("eventName"))?;
    let event_source = raw
        .get("eventSource")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let service = event_source.split('.').next().unwrap_or(event_source);

    let event_time = parse_time_or(raw.get("eventTime").and_then(Value::as_str), now);

    let principal_type = str_at(raw, "/userIdentity/type");
    let user_name = str_at(raw, "/userIdentity/userName");
    let identity_arn = str_at(raw, "/userIdentity/arn");
    let is_root = principal_type.as_deref() == Some("Root");

    let actor = raw.get("userIdentity").map(|_| ActorInfo {
        principal_id: str_at(raw, "/userIdentity/principalId"),
        principal_type: principal_type.clone(),
        identity_arn: identity_arn.clone(),
        access_key_id: str_at(raw, "/userIdentity/accessKeyId"),
        user_name: user_name.clone(),
        session_name: str_at(raw, "/userIdentity/sessionContext/sessionIssuer/userName"),
    });

    let source_ip = raw.get("sourceIPAddress").and_then(Value::as_str);
    let user_agent = raw.get("userAgent").and_then(Value::as_str);
    let network = (source_ip.is_some() || user_agent.is_some()).then(|| NetworkInfo {
        source_ip: source_ip.map(str::to_owned),
        user_agent: user_agent.map(str::to_owned),
        ..NetworkInfo::default()
    });

    let cloud_context = CloudContext {
        account: str_at(raw, "/userIdentity/accountId"),
        region: raw.get("awsRegion").and_then(Value::as_str).map(str::to_owned),
        service: Some(service.to_string()),
        resource_id: str_at(raw, "/resources/0/ARN"),
        resource_type: str_at(raw, "/resources/0/type"),
    };

    let error_code = raw.get("errorCode").and_then(Value::as_str);
    let severity = classify_severity(event_name, error_code, principal_type.as_deref());
    let category = classify_category(event_name, event_source);
    let technique = technique_for(event_name);

    let mut title = format!("CloudAudit: {event_name}");
    if let Some(code) = error_code {
        title.push_str(&format!(" ({code})"));
    }

    let mut description = format!("{event_name} event from {event_source}");
    if let Some(user) = &user_name {
        description.push_str(&format!(" by user {user}"));
    } else if let Some(arn) = &identity_arn {
        description.push_str(&format!(" by {arn}"));
    }
    if let Some(code) = error_code {
        let message = raw.get("errorMessage").and_then(Value::as_str).unwrap_or("");
        description.push_str(&format!(". Error: {code} - {message}"));
    }

    let mut tags = Vec::new();
    push_tag(&mut tags, "cloudaudit");
    push_tag(&mut tags, service);
    if let Some(code) = error_code {
        push_tag(&mut tags, "error");
        push_tag(&mut tags, code.to_lowercase());
    }
    if is_root {
        push_tag(&mut tags, "root-account");
    }
    if let Some(technique) = &technique {
        push_tag(&mut tags, format!("mitre-{}", technique.technique_id));
    }

    Ok(CanonicalEvent {
        event_id,
        source: EventSource::CloudAudit,
        source_event_id: raw.get("eventID").and_then(Value::as_str).map(str::to_owned),
        event_time,
        ingested_at: now,
        processed_at: None,
        event_type: event_name.to_string(),
        event_category: category,
        severity,
        status: EventStatus::New,
        title,
        description: Some(description),
        cloud_context: Some(cloud_context),
        actor,
        network,
        technique,
        correlation_id: None,
        related_event_ids: Vec::new(),
        raw: raw.clone(),
        tags,
        metadata: serde_json::Map::new(),
        risk_score: None,
    })
}
