//! Normalizer for threat-detector findings.
//!
//! Findings arrive pre-analyzed with a numeric severity on a 0-10 scale and
//! a colon-delimited type string whose prefix names the threat family.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde_json::Value;

use aegis_types::{
    new_event_id, push_tag, ActorInfo, CanonicalEvent, CloudContext, EventCategory, EventSource,
    EventStatus, NetworkInfo, Severity, TechniqueInfo,
};

use crate::{parse_time_or, port_at, str_at, NormalizeError};

/// Adversary-technique assignments keyed by full finding type.
///
/// Kept as an ordered list so the prefix-fallback lookup is deterministic.
static TECHNIQUE_MAP: Lazy<Vec<(&'static str, TechniqueInfo)>> = Lazy::new(|| {
    vec![
        // Reconnaissance
        (
            "Recon:EC2/PortProbeUnprotectedPort",
            TechniqueInfo::new(
                "Reconnaissance",
                "T1595.001",
                "Active Scanning: Scanning IP Blocks",
            ),
        ),
        (
            "Recon:EC2/Portscan",
            TechniqueInfo::new(
                "Reconnaissance",
                "T1595.001",
                "Active Scanning: Scanning IP Blocks",
            ),
        ),
        // Initial access
        (
            "UnauthorizedAccess:EC2/SSHBruteForce",
            TechniqueInfo::new(
                "Initial Access",
                "T1110.001",
                "Brute Force: Password Guessing",
            ),
        ),
        (
            "UnauthorizedAccess:EC2/RDPBruteForce",
            TechniqueInfo::new(
                "Initial Access",
                "T1110.001",
                "Brute Force: Password Guessing",
            ),
        ),
        (
            "UnauthorizedAccess:IAMUser/ConsoleLoginSuccess.B",
            TechniqueInfo::new(
                "Initial Access",
                "T1078.004",
                "Valid Accounts: Cloud Accounts",
            ),
        ),
        // Execution
        (
            "Execution:EC2/SuspiciousFile",
            TechniqueInfo::new("Execution", "T1204", "User Execution"),
        ),
        // Persistence
        (
            "Persistence:IAMUser/UserPermissions",
            TechniqueInfo::new("Persistence", "T1098", "Account Manipulation"),
        ),
        // Privilege escalation
        (
            "PrivilegeEscalation:IAMUser/AdministrativePermissions",
            TechniqueInfo::new("Privilege Escalation", "T1098", "Account Manipulation"),
        ),
        // Defense evasion
        (
            "Stealth:IAMUser/CloudTrailLoggingDisabled",
            TechniqueInfo::new(
                "Defense Evasion",
                "T1562.008",
                "Impair Defenses: Disable Cloud Logs",
            ),
        ),
        (
            "DefenseEvasion:EC2/UnusualDNSResolver",
            TechniqueInfo::new("Defense Evasion", "T1568", "Dynamic Resolution"),
        ),
        // Credential access
        (
            "CredentialAccess:IAMUser/AnomalousBehavior",
            TechniqueInfo::new(
                "Credential Access",
                "T1528",
                "Steal Application Access Token",
            ),
        ),
        // Discovery
        (
            "Discovery:IAMUser/AnomalousBehavior",
            TechniqueInfo::new("Discovery", "T1087.004", "Account Discovery: Cloud Account"),
        ),
        // Exfiltration
        (
            "Exfiltration:S3/ObjectRead.Unusual",
            TechniqueInfo::new("Exfiltration", "T1530", "Data from Cloud Storage"),
        ),
        (
            "Exfiltration:S3/MaliciousIPCaller",
            TechniqueInfo::new("Exfiltration", "T1530", "Data from Cloud Storage"),
        ),
        // Impact
        (
            "Impact:EC2/WinRMBruteForce",
            TechniqueInfo::new("Impact", "T1110", "Brute Force"),
        ),
        (
            "Impact:S3/MaliciousIPCaller",
            TechniqueInfo::new("Impact", "T1485", "Data Destruction"),
        ),
        // Resource hijacking
        (
            "CryptoCurrency:EC2/BitcoinTool.B",
            TechniqueInfo::new("Impact", "T1496", "Resource Hijacking"),
        ),
        (
            "CryptoCurrency:EC2/BitcoinTool.B!DNS",
            TechniqueInfo::new("Impact", "T1496", "Resource Hijacking"),
        ),
        // Command and control
        (
            "Trojan:EC2/BlackholeTraffic",
            TechniqueInfo::new("Command and Control", "T1071", "Application Layer Protocol"),
        ),
        (
            "Trojan:EC2/DropPoint",
            TechniqueInfo::new("Command and Control", "T1071", "Application Layer Protocol"),
        ),
        // Denial of service
        (
            "Backdoor:EC2/DenialOfService.Tcp",
            TechniqueInfo::new("Impact", "T1498", "Network Denial of Service"),
        ),
        (
            "Backdoor:EC2/DenialOfService.Udp",
            TechniqueInfo::new("Impact", "T1498", "Network Denial of Service"),
        ),
    ]
});

/// Map the detector's 0-10 numeric severity onto the canonical levels.
fn classify_severity(score: f64) -> Severity {
    if score >= 8.0 {
        Severity::Critical
    } else if score >= 6.0 {
        Severity::High
    } else if score >= 4.0 {
        Severity::Medium
    } else if score >= 2.0 {
        Severity::Low
    } else {
        Severity::Info
    }
}

/// Categorize a finding by its type prefix.
fn classify_category(finding_type: &str) -> EventCategory {
    let prefix = finding_type
        .split_once(':')
        .map(|(p, _)| p)
        .unwrap_or(finding_type);
    match prefix {
        "Recon" => EventCategory::Reconnaissance,
        "UnauthorizedAccess" => EventCategory::UnauthorizedAccess,
        "Execution" => EventCategory::Execution,
        "Persistence" => EventCategory::Persistence,
        "PrivilegeEscalation" => EventCategory::PrivilegeEscalation,
        "DefenseEvasion" | "Stealth" => EventCategory::DefenseEvasion,
        "CredentialAccess" => EventCategory::CredentialAccess,
        "Discovery" => EventCategory::Discovery,
        "Exfiltration" => EventCategory::Exfiltration,
        "Impact" => EventCategory::Impact,
        "CryptoCurrency" => EventCategory::Cryptomining,
        "Trojan" | "Backdoor" => EventCategory::Malware,
        "Behavior" => EventCategory::Anomaly,
        "PenTest" => EventCategory::Pentest,
        "Policy" => EventCategory::PolicyViolation,
        _ => EventCategory::Other,
    }
}

/// Exact-type lookup with a family-prefix fallback.
fn technique_for(finding_type: &str) -> Option<TechniqueInfo> {
    if let Some((_, technique)) = TECHNIQUE_MAP.iter().find(|(t, _)| *t == finding_type) {
        return Some(technique.clone());
    }
    TECHNIQUE_MAP
        .iter()
        .find(|(t, _)| {
            let prefix = t.split_once(':').map(|(p, _)| p).unwrap_or(t);
            finding_type
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with(':'))
        })
        .map(|(_, technique)| technique.clone())
}

/// Extract network observations, preferring the connection action.
fn extract_network(raw: &Value) -> Option<NetworkInfo> {
    if raw
        .pointer("/Service/Action/NetworkConnectionAction")
        .is_some()
    {
        return Some(NetworkInfo {
            source_ip: str_at(
                raw,
                "/Service/Action/NetworkConnectionAction/RemoteIpDetails/IpAddressV4",
            ),
            source_port: port_at(
                raw,
                "/Service/Action/NetworkConnectionAction/RemotePortDetails/Port",
            ),
            destination_ip: None,
            destination_port: port_at(
                raw,
                "/Service/Action/NetworkConnectionAction/LocalPortDetails/Port",
            ),
            protocol: str_at(raw, "/Service/Action/NetworkConnectionAction/Protocol"),
            user_agent: None,
        });
    }
    if raw.pointer("/Service/Action/AwsApiCallAction").is_some() {
        return Some(NetworkInfo {
            source_ip: str_at(
                raw,
                "/Service/Action/AwsApiCallAction/RemoteIpDetails/IpAddressV4",
            ),
            user_agent: str_at(raw, "/Service/Action/AwsApiCallAction/UserAgent"),
            ..NetworkInfo::default()
        });
    }
    None
}

/// Normalize one threat-detector finding.
pub fn normalize_threat_detector(raw: &Value) -> Result<CanonicalEvent, NormalizeError> {
    normalize_threat_detector_with(raw, Utc::now(), new_event_id())
}

/// Normalize one threat-detector finding with an explicit clock and id.
pub fn normalize_threat_detector_with(
    raw: &Value,
    now: DateTime<Utc>,
    event_id: String,
) -> Result<CanonicalEvent, NormalizeError> {
    let finding_type = raw
        .get("Type")
        .and_then(Value::as_str)
        .ok_or(NormalizeError::MissingField("Type"))?;

    let score = raw.get("Severity").and_then(Value::as_f64).unwrap_or(0.0);
    let severity = classify_severity(score);
    let category = classify_category(finding_type);
    let technique = technique_for(finding_type);

    let event_time = parse_time_or(raw.get("CreatedAt").and_then(Value::as_str), now);

    let resource_type = str_at(raw, "/Resource/ResourceType");
    let cloud_context = CloudContext {
        account: raw.get("AccountId").and_then(Value::as_str).map(str::to_owned),
        region: raw.get("Region").and_then(Value::as_str).map(str::to_owned),
        service: None,
        resource_id: str_at(raw, "/Resource/InstanceDetails/InstanceId")
            .or_else(|| str_at(raw, "/Resource/S3BucketDetails/0/Arn")),
        resource_type: resource_type.clone(),
    };

    let actor = raw.pointer("/Resource/AccessKeyDetails").map(|_| ActorInfo {
        principal_id: str_at(raw, "/Resource/AccessKeyDetails/PrincipalId"),
        principal_type: str_at(raw, "/Resource/AccessKeyDetails/UserType"),
        identity_arn: None,
        access_key_id: str_at(raw, "/Resource/AccessKeyDetails/AccessKeyId"),
        user_name: str_at(raw, "/Resource/AccessKeyDetails/UserName"),
        session_name: None,
    });

    let network = extract_network(raw);

    let title = raw
        .get("Title")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_else(|| format!("ThreatDetector: {finding_type}"));
    let description = raw
        .get("Description")
        .and_then(Value::as_str)
        .map(str::to_owned);

    let mut tags = Vec::new();
    push_tag(&mut tags, "threatdetector");
    push_tag(&mut tags, category.as_str());
    if matches!(severity, Severity::Critical | Severity::High) {
        push_tag(&mut tags, "high-priority");
    }
    if let Some(technique) = &technique {
        push_tag(&mut tags, format!("mitre-{}", technique.technique_id));
    }
    if let Some(resource_type) = &resource_type {
        push_tag(&mut tags, resource_type.to_lowercase());
    }

    let mut metadata = serde_json::Map::new();
    metadata.insert(
        "detector_severity".into(),
        raw.get("Severity").cloned().unwrap_or_else(|| 0.0.into()),
    );
    if let Some(updated_at) = raw.get("UpdatedAt") {
        metadata.insert("updated_at".into(), updated_at.clone());
    }
    metadata.insert(
        "count".into(),
        raw.pointer("/Service/Count").cloned().unwrap_or_else(|| 1.into()),
    );

    Ok(CanonicalEvent {
        event_id,
        source: EventSource::ThreatDetector,
        source_event_id: raw.get("Id").and_then(Value::as_str).map(str::to_owned),
        event_time,
        ingested_at: now,
        processed_at: None,
        event_type: finding_type.to_string(),
        event_category: category,
        severity,
        status: EventStatus::New,
        title,
        description,
        cloud_context: Some(cloud_context),
        actor,
        network,
        technique,
        correlation_id: None,
        related_event_ids: Vec::new(),
        raw: raw.clone(),
        tags,
        metadata,
        risk_score: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn finding(finding_type: &str, score: f64) -> Value {
        json!({
            "Type": finding_type,
            "Id": "finding-1",
            "AccountId": "111122223333",
            "Region": "eu-west-1",
            "CreatedAt": "2026-03-01T08:00:00Z",
            "UpdatedAt": "2026-03-01T08:05:00Z",
            "Severity": score,
            "Title": "Suspicious activity",
            "Description": "Something odd happened",
            "Resource": {
                "ResourceType": "Instance",
                "InstanceDetails": {"InstanceId": "i-0abc123"}
            },
            "Service": {"Count": 3}
        })
    }

    #[test]
    fn cryptomining_finding_maps_fully() {
        let event =
            normalize_threat_detector(&finding("CryptoCurrency:EC2/BitcoinTool.B", 8.0)).unwrap();
        assert_eq!(event.severity, Severity::Critical);
        assert_eq!(event.event_category, EventCategory::Cryptomining);
        assert_eq!(event.technique.as_ref().unwrap().technique_id, "T1496");
        for tag in ["threatdetector", "cryptomining", "high-priority", "mitre-T1496"] {
            assert!(event.has_tag(tag), "missing tag {tag}");
        }
        assert!(event.has_tag("instance"));
    }

    #[test]
    fn numeric_severity_thresholds() {
        let cases = [
            (9.5, Severity::Critical),
            (8.0, Severity::Critical),
            (7.9, Severity::High),
            (6.0, Severity::High),
            (4.0, Severity::Medium),
            (2.0, Severity::Low),
            (1.9, Severity::Info),
            (0.0, Severity::Info),
        ];
        for (score, expected) in cases {
            let event = normalize_threat_detector(&finding("Recon:EC2/Portscan", score)).unwrap();
            assert_eq!(event.severity, expected, "score {score}");
        }
    }

    #[test]
    fn technique_falls_back_to_family_prefix() {
        let event =
            normalize_threat_detector(&finding("Recon:EC2/SomeBrandNewVariant", 3.0)).unwrap();
        assert_eq!(event.technique.as_ref().unwrap().technique_id, "T1595.001");

        let none = normalize_threat_detector(&finding("Wormhole:EC2/Novel", 3.0)).unwrap();
        assert!(none.technique.is_none());
        assert_eq!(none.event_category, EventCategory::Other);
    }

    #[test]
    fn category_table_covers_aliases() {
        let cases = [
            ("Stealth:IAMUser/X", EventCategory::DefenseEvasion),
            ("Trojan:EC2/X", EventCategory::Malware),
            ("Backdoor:EC2/X", EventCategory::Malware),
            ("Behavior:EC2/X", EventCategory::Anomaly),
            ("PenTest:IAMUser/X", EventCategory::Pentest),
            ("Policy:IAMUser/X", EventCategory::PolicyViolation),
        ];
        for (finding_type, expected) in cases {
            let event = normalize_threat_detector(&finding(finding_type, 5.0)).unwrap();
            assert_eq!(event.event_category, expected, "{finding_type}");
        }
    }

    #[test]
    fn network_prefers_connection_action() {
        let mut raw = finding("UnauthorizedAccess:EC2/SSHBruteForce", 6.5);
        raw["Service"]["Action"] = json!({
            "NetworkConnectionAction": {
                "RemoteIpDetails": {"IpAddressV4": "203.0.113.200"},
                "RemotePortDetails": {"Port": 54321},
                "LocalPortDetails": {"Port": 22},
                "Protocol": "TCP"
            },
            "AwsApiCallAction": {
                "RemoteIpDetails": {"IpAddressV4": "198.51.100.99"},
                "UserAgent": "ignored"
            }
        });

        let network = normalize_threat_detector(&raw).unwrap().network.unwrap();
        assert_eq!(network.source_ip.as_deref(), Some("203.0.113.200"));
        assert_eq!(network.source_port, Some(54321));
        assert_eq!(network.destination_port, Some(22));
        assert_eq!(network.protocol.as_deref(), Some("TCP"));
        assert!(network.user_agent.is_none());
    }

    #[test]
    fn network_uses_api_call_action_when_alone() {
        let mut raw = finding("Discovery:IAMUser/AnomalousBehavior", 5.0);
        raw["Service"]["Action"] = json!({
            "AwsApiCallAction": {
                "RemoteIpDetails": {"IpAddressV4": "198.51.100.99"},
                "UserAgent": "aws-sdk-go/1.44"
            }
        });

        let network = normalize_threat_detector(&raw).unwrap().network.unwrap();
        assert_eq!(network.source_ip.as_deref(), Some("198.51.100.99"));
        assert_eq!(network.user_agent.as_deref(), Some("aws-sdk-go/1.44"));
    }

    #[test]
    fn metadata_captures_detector_fields() {
        let event = normalize_threat_detector(&finding("Recon:EC2/Portscan", 4.5)).unwrap();
        assert_eq!(event.metadata["detector_severity"], json!(4.5));
        assert_eq!(event.metadata["updated_at"], json!("2026-03-01T08:05:00Z"));
        assert_eq!(event.metadata["count"], json!(3));
    }

    #[test]
    fn access_key_details_become_the_actor() {
        let mut raw = finding("CredentialAccess:IAMUser/AnomalousBehavior", 7.0);
        raw["Resource"]["AccessKeyDetails"] = json!({
            "PrincipalId": "AIDAEXAMPLE",
            "UserType": "IAMUser",
            "AccessKeyId": "AKIAEXAMPLE",
            "UserName": "mallory"
        });

        let actor = normalize_threat_detector(&raw).unwrap().actor.unwrap();
        assert_eq!(actor.user_name.as_deref(), Some("mallory"));
        assert_eq!(actor.access_key_id.as_deref(), Some("AKIAEXAMPLE"));
    }

    #[test]
    fn missing_type_is_rejected() {
        let err = normalize_threat_detector(&json!({"Severity": 5.0})).unwrap_err();
        assert!(matches!(err, NormalizeError::MissingField("Type")));
    }

    #[test]
    fn raw_finding_is_preserved() {
        let raw = finding("Recon:EC2/Portscan", 2.5);
        let event = normalize_threat_detector(&raw).unwrap();
        assert_eq!(event.raw, raw);
        assert_eq!(event.source_event_id.as_deref(), Some("finding-1"));
    }
}
