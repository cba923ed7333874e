use serde::{Serialize, Deserialize, Deserializer};
use chrono::{DateTime, Utc};

use crate::error::ValidationError;

/// Where a stored report came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportSource {
    /// Submitted by an on-host agent.
    #[default]
    Push,
    /// Collected by this process over a remote session.
    Pull,
}

impl std::fmt::Display for ReportSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportSource::Push => write!(f, "push"),
            ReportSource::Pull => write!(f, "pull"),
        }
    }
}

/// One currently banned address within a jail.
///
/// A known `banned_at` always comes with a remaining time. An agent may send
/// a remaining time without `banned_at`. A known remaining time of zero is
/// serialized as `0`, an unknown one as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BanEntry {
    #[serde(rename = "ip", alias = "address")]
    pub address: String,
    #[serde(default)]
    pub remaining_seconds: Option<u64>,
    #[serde(default, deserialize_with = "flexible_time::deserialize")]
    pub banned_at: Option<DateTime<Utc>>,
}

impl BanEntry {
    pub fn unknown(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            remaining_seconds: None,
            banned_at: None,
        }
    }
}

/// One jail on one host at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JailStatus {
    #[serde(rename = "jail", alias = "name")]
    pub name: String,
    #[serde(rename = "bantime_seconds", default, deserialize_with = "non_negative")]
    pub ban_time_seconds: u64,
    #[serde(rename = "banned", default)]
    pub banned_addresses: Vec<BanEntry>,
}

impl JailStatus {
    /// A jail whose per-jail queries failed.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ban_time_seconds: 0,
            banned_addresses: Vec::new(),
        }
    }
}

/// A single ban line recovered from the fail2ban log. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct BanEvent {
    pub jail: String,
    pub address: String,
    pub timestamp: DateTime<Utc>,
}

/// Full status snapshot of one host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostReport {
    pub host: String,
    #[serde(rename = "name", default)]
    pub display_name: String,
    #[serde(default)]
    pub jails: Vec<JailStatus>,
    #[serde(
        default,
        deserialize_with = "flexible_time::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub collected_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "flexible_time::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub received_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub source: ReportSource,
    /// Raw log lines an agent may attach; consumed on ingestion.
    #[serde(default, skip_serializing)]
    pub log_tail: Option<String>,
}

impl HostReport {
    pub fn new(host: impl Into<String>, display_name: Option<&str>, source: ReportSource) -> Self {
        let host = host.into();
        let display_name = display_name
            .filter(|name| !name.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| host.clone());

        Self {
            host,
            display_name,
            jails: Vec::new(),
            collected_at: None,
            received_at: None,
            error: None,
            source,
            log_tail: None,
        }
    }

    /// A pulled report for a host whose collection failed outright.
    pub fn failed(host: impl Into<String>, display_name: Option<&str>, error: impl Into<String>) -> Self {
        let mut report = Self::new(host, display_name, ReportSource::Pull);
        report.error = Some(error.into());
        report.collected_at = Some(Utc::now());
        report
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn banned_count(&self) -> usize {
        self.jails.iter().map(|j| j.banned_addresses.len()).sum()
    }

    /// Validates and converts a raw push submission.
    pub fn from_submission(payload: serde_json::Value) -> Result<Self, ValidationError> {
        let host_present = payload
            .get("host")
            .and_then(|h| h.as_str())
            .map(|h| !h.trim().is_empty())
            .unwrap_or(false);
        if !host_present {
            return Err(ValidationError::MissingField("host"));
        }

        let mut report: HostReport = serde_json::from_value(payload)
            .map_err(|source| ValidationError::Malformed { what: "report", source })?;
        report.source = ReportSource::Push;
        report.normalize();
        Ok(report)
    }

    /// Applies the report invariants: display name falls back to host,
    /// unnamed jails are dropped and a repeated jail name keeps the last
    /// definition at the position of the first.
    pub fn normalize(&mut self) {
        self.host = self.host.trim().to_string();
        if self.display_name.trim().is_empty() {
            self.display_name = self.host.clone();
        }

        let mut jails: Vec<JailStatus> = Vec::with_capacity(self.jails.len());
        for jail in self.jails.drain(..) {
            if jail.name.trim().is_empty() {
                continue;
            }
            match jails.iter_mut().find(|existing| existing.name == jail.name) {
                Some(existing) => *existing = jail,
                None => jails.push(jail),
            }
        }
        self.jails = jails;

        if self.error.is_some() {
            self.jails.clear();
        }
    }
}

fn non_negative<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value.filter(|v| v.is_finite() && *v > 0.0).map(|v| v as u64).unwrap_or(0))
}

/// Timestamps arrive either as RFC 3339 text or as Unix epoch seconds.
mod flexible_time {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTime {
        Epoch(f64),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<RawTime>::deserialize(deserializer)? {
            None => Ok(None),
            Some(RawTime::Epoch(secs)) => Ok(from_epoch(secs)),
            Some(RawTime::Text(text)) => DateTime::parse_from_rfc3339(&text)
                .map(|t| Some(t.with_timezone(&Utc)))
                .map_err(serde::de::Error::custom),
        }
    }

    fn from_epoch(secs: f64) -> Option<DateTime<Utc>> {
        if !secs.is_finite() {
            return None;
        }
        let whole = secs.floor();
        let nanos = ((secs - whole) * 1_000_000_000.0) as u32;
        DateTime::from_timestamp(whole as i64, nanos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_submission_requires_host() {
        let err = HostReport::from_submission(json!({"name": "web"})).unwrap_err();
        assert!(matches!(err, ValidationError::MissingField("host")));

        let err = HostReport::from_submission(json!({"host": "  "})).unwrap_err();
        assert!(matches!(err, ValidationError::MissingField("host")));
    }

    #[test]
    fn test_submission_agent_shape() {
        let report = HostReport::from_submission(json!({
            "host": "web-1",
            "jails": [
                {"jail": "sshd", "bantime_seconds": 600, "banned": [{"ip": "1.2.3.4"}]}
            ],
            "log_tail": "",
            "collected_at": 1700000000.5
        }))
        .unwrap();

        assert_eq!(report.display_name, "web-1");
        assert_eq!(report.source, ReportSource::Push);
        assert_eq!(report.jails[0].name, "sshd");
        assert_eq!(report.jails[0].ban_time_seconds, 600);
        assert_eq!(report.jails[0].banned_addresses[0], BanEntry::unknown("1.2.3.4"));
        assert_eq!(report.collected_at.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_negative_bantime_clamped() {
        let report = HostReport::from_submission(json!({
            "host": "web-1",
            "jails": [{"jail": "recidive", "bantime_seconds": -1}]
        }))
        .unwrap();
        assert_eq!(report.jails[0].ban_time_seconds, 0);
    }

    #[test]
    fn test_normalize_last_duplicate_wins() {
        let mut report = HostReport::new("h", None, ReportSource::Pull);
        report.jails = vec![
            JailStatus { name: "sshd".into(), ban_time_seconds: 10, banned_addresses: vec![] },
            JailStatus::empty("nginx"),
            JailStatus::empty(""),
            JailStatus { name: "sshd".into(), ban_time_seconds: 20, banned_addresses: vec![] },
        ];
        report.normalize();

        let names: Vec<_> = report.jails.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["sshd", "nginx"]);
        assert_eq!(report.jails[0].ban_time_seconds, 20);
    }

    #[test]
    fn test_unknown_and_zero_remaining_serialize_differently() {
        let unknown = serde_json::to_value(BanEntry::unknown("1.1.1.1")).unwrap();
        assert!(unknown["remaining_seconds"].is_null());

        let expired = BanEntry {
            address: "1.1.1.1".into(),
            remaining_seconds: Some(0),
            banned_at: Some(Utc::now()),
        };
        let expired = serde_json::to_value(expired).unwrap();
        assert_eq!(expired["remaining_seconds"], json!(0));
    }

    #[test]
    fn test_failed_report_has_no_jails() {
        let report = HostReport::failed("db-1", Some("Database"), "connection refused");
        assert!(report.is_error());
        assert!(report.jails.is_empty());
        assert_eq!(report.display_name, "Database");
        assert_eq!(report.source, ReportSource::Pull);
    }
}
