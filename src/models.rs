//! Shared wire types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single URL probe.
///
/// On a transport failure `status` is 0 and `error` holds the failure text.
/// A non-200 response keeps its status code and records `HTTP <code>` in
/// `error`; consumers treat an empty `error` as success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlResult {
    pub url: String,
    #[serde(default)]
    pub status: u16,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    pub duration_ms: u64,
    pub checked_at: DateTime<Utc>,
    pub worker_id: String,
}

impl UrlResult {
    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }
}

/// Fleet-wide queue statistics, as served by `GET /stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub queue_length: i64,
    pub success: i64,
    pub error: i64,
    pub processing: i64,
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(status: u16, error: &str) -> UrlResult {
        UrlResult {
            url: "https://example.com".to_owned(),
            status,
            error: error.to_owned(),
            duration_ms: 150,
            checked_at: Utc.with_ymd_and_hms(2026, 8, 2, 12, 0, 0).unwrap(),
            worker_id: "worker-1".to_owned(),
        }
    }

    #[test]
    fn success_omits_error_field() {
        let json = serde_json::to_value(sample(200, "")).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("error"));
        assert_eq!(obj["url"], "https://example.com");
        assert_eq!(obj["status"], 200);
        assert_eq!(obj["duration_ms"], 150);
        assert_eq!(obj["worker_id"], "worker-1");
    }

    #[test]
    fn checked_at_serializes_as_rfc3339() {
        let json = serde_json::to_value(sample(200, "")).unwrap();
        let checked_at = json["checked_at"].as_str().unwrap();
        assert!(checked_at.starts_with("2026-08-02T12:00:00"));
        assert!(checked_at.ends_with('Z') || checked_at.contains('+'));
    }

    #[test]
    fn failure_round_trips() {
        let original = sample(0, "connection refused");
        let json = serde_json::to_string(&original).unwrap();
        let parsed: UrlResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, original);
        assert!(!parsed.is_success());
    }

    #[test]
    fn missing_error_deserializes_as_empty() {
        let parsed: UrlResult = serde_json::from_str(
            r#"{"url":"https://a","status":200,"duration_ms":5,"checked_at":"2026-08-02T12:00:00Z","worker_id":"w"}"#,
        )
        .unwrap();
        assert!(parsed.error.is_empty());
        assert!(parsed.is_success());
    }
}
