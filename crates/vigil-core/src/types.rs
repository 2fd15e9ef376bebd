//! Shared data model: check-in log rows and gating decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome recorded for a completed check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatingResult {
    Text,
    Call,
    Skip,
}

impl GatingResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatingResult::Text => "text",
            GatingResult::Call => "call",
            GatingResult::Skip => "skip",
        }
    }

    /// Parse the stored string form. Unknown values read back as `Skip`.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "text" => GatingResult::Text,
            "call" => GatingResult::Call,
            _ => GatingResult::Skip,
        }
    }
}

impl std::fmt::Display for GatingResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the check-in log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckInLog {
    /// Row id assigned by the repository (None before it is saved).
    #[serde(default)]
    pub id: Option<i64>,
    pub user_id: String,
    /// Fingerprint of the raw collected payload.
    pub data_hash: String,
    /// Collectors that contributed data.
    pub sources: Vec<String>,
    pub gating_result: GatingResult,
    pub skip_reason: Option<String>,
    /// 1–10, when the oracle produced one.
    pub urgency: Option<u8>,
    pub message_sent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CheckInLog {
    /// A skip row with the given reason.
    pub fn skip(
        user_id: &str,
        data_hash: &str,
        sources: Vec<String>,
        reason: &str,
        urgency: Option<u8>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            user_id: user_id.to_string(),
            data_hash: data_hash.to_string(),
            sources,
            gating_result: GatingResult::Skip,
            skip_reason: Some(reason.to_string()),
            urgency,
            message_sent: None,
            created_at,
        }
    }

    pub fn is_sent(&self) -> bool {
        self.gating_result != GatingResult::Skip
    }
}

/// What the gating oracle wants done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatingAction {
    Skip,
    Text,
    Call,
}

/// Structured decision returned by a [`GatingOracle`](crate::traits::GatingOracle).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatingDecision {
    pub action: GatingAction,
    /// 1–10.
    pub urgency: u8,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl GatingDecision {
    pub fn skip(reason: impl Into<String>) -> Self {
        Self {
            action: GatingAction::Skip,
            urgency: 1,
            reason: Some(reason.into()),
            message: None,
        }
    }

    pub fn text(urgency: u8, message: impl Into<String>) -> Self {
        Self {
            action: GatingAction::Text,
            urgency,
            reason: None,
            message: Some(message.into()),
        }
    }

    pub fn call(urgency: u8, message: impl Into<String>) -> Self {
        Self {
            action: GatingAction::Call,
            urgency,
            reason: None,
            message: Some(message.into()),
        }
    }
}

/// Everything the oracle gets to see for one decision.
#[derive(Debug, Clone, Serialize)]
pub struct GatingRequest {
    /// Collected data after reminder suppression, keyed by collector name.
    pub data: serde_json::Value,
    /// Up to three most recent log rows, newest first.
    pub recent_logs: Vec<CheckInLog>,
    pub language: String,
    pub timezone: String,
    /// Whether a phone call is possible at all.
    pub can_call: bool,
}

/// Result of placing an escalation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallOutcome {
    pub call_id: String,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gating_result_roundtrip_str() {
        for r in [GatingResult::Text, GatingResult::Call, GatingResult::Skip] {
            assert_eq!(GatingResult::from_str_lossy(r.as_str()), r);
        }
        assert_eq!(GatingResult::from_str_lossy("bogus"), GatingResult::Skip);
    }

    #[test]
    fn test_decision_deserialize() {
        let d: GatingDecision =
            serde_json::from_str(r#"{"action":"call","urgency":9,"message":"Wake up"}"#).unwrap();
        assert_eq!(d.action, GatingAction::Call);
        assert_eq!(d.urgency, 9);
        assert_eq!(d.message.as_deref(), Some("Wake up"));
        assert!(d.reason.is_none());
    }

    #[test]
    fn test_skip_log_is_not_sent() {
        let log = CheckInLog::skip("u1", "abc", vec![], "Data unchanged", None, Utc::now());
        assert!(!log.is_sent());
        assert_eq!(log.skip_reason.as_deref(), Some("Data unchanged"));
    }
}
