use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
}

impl AuditOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Append-only record of every authenticated mutation attempt, success or
/// failure. Never read on the hot path; used by C7/C8 for traceability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditLogEntry {
    pub audit_id: String,
    pub tenant_id: String,
    pub actor_id: String,
    pub op: String,
    pub target: String,
    pub outcome: AuditOutcome,
    pub ts: i64,
    pub ip: Option<String>,
    pub metadata: Value,
}
