use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CapsuleStatus {
    Active,
    Revoked,
    Expired,
}

impl CapsuleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
        }
    }
}

impl std::str::FromStr for CapsuleStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "active" => Ok(Self::Active),
            "revoked" => Ok(Self::Revoked),
            "expired" => Ok(Self::Expired),
            other => Err(format!("unknown capsule status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CapsuleItems {
    #[serde(default)]
    pub chunks: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<String>,
    #[serde(default)]
    pub artifacts: Vec<String>,
}

impl CapsuleItems {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty() && self.decisions.is_empty() && self.artifacts.is_empty()
    }
}

/// A curated, audience-scoped, TTL-bounded bundle of chunks/decisions/
/// artifacts for a subject. Non-audience requesters must see `NotFound`,
/// never `PermissionDenied` — existence is not observable outside the
/// audience.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Capsule {
    pub capsule_id: String,
    pub tenant_id: String,
    pub ts: i64,
    pub scope: crate::event::Scope,
    pub subject_type: String,
    pub subject_id: String,
    pub project_id: Option<String>,
    pub author_agent_id: String,
    pub audience_agent_ids: Vec<String>,
    pub items: CapsuleItems,
    #[serde(default)]
    pub risks: Vec<String>,
    pub ttl_days: u32,
    pub status: CapsuleStatus,
    pub expires_at: i64,
}

impl Capsule {
    pub fn is_visible_to(&self, requester_agent_id: &str, now_ts: i64) -> bool {
        self.status == CapsuleStatus::Active
            && self.expires_at > now_ts
            && self
                .audience_agent_ids
                .iter()
                .any(|id| id == requester_agent_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapsuleInput {
    pub scope: crate::event::Scope,
    pub subject_type: String,
    pub subject_id: String,
    pub project_id: Option<String>,
    pub author_agent_id: String,
    pub audience_agent_ids: Vec<String>,
    pub items: CapsuleItems,
    #[serde(default)]
    pub risks: Vec<String>,
    pub ttl_days: u32,
}
