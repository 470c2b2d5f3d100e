use serde::{Deserialize, Serialize};

use crate::event::Scope;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Active,
    Superseded,
}

impl DecisionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Superseded => "superseded",
        }
    }
}

impl std::str::FromStr for DecisionStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "active" => Ok(Self::Active),
            "superseded" => Ok(Self::Superseded),
            other => Err(format!("unknown decision status: {other}")),
        }
    }
}

/// A recorded decision. Supersession is represented by the successor
/// listing the predecessor in `refs` and flipping the predecessor's
/// `status` to `superseded`, atomically, in the same transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub decision_id: String,
    pub tenant_id: String,
    pub ts: i64,
    pub status: DecisionStatus,
    pub scope: Scope,
    pub decision: String,
    #[serde(default)]
    pub rationale: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub alternatives: Vec<String>,
    #[serde(default)]
    pub consequences: Vec<String>,
    #[serde(default)]
    pub refs: Vec<String>,
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
    pub project_id: Option<String>,
}

/// Caller-supplied fields for `create_decision`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionInput {
    pub scope: Scope,
    pub decision: String,
    #[serde(default)]
    pub rationale: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub alternatives: Vec<String>,
    #[serde(default)]
    pub consequences: Vec<String>,
    #[serde(default)]
    pub refs: Vec<String>,
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
    pub project_id: Option<String>,
}

/// The read-time projection of a base `Decision` with its latest approved
/// `MemoryEdit`s applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EffectiveDecision {
    pub decision: Decision,
    pub is_quarantined: bool,
}
