use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Chunk,
    Decision,
    Capsule,
}

impl TargetType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chunk => "chunk",
            Self::Decision => "decision",
            Self::Capsule => "capsule",
        }
    }
}

impl std::str::FromStr for TargetType {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "chunk" => Ok(Self::Chunk),
            "decision" => Ok(Self::Decision),
            "capsule" => Ok(Self::Capsule),
            other => Err(format!("unknown memory edit target type: {other}")),
        }
    }
}

/// Precedence order when several approved edits apply to one target:
/// `retract > block > quarantine > latest amend > summed attenuate`. Lower
/// numeric value wins (sorts first).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EditOp {
    Retract,
    Block,
    Quarantine,
    Amend,
    Attenuate,
}

impl EditOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Retract => "retract",
            Self::Block => "block",
            Self::Quarantine => "quarantine",
            Self::Amend => "amend",
            Self::Attenuate => "attenuate",
        }
    }

    /// Lower value applies first in the effective-view precedence table.
    pub fn precedence_rank(self) -> u8 {
        match self {
            Self::Retract => 0,
            Self::Block => 1,
            Self::Quarantine => 2,
            Self::Amend => 3,
            Self::Attenuate => 4,
        }
    }
}

impl std::str::FromStr for EditOp {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "retract" => Ok(Self::Retract),
            "block" => Ok(Self::Block),
            "quarantine" => Ok(Self::Quarantine),
            "amend" => Ok(Self::Amend),
            "attenuate" => Ok(Self::Attenuate),
            other => Err(format!("unknown memory edit op: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EditStatus {
    Pending,
    Approved,
    Rejected,
}

impl EditStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for EditStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown memory edit status: {other}")),
        }
    }
}

/// Op-dependent structured payload. Only the fields relevant to `op` are
/// read; the others are ignored by the Effective View.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EditPatch {
    pub text: Option<String>,
    pub importance: Option<f64>,
    pub importance_delta: Option<f64>,
    pub channel: Option<String>,
}

/// An append-only directive that changes how a chunk/decision/capsule is
/// surfaced at read time. Rows are never deleted or mutated once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryEdit {
    pub edit_id: String,
    pub tenant_id: String,
    pub ts: i64,
    pub target_type: TargetType,
    pub target_id: String,
    pub op: EditOp,
    pub reason: String,
    pub proposed_by: String,
    pub approved_by: Option<String>,
    pub status: EditStatus,
    pub patch: EditPatch,
    pub applied_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryEditInput {
    pub target_type: TargetType,
    pub target_id: String,
    pub op: EditOp,
    pub reason: String,
    pub proposed_by: String,
    pub patch: EditPatch,
}
