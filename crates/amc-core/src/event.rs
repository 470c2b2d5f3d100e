use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tenant::ActorRef;

/// Upper bound on `Event::content`'s serialized size, enforced by the
/// Recorder before the row ever reaches storage.
pub const MAX_EVENT_CONTENT_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Private,
    Public,
    Team,
    Agent,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
            Self::Team => "team",
            Self::Agent => "agent",
        }
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "private" => Ok(Self::Private),
            "public" => Ok(Self::Public),
            "team" => Ok(Self::Team),
            "agent" => Ok(Self::Agent),
            other => Err(format!("unknown channel: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    ToolCall,
    ToolResult,
    Decision,
    TaskUpdate,
    Artifact,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::Decision => "decision",
            Self::TaskUpdate => "task_update",
            Self::Artifact => "artifact",
        }
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "message" => Ok(Self::Message),
            "tool_call" => Ok(Self::ToolCall),
            "tool_result" => Ok(Self::ToolResult),
            "decision" => Ok(Self::Decision),
            "task_update" => Ok(Self::TaskUpdate),
            "artifact" => Ok(Self::Artifact),
            other => Err(format!("unknown event kind: {other}")),
        }
    }
}

/// Ordered by increasing restrictiveness; `Sensitivity::max` picks the
/// stricter of two levels, used when a caller's clearance is compared
/// against a candidate's sensitivity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    None,
    Low,
    High,
    Secret,
}

impl Sensitivity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::High => "high",
            Self::Secret => "secret",
        }
    }
}

impl std::str::FromStr for Sensitivity {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "none" => Ok(Self::None),
            "low" => Ok(Self::Low),
            "high" => Ok(Self::High),
            "secret" => Ok(Self::Secret),
            other => Err(format!("unknown sensitivity: {other}")),
        }
    }
}

impl Default for Sensitivity {
    fn default() -> Self {
        Self::None
    }
}

/// Relevance band of a piece of memory, ordered low to high; see
/// `Decision::scope`'s precedence table for the numeric weights this
/// ordering underlies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Global,
    Session,
    User,
    Project,
    Policy,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Session => "session",
            Self::User => "user",
            Self::Project => "project",
            Self::Policy => "policy",
        }
    }

    /// Numeric precedence used by the Decision Ledger (`policy=4 > project=3
    /// > user=2 > session=1 > global=0`).
    pub fn precedence(self) -> u8 {
        match self {
            Self::Global => 0,
            Self::Session => 1,
            Self::User => 2,
            Self::Project => 3,
            Self::Policy => 4,
        }
    }
}

impl std::str::FromStr for Scope {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "global" => Ok(Self::Global),
            "session" => Ok(Self::Session),
            "user" => Ok(Self::User),
            "project" => Ok(Self::Project),
            "policy" => Ok(Self::Policy),
            other => Err(format!("unknown scope: {other}")),
        }
    }
}

/// Subject reference: who/what a piece of memory is about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subject {
    pub subject_type: String,
    pub subject_id: String,
}

/// An append-only interaction record. Never mutated once inserted; all
/// corrections go through `MemoryEdit` at read time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub event_id: String,
    pub tenant_id: String,
    pub session_id: String,
    pub ts: i64,
    pub channel: Channel,
    pub actor: ActorRef,
    pub kind: EventKind,
    #[serde(default)]
    pub sensitivity: Sensitivity,
    #[serde(default)]
    pub tags: Vec<String>,
    pub content: Value,
    #[serde(default)]
    pub refs: Vec<String>,
    pub scope: Option<Scope>,
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
    pub project_id: Option<String>,
}

/// Caller-supplied fields for `record_event`; `event_id` and `ts` are
/// assigned by the Recorder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventInput {
    pub session_id: String,
    pub channel: Channel,
    pub actor: ActorRef,
    pub kind: EventKind,
    #[serde(default)]
    pub sensitivity: Sensitivity,
    #[serde(default)]
    pub tags: Vec<String>,
    pub content: Value,
    #[serde(default)]
    pub refs: Vec<String>,
    pub scope: Option<Scope>,
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
    pub project_id: Option<String>,
}
