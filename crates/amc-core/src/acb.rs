//! The Active Context Bundle: the packed, token-budgeted slice of memory
//! the orchestrator hands back for one prompt. Data shape only — assembly
//! lives in `amc-orchestrator`.

use serde::{Deserialize, Serialize};

use crate::event::Channel;

/// Caller-supplied fields for `build_acb`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildAcbRequest {
    pub session_id: String,
    pub channel: Channel,
    pub intent: String,
    pub query_text: Option<String>,
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
    pub project_id: Option<String>,
    pub agent_id: String,
    pub max_tokens: u32,
    #[serde(default = "default_true")]
    pub include_capsules: bool,
    #[serde(default)]
    pub include_quarantined: bool,
}

fn default_true() -> bool {
    true
}

/// Detected operating mode; drives the fixed sub-budget table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Task,
    Debugging,
    Exploration,
    Learning,
    General,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Debugging => "debugging",
            Self::Exploration => "exploration",
            Self::Learning => "learning",
            Self::General => "general",
        }
    }
}

/// Fixed section identity; ordering here is the ACB's section order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum SectionName {
    StickyInvariants,
    Rules,
    RelevantDecisions,
    TaskState,
    Capsules,
    RecentWindow,
    RetrievedEvidence,
    Handoff,
}

impl SectionName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StickyInvariants => "sticky_invariants",
            Self::Rules => "rules",
            Self::RelevantDecisions => "relevant_decisions",
            Self::TaskState => "task_state",
            Self::Capsules => "capsules",
            Self::RecentWindow => "recent_window",
            Self::RetrievedEvidence => "retrieved_evidence",
            Self::Handoff => "handoff",
        }
    }

    /// Fixed section order every ACB is assembled in.
    pub const ALL: [SectionName; 8] = [
        Self::StickyInvariants,
        Self::Rules,
        Self::RelevantDecisions,
        Self::TaskState,
        Self::Capsules,
        Self::RecentWindow,
        Self::RetrievedEvidence,
        Self::Handoff,
    ];
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Chunk,
    Decision,
    Task,
    Capsule,
    Handoff,
}

/// One admitted piece of context. `refs` traces back to the originating
/// event/decision/task/capsule id — never empty for an admitted item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AcbItem {
    pub text: String,
    pub token_est: u32,
    pub refs: Vec<String>,
    pub source_kind: SourceKind,
    /// Eviction priority: sticky items use 1000/900/800/700, everything
    /// else uses a priority derived from `importance`. Higher survives longer.
    pub priority: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AcbSection {
    pub name: SectionName,
    pub items: Vec<AcbItem>,
}

impl AcbSection {
    pub fn token_total(&self) -> u32 {
        self.items.iter().map(|item| item.token_est).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Acb {
    pub sections: Vec<AcbSection>,
    pub token_used_est: u32,
    pub edits_applied: u32,
    pub mode: Mode,
    pub fallback_reason: Option<String>,
    pub truncated: bool,
    pub budget_exceeded: bool,
}

impl Acb {
    pub fn section(&self, name: SectionName) -> Option<&AcbSection> {
        self.sections.iter().find(|s| s.name == name)
    }
}
