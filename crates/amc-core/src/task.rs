use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Backlog,
    Open,
    Doing,
    Review,
    Blocked,
    Done,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::Open => "open",
            Self::Doing => "doing",
            Self::Review => "review",
            Self::Blocked => "blocked",
            Self::Done => "done",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "backlog" => Ok(Self::Backlog),
            "open" => Ok(Self::Open),
            "doing" => Ok(Self::Doing),
            "review" => Ok(Self::Review),
            "blocked" => Ok(Self::Blocked),
            "done" => Ok(Self::Done),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// Maximum depth walked when checking `blocked_by` for cycles on write.
pub const MAX_BLOCKED_BY_CYCLE_DEPTH: u32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub task_id: String,
    pub tenant_id: String,
    pub ts: i64,
    pub title: String,
    pub details: String,
    pub status: TaskStatus,
    pub priority: i32,
    pub progress_percent: u8,
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub refs: Vec<String>,
    /// Maintained by the caller at write time; cycle-checked before insert.
    #[serde(default)]
    pub blocked_by: Vec<String>,
    /// Derived by trigger-equivalent maintenance from other tasks' `blocked_by`.
    #[serde(default)]
    pub blocking: Vec<String>,
    #[serde(default)]
    pub project_refs: Vec<String>,
    pub start_date: Option<i64>,
    pub due_date: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskInput {
    pub title: String,
    pub details: String,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub progress_percent: u8,
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub refs: Vec<String>,
    #[serde(default)]
    pub blocked_by: Vec<String>,
    #[serde(default)]
    pub project_refs: Vec<String>,
    pub start_date: Option<i64>,
    pub due_date: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TaskUpdateInput {
    pub title: Option<String>,
    pub details: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<i32>,
    pub progress_percent: Option<u8>,
    pub assignee_id: Option<String>,
    pub blocked_by: Option<Vec<String>>,
    pub due_date: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectSummary {
    pub project_id: String,
    pub summary: String,
    pub blocking_tasks: Vec<Task>,
    pub recent_tasks: Vec<Task>,
}
