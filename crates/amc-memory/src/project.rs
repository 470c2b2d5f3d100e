//! Project summary: a cheap rollup over a project's tasks, composed from
//! storage primitives rather than a dedicated aggregate table.

use amc_core::{CoreError, Task, TaskStatus};
use amc_storage::Store;
use serde::Serialize;

const RECENT_TASKS_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    pub project_id: String,
    pub total_tasks: u32,
    pub open_tasks: u32,
    pub done_tasks: u32,
    pub blocking_tasks: Vec<Task>,
    pub recent_tasks: Vec<Task>,
}

/// `blocking_tasks` are tasks currently `Blocked` — the ones worth a
/// human's attention. `recent_tasks` are the most recently touched, newest
/// first, capped to keep the summary cheap to render.
pub fn get_project_summary(store: &Store, tenant_id: &str, project_id: &str) -> Result<ProjectSummary, CoreError> {
    if project_id.trim().is_empty() {
        return Err(CoreError::InvalidArgument("project_id must not be empty".to_string()));
    }
    let mut tasks = store.tasks_for_project(tenant_id, project_id)?;
    tasks.sort_by(|a, b| b.ts.cmp(&a.ts));

    let total_tasks = tasks.len() as u32;
    let open_tasks = tasks.iter().filter(|t| matches!(t.status, TaskStatus::Open | TaskStatus::Doing)).count() as u32;
    let done_tasks = tasks.iter().filter(|t| t.status == TaskStatus::Done).count() as u32;
    let blocking_tasks: Vec<Task> = tasks.iter().filter(|t| t.status == TaskStatus::Blocked).cloned().collect();
    let recent_tasks: Vec<Task> = tasks.into_iter().take(RECENT_TASKS_LIMIT).collect();

    Ok(ProjectSummary {
        project_id: project_id.to_string(),
        total_tasks,
        open_tasks,
        done_tasks,
        blocking_tasks,
        recent_tasks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use amc_core::ids;

    fn task(project_id: &str, status: TaskStatus, ts: i64) -> Task {
        Task {
            task_id: ids::new_task_id(),
            tenant_id: "t1".to_string(),
            ts,
            title: "do the thing".to_string(),
            details: "details".to_string(),
            status,
            priority: 50,
            progress_percent: 0,
            assignee_id: None,
            refs: Vec::new(),
            blocked_by: Vec::new(),
            blocking: Vec::new(),
            project_refs: vec![project_id.to_string()],
            start_date: None,
            due_date: None,
        }
    }

    #[test]
    fn summary_buckets_tasks_by_status() {
        let store = Store::open_in_memory().expect("open store");
        store.insert_task(&task("proj-1", TaskStatus::Open, 100)).unwrap();
        store.insert_task(&task("proj-1", TaskStatus::Done, 200)).unwrap();
        store.insert_task(&task("proj-1", TaskStatus::Blocked, 300)).unwrap();

        let summary = get_project_summary(&store, "t1", "proj-1").unwrap();
        assert_eq!(summary.total_tasks, 3);
        assert_eq!(summary.open_tasks, 1);
        assert_eq!(summary.done_tasks, 1);
        assert_eq!(summary.blocking_tasks.len(), 1);
        assert_eq!(summary.recent_tasks[0].ts, 300);
    }

    #[test]
    fn empty_project_id_is_rejected() {
        let store = Store::open_in_memory().expect("open store");
        assert!(matches!(get_project_summary(&store, "t1", ""), Err(CoreError::InvalidArgument(_))));
    }
}
