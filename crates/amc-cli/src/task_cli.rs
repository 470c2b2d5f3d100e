use amc_core::{ids, Task, TaskInput, TaskStatus, TaskUpdateInput};
use amc_memory::get_project_summary;
use clap::{Args, Subcommand};

use crate::common::{now_micros, parse_csv, print_json, Global};

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    /// Create a new task.
    Create(CreateArgs),
    /// Apply a partial update to a task.
    Update(UpdateArgs),
    /// Fetch one task by id.
    Get(GetArgs),
    /// List tasks, optionally filtered by status or assignee.
    List(ListArgs),
    /// Delete a task.
    Delete(DeleteArgs),
    /// Roll a project's tasks up into a summary.
    Summary(SummaryArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[command(flatten)]
    pub global: Global,
    #[arg(long)]
    pub title: String,
    #[arg(long, default_value = "")]
    pub details: String,
    #[arg(long)]
    pub status: Option<TaskStatus>,
    #[arg(long, default_value_t = 0)]
    pub priority: i32,
    #[arg(long, default_value_t = 0)]
    pub progress_percent: u8,
    #[arg(long)]
    pub assignee_id: Option<String>,
    #[arg(long)]
    pub refs: Option<String>,
    #[arg(long)]
    pub blocked_by: Option<String>,
    #[arg(long)]
    pub project_refs: Option<String>,
    #[arg(long)]
    pub start_date: Option<i64>,
    #[arg(long)]
    pub due_date: Option<i64>,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub global: Global,
    pub task_id: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub details: Option<String>,
    #[arg(long)]
    pub status: Option<TaskStatus>,
    #[arg(long)]
    pub priority: Option<i32>,
    #[arg(long)]
    pub progress_percent: Option<u8>,
    #[arg(long)]
    pub assignee_id: Option<String>,
    #[arg(long)]
    pub blocked_by: Option<String>,
    #[arg(long)]
    pub due_date: Option<i64>,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    #[command(flatten)]
    pub global: Global,
    pub task_id: String,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub global: Global,
    #[arg(long)]
    pub status: Option<TaskStatus>,
    #[arg(long)]
    pub assignee_id: Option<String>,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub global: Global,
    pub task_id: String,
}

#[derive(Args, Debug)]
pub struct SummaryArgs {
    #[command(flatten)]
    pub global: Global,
    pub project_id: String,
}

pub fn handle(command: TaskCommand) -> anyhow::Result<()> {
    match command {
        TaskCommand::Create(args) => create(args),
        TaskCommand::Update(args) => update(args),
        TaskCommand::Get(args) => get(args),
        TaskCommand::List(args) => list(args),
        TaskCommand::Delete(args) => delete(args),
        TaskCommand::Summary(args) => summary(args),
    }
}

fn create(args: CreateArgs) -> anyhow::Result<()> {
    let store = args.global.open_store()?;
    let input = TaskInput {
        title: args.title,
        details: args.details,
        status: args.status,
        priority: args.priority,
        progress_percent: args.progress_percent,
        assignee_id: args.assignee_id,
        refs: parse_csv(&args.refs),
        blocked_by: parse_csv(&args.blocked_by),
        project_refs: parse_csv(&args.project_refs),
        start_date: args.start_date,
        due_date: args.due_date,
    };
    let task = Task {
        task_id: ids::new_task_id(),
        tenant_id: args.global.tenant.clone(),
        ts: now_micros(),
        title: input.title,
        details: input.details,
        status: input.status.unwrap_or(TaskStatus::Open),
        priority: input.priority,
        progress_percent: input.progress_percent,
        assignee_id: input.assignee_id,
        refs: input.refs,
        blocked_by: input.blocked_by,
        blocking: Vec::new(),
        project_refs: input.project_refs,
        start_date: input.start_date,
        due_date: input.due_date,
    };
    store.insert_task(&task)?;
    print_json(&task)
}

fn update(args: UpdateArgs) -> anyhow::Result<()> {
    let store = args.global.open_store()?;
    let update = TaskUpdateInput {
        title: args.title,
        details: args.details,
        status: args.status,
        priority: args.priority,
        progress_percent: args.progress_percent,
        assignee_id: args.assignee_id,
        blocked_by: args.blocked_by.map(|raw| parse_csv(&Some(raw))),
        due_date: args.due_date,
    };
    let task = store.update_task(&args.global.tenant, &args.task_id, &update)?;
    print_json(&task)
}

fn get(args: GetArgs) -> anyhow::Result<()> {
    let store = args.global.open_store()?;
    let task = store.get_task(&args.global.tenant, &args.task_id)?;
    print_json(&task)
}

fn list(args: ListArgs) -> anyhow::Result<()> {
    let store = args.global.open_store()?;
    let tasks = store.list_tasks(&args.global.tenant, args.status, args.assignee_id.as_deref())?;
    print_json(&tasks)
}

fn delete(args: DeleteArgs) -> anyhow::Result<()> {
    let store = args.global.open_store()?;
    store.delete_task(&args.global.tenant, &args.task_id)?;
    println!("deleted {}", args.task_id);
    Ok(())
}

fn summary(args: SummaryArgs) -> anyhow::Result<()> {
    let store = args.global.open_store()?;
    let summary = get_project_summary(&store, &args.global.tenant, &args.project_id)?;
    print_json(&summary)
}
