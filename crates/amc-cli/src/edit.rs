use amc_core::{ids, EditOp, EditPatch, EditStatus, MemoryEdit, TargetType};
use clap::{Args, Subcommand};

use crate::common::{now_micros, print_json, Global};

#[derive(Subcommand, Debug)]
pub enum EditCommand {
    /// Propose a memory edit (retract, block, quarantine, amend, attenuate).
    Apply(ApplyArgs),
    /// List edits against one target, newest first.
    List(ListArgs),
    /// Approve a pending edit, making it effective.
    Approve(ApproveArgs),
}

#[derive(Args, Debug)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub global: Global,
    #[arg(long)]
    pub target_type: TargetType,
    #[arg(long)]
    pub target_id: String,
    #[arg(long)]
    pub op: EditOp,
    #[arg(long)]
    pub reason: String,
    #[arg(long)]
    pub proposed_by: String,
    #[arg(long)]
    pub text: Option<String>,
    #[arg(long)]
    pub importance: Option<f64>,
    #[arg(long)]
    pub importance_delta: Option<f64>,
    #[arg(long)]
    pub channel: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub global: Global,
    #[arg(long)]
    pub target_type: TargetType,
    #[arg(long)]
    pub target_id: String,
}

#[derive(Args, Debug)]
pub struct ApproveArgs {
    #[command(flatten)]
    pub global: Global,
    pub edit_id: String,
    #[arg(long)]
    pub approved_by: String,
}

pub fn handle(command: EditCommand) -> anyhow::Result<()> {
    match command {
        EditCommand::Apply(args) => apply(args),
        EditCommand::List(args) => list(args),
        EditCommand::Approve(args) => approve(args),
    }
}

fn apply(args: ApplyArgs) -> anyhow::Result<()> {
    let store = args.global.open_store()?;
    let edit = MemoryEdit {
        edit_id: ids::new_edit_id(),
        tenant_id: args.global.tenant.clone(),
        ts: now_micros(),
        target_type: args.target_type,
        target_id: args.target_id,
        op: args.op,
        reason: args.reason,
        proposed_by: args.proposed_by,
        approved_by: None,
        status: EditStatus::Pending,
        patch: EditPatch {
            text: args.text,
            importance: args.importance,
            importance_delta: args.importance_delta,
            channel: args.channel,
        },
        applied_at: None,
    };
    store.insert_memory_edit(&edit)?;
    print_json(&edit)
}

fn list(args: ListArgs) -> anyhow::Result<()> {
    let store = args.global.open_store()?;
    let edits = store.list_edits(&args.global.tenant, args.target_type, &args.target_id)?;
    print_json(&edits)
}

fn approve(args: ApproveArgs) -> anyhow::Result<()> {
    let store = args.global.open_store()?;
    store.approve_edit(&args.global.tenant, &args.edit_id, &args.approved_by, now_micros())?;
    println!("approved {}", args.edit_id);
    Ok(())
}
