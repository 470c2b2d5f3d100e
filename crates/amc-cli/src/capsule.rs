use amc_core::{CapsuleInput, CapsuleItems, Config, Scope};
use amc_memory::capsules::{available, create, get_for_requester, revoke};
use clap::{Args, Subcommand};

use crate::common::{now_micros, parse_csv, print_json, Global};

#[derive(Subcommand, Debug)]
pub enum CapsuleCommand {
    /// Create a transfer capsule.
    Create(CreateArgs),
    /// Fetch one capsule, only if the requester is in its audience.
    Get(GetArgs),
    /// List capsules visible to a requester.
    List(ListArgs),
    /// Revoke a capsule early.
    Revoke(RevokeArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[command(flatten)]
    pub global: Global,
    #[arg(long, default_value = "private")]
    pub scope: Scope,
    #[arg(long)]
    pub subject_type: String,
    #[arg(long)]
    pub subject_id: String,
    #[arg(long)]
    pub project_id: Option<String>,
    #[arg(long)]
    pub author_agent_id: String,
    /// Comma-separated agent ids allowed to read this capsule.
    #[arg(long)]
    pub audience: String,
    #[arg(long)]
    pub chunks: Option<String>,
    #[arg(long)]
    pub decisions: Option<String>,
    #[arg(long)]
    pub artifacts: Option<String>,
    #[arg(long)]
    pub risks: Option<String>,
    #[arg(long)]
    pub ttl_days: u32,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    #[command(flatten)]
    pub global: Global,
    pub capsule_id: String,
    #[arg(long)]
    pub requester_agent_id: String,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub global: Global,
    #[arg(long)]
    pub requester_agent_id: String,
    #[arg(long)]
    pub subject_type: Option<String>,
    #[arg(long)]
    pub subject_id: Option<String>,
}

#[derive(Args, Debug)]
pub struct RevokeArgs {
    #[command(flatten)]
    pub global: Global,
    pub capsule_id: String,
    #[arg(long)]
    pub actor_agent_id: String,
    #[arg(long, default_value_t = false)]
    pub actor_is_admin: bool,
}

pub fn handle(command: CapsuleCommand) -> anyhow::Result<()> {
    match command {
        CapsuleCommand::Create(args) => create_cmd(args),
        CapsuleCommand::Get(args) => get(args),
        CapsuleCommand::List(args) => list(args),
        CapsuleCommand::Revoke(args) => revoke_cmd(args),
    }
}

fn create_cmd(args: CreateArgs) -> anyhow::Result<()> {
    let store = args.global.open_store()?;
    let input = CapsuleInput {
        scope: args.scope,
        subject_type: args.subject_type,
        subject_id: args.subject_id,
        project_id: args.project_id,
        author_agent_id: args.author_agent_id,
        audience_agent_ids: parse_csv(&Some(args.audience)),
        items: CapsuleItems {
            chunks: parse_csv(&args.chunks),
            decisions: parse_csv(&args.decisions),
            artifacts: parse_csv(&args.artifacts),
        },
        risks: parse_csv(&args.risks),
        ttl_days: args.ttl_days,
    };
    let config = Config::from_env();
    let capsule = create(&store, &args.global.tenant, input, &config, now_micros())?;
    print_json(&capsule)
}

fn get(args: GetArgs) -> anyhow::Result<()> {
    let store = args.global.open_store()?;
    let capsule = get_for_requester(&store, &args.global.tenant, &args.requester_agent_id, &args.capsule_id, now_micros())?;
    print_json(&capsule)
}

fn list(args: ListArgs) -> anyhow::Result<()> {
    let store = args.global.open_store()?;
    let subject = match (&args.subject_type, &args.subject_id) {
        (Some(t), Some(i)) => Some((t.as_str(), i.as_str())),
        _ => None,
    };
    let capsules = available(&store, &args.global.tenant, &args.requester_agent_id, subject, now_micros())?;
    print_json(&capsules)
}

fn revoke_cmd(args: RevokeArgs) -> anyhow::Result<()> {
    let store = args.global.open_store()?;
    revoke(&store, &args.global.tenant, &args.actor_agent_id, args.actor_is_admin, &args.capsule_id)?;
    println!("revoked {}", args.capsule_id);
    Ok(())
}
