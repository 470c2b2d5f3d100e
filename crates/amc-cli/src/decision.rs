use amc_core::{DecisionInput, Scope};
use amc_memory::decisions::{create_decision, get_active, supersede};
use clap::{Args, Subcommand};

use crate::common::{now_micros, parse_csv, print_json, Global};

#[derive(Subcommand, Debug)]
pub enum DecisionCommand {
    /// Record a new decision.
    Create(CreateArgs),
    /// Supersede an active decision with a new one.
    Supersede(SupersedeArgs),
    /// Active decisions relevant to a subject or project.
    Active(ActiveArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[command(flatten)]
    pub global: Global,
    #[arg(long, default_value = "private")]
    pub scope: Scope,
    #[arg(long)]
    pub decision: String,
    #[arg(long)]
    pub rationale: Option<String>,
    #[arg(long)]
    pub constraints: Option<String>,
    #[arg(long)]
    pub alternatives: Option<String>,
    #[arg(long)]
    pub consequences: Option<String>,
    #[arg(long)]
    pub refs: Option<String>,
    #[arg(long)]
    pub subject_type: Option<String>,
    #[arg(long)]
    pub subject_id: Option<String>,
    #[arg(long)]
    pub project_id: Option<String>,
}

#[derive(Args, Debug)]
pub struct SupersedeArgs {
    #[command(flatten)]
    pub global: Global,
    pub predecessor_id: String,
    #[command(flatten)]
    pub create: CreateArgs,
}

#[derive(Args, Debug)]
pub struct ActiveArgs {
    #[command(flatten)]
    pub global: Global,
    #[arg(long)]
    pub subject_type: Option<String>,
    #[arg(long)]
    pub subject_id: Option<String>,
    #[arg(long)]
    pub project_id: Option<String>,
    #[arg(long, default_value_t = false)]
    pub include_quarantined: bool,
}

fn input_from(args: &CreateArgs) -> DecisionInput {
    DecisionInput {
        scope: args.scope,
        decision: args.decision.clone(),
        rationale: parse_csv(&args.rationale),
        constraints: parse_csv(&args.constraints),
        alternatives: parse_csv(&args.alternatives),
        consequences: parse_csv(&args.consequences),
        refs: parse_csv(&args.refs),
        subject_type: args.subject_type.clone(),
        subject_id: args.subject_id.clone(),
        project_id: args.project_id.clone(),
    }
}

pub fn handle(command: DecisionCommand) -> anyhow::Result<()> {
    match command {
        DecisionCommand::Create(args) => create(args),
        DecisionCommand::Supersede(args) => supersede_cmd(args),
        DecisionCommand::Active(args) => active(args),
    }
}

fn create(args: CreateArgs) -> anyhow::Result<()> {
    let store = args.global.open_store()?;
    let input = input_from(&args);
    let decision = create_decision(&store, &args.global.tenant, input, now_micros())?;
    print_json(&decision)
}

fn supersede_cmd(args: SupersedeArgs) -> anyhow::Result<()> {
    let store = args.global.open_store()?;
    let input = input_from(&args.create);
    let decision = supersede(&store, &args.global.tenant, &args.predecessor_id, input, now_micros())?;
    print_json(&decision)
}

fn active(args: ActiveArgs) -> anyhow::Result<()> {
    let store = args.global.open_store()?;
    let subject = match (&args.subject_type, &args.subject_id) {
        (Some(t), Some(i)) => Some((t.as_str(), i.as_str())),
        _ => None,
    };
    let decisions = get_active(&store, &args.global.tenant, subject, args.project_id.as_deref(), args.include_quarantined)?;
    print_json(&decisions)
}
