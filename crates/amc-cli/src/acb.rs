use amc_core::{BuildAcbRequest, Channel, Config};
use clap::{Args, Subcommand};

use crate::common::{now_micros, print_json, Global};

#[derive(Subcommand, Debug)]
pub enum AcbCommand {
    /// Assemble the Active Context Bundle for one prompt.
    Build(BuildArgs),
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub global: Global,
    #[arg(long)]
    pub session: String,
    #[arg(long, default_value = "private")]
    pub channel: Channel,
    #[arg(long)]
    pub intent: String,
    #[arg(long)]
    pub query_text: Option<String>,
    #[arg(long)]
    pub subject_type: Option<String>,
    #[arg(long)]
    pub subject_id: Option<String>,
    #[arg(long)]
    pub project_id: Option<String>,
    #[arg(long)]
    pub agent_id: String,
    #[arg(long, default_value_t = 0)]
    pub max_tokens: u32,
    #[arg(long, default_value_t = true)]
    pub include_capsules: bool,
    #[arg(long, default_value_t = false)]
    pub include_quarantined: bool,
}

pub fn handle(command: AcbCommand) -> anyhow::Result<()> {
    match command {
        AcbCommand::Build(args) => build(args),
    }
}

fn build(args: BuildArgs) -> anyhow::Result<()> {
    let store = args.global.open_store()?;
    let config = Config::from_env();
    let request = BuildAcbRequest {
        session_id: args.session,
        channel: args.channel,
        intent: args.intent,
        query_text: args.query_text,
        subject_type: args.subject_type,
        subject_id: args.subject_id,
        project_id: args.project_id,
        agent_id: args.agent_id,
        max_tokens: args.max_tokens,
        include_capsules: args.include_capsules,
        include_quarantined: args.include_quarantined,
    };
    let acb = amc_orchestrator::build_acb(&store, &args.global.tenant, request, &config, now_micros())?;
    print_json(&acb)
}
