use amc_core::{CompressionLevel, HandoffInput, WakeUpLayer, WakeUpRequest};
use amc_handoff::{create_handoff, wake_up_stratified};
use clap::{Args, Subcommand};

use crate::common::{now_micros, parse_csv, print_json, Global};

#[derive(Subcommand, Debug)]
pub enum HandoffCommand {
    /// Record a new handoff note for one relationship.
    Create(CreateArgs),
    /// Fetch the most recent handoff with someone.
    Last(LastArgs),
    /// Reconnect and pull a layered wake-up read.
    WakeUp(WakeUpArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[command(flatten)]
    pub global: Global,
    #[arg(long)]
    pub with_whom: String,
    #[arg(long)]
    pub session: String,
    #[arg(long, default_value = "")]
    pub experienced: String,
    #[arg(long, default_value = "")]
    pub noticed: String,
    #[arg(long, default_value = "")]
    pub learned: String,
    #[arg(long, default_value = "")]
    pub story: String,
    #[arg(long, default_value = "")]
    pub becoming: String,
    #[arg(long, default_value = "")]
    pub remember: String,
    #[arg(long, default_value_t = 0.5)]
    pub significance: f64,
    #[arg(long)]
    pub tags: Option<String>,
    #[arg(long, default_value = "full")]
    pub compression_level: CompressionLevel,
    #[arg(long)]
    pub influenced_by: Option<String>,
}

#[derive(Args, Debug)]
pub struct LastArgs {
    #[command(flatten)]
    pub global: Global,
    pub with_whom: String,
}

#[derive(Args, Debug)]
pub struct WakeUpArgs {
    #[command(flatten)]
    pub global: Global,
    pub with_whom: String,
    /// Comma-separated layers to include (metadata,reflection,recent,progressive);
    /// defaults to all four.
    #[arg(long)]
    pub layers: Option<String>,
    #[arg(long)]
    pub recent_count: Option<u32>,
    #[arg(long)]
    pub topic: Option<String>,
}

fn parse_layer(raw: &str) -> anyhow::Result<WakeUpLayer> {
    match raw {
        "metadata" => Ok(WakeUpLayer::Metadata),
        "reflection" => Ok(WakeUpLayer::Reflection),
        "recent" => Ok(WakeUpLayer::Recent),
        "progressive" => Ok(WakeUpLayer::Progressive),
        other => Err(anyhow::anyhow!("unknown wake-up layer: {other}")),
    }
}

fn parse_layers(raw: &Option<String>) -> anyhow::Result<Vec<WakeUpLayer>> {
    match raw {
        None => Ok(vec![WakeUpLayer::Metadata, WakeUpLayer::Reflection, WakeUpLayer::Recent, WakeUpLayer::Progressive]),
        Some(_) => parse_csv(raw).iter().map(|s| parse_layer(s)).collect(),
    }
}

pub fn handle(command: HandoffCommand) -> anyhow::Result<()> {
    match command {
        HandoffCommand::Create(args) => create(args),
        HandoffCommand::Last(args) => last(args),
        HandoffCommand::WakeUp(args) => wake_up(args),
    }
}

fn create(args: CreateArgs) -> anyhow::Result<()> {
    let store = args.global.open_store()?;
    let input = HandoffInput {
        with_whom: args.with_whom,
        session_id: args.session,
        experienced: args.experienced,
        noticed: args.noticed,
        learned: args.learned,
        story: args.story,
        becoming: args.becoming,
        remember: args.remember,
        significance: args.significance,
        tags: parse_csv(&args.tags),
        compression_level: args.compression_level,
        influenced_by: args.influenced_by,
    };
    let handoff = create_handoff(&store, &args.global.tenant, input, now_micros())?;
    print_json(&handoff)
}

fn last(args: LastArgs) -> anyhow::Result<()> {
    let store = args.global.open_store()?;
    let handoff = store.last_handoff(&args.global.tenant, &args.with_whom)?;
    print_json(&handoff)
}

fn wake_up(args: WakeUpArgs) -> anyhow::Result<()> {
    let store = args.global.open_store()?;
    let request = WakeUpRequest {
        with_whom: args.with_whom,
        layers: parse_layers(&args.layers)?,
        recent_count: args.recent_count,
        topic: args.topic,
    };
    let result = wake_up_stratified(&store, &args.global.tenant, request, now_micros())?;
    print_json(&result)
}
