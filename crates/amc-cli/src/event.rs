use amc_core::{ActorRef, ActorType, Channel, EventInput, EventKind, Scope, Sensitivity};
use clap::{Args, Subcommand};

use crate::common::{now_micros, parse_csv, print_json, Global};

#[derive(Subcommand, Debug)]
pub enum EventCommand {
    /// Record a new event (and its derived chunks) in one transaction.
    Record(RecordArgs),
    /// Fetch one event by id.
    Get(GetArgs),
    /// List recent events in a session, newest first.
    List(ListArgs),
}

#[derive(Args, Debug)]
pub struct RecordArgs {
    #[command(flatten)]
    pub global: Global,
    #[arg(long)]
    pub session: String,
    #[arg(long, default_value = "private")]
    pub channel: Channel,
    #[arg(long, default_value = "message")]
    pub kind: EventKind,
    #[arg(long, default_value = "human")]
    pub actor_type: ActorType,
    #[arg(long)]
    pub actor_id: String,
    #[arg(long, default_value = "none")]
    pub sensitivity: Sensitivity,
    /// Comma-separated tags.
    #[arg(long)]
    pub tags: Option<String>,
    /// Raw JSON content; defaults to `{}`.
    #[arg(long)]
    pub content: Option<String>,
    /// Comma-separated event ids this event references.
    #[arg(long)]
    pub refs: Option<String>,
    #[arg(long)]
    pub scope: Option<Scope>,
    #[arg(long)]
    pub subject_type: Option<String>,
    #[arg(long)]
    pub subject_id: Option<String>,
    #[arg(long)]
    pub project_id: Option<String>,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    #[command(flatten)]
    pub global: Global,
    pub event_id: String,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub global: Global,
    #[arg(long)]
    pub session: String,
    #[arg(long, default_value_t = 50)]
    pub limit: u32,
    #[arg(long)]
    pub before_ts: Option<i64>,
}

pub fn handle(command: EventCommand) -> anyhow::Result<()> {
    match command {
        EventCommand::Record(args) => record(args),
        EventCommand::Get(args) => get(args),
        EventCommand::List(args) => list(args),
    }
}

fn record(args: RecordArgs) -> anyhow::Result<()> {
    let store = args.global.open_store()?;
    let content = match &args.content {
        Some(raw) => serde_json::from_str(raw)?,
        None => serde_json::json!({}),
    };
    let input = EventInput {
        session_id: args.session,
        channel: args.channel,
        actor: ActorRef::new(args.actor_type, args.actor_id.clone()),
        kind: args.kind,
        sensitivity: args.sensitivity,
        tags: parse_csv(&args.tags),
        content,
        refs: parse_csv(&args.refs),
        scope: args.scope,
        subject_type: args.subject_type,
        subject_id: args.subject_id,
        project_id: args.project_id,
    };
    let actor = ActorRef::new(args.actor_type, args.actor_id);
    let recorded = amc_ingest::record_event(&store, &args.global.tenant, actor, input, now_micros())?;
    print_json(&recorded)
}

fn get(args: GetArgs) -> anyhow::Result<()> {
    let store = args.global.open_store()?;
    let event = store.get_event(&args.global.tenant, &args.event_id)?;
    print_json(&event)
}

fn list(args: ListArgs) -> anyhow::Result<()> {
    let store = args.global.open_store()?;
    let events = store.list_events(&args.global.tenant, &args.session, args.limit, args.before_ts)?;
    print_json(&events)
}
