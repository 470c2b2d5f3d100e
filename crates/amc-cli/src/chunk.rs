use amc_core::{Channel, Scope, TargetType};
use amc_memory::get_timeline;
use clap::{Args, Subcommand};

use crate::common::{print_json, Global};

#[derive(Subcommand, Debug)]
pub enum ChunkCommand {
    /// Fetch chunks by id, through the Effective View.
    Get(GetArgs),
    /// Full-text search over chunks, through the Effective View.
    Search(SearchArgs),
    /// Chunks neighboring one chunk within a time window.
    Timeline(TimelineArgs),
}

#[derive(Args, Debug)]
pub struct GetArgs {
    #[command(flatten)]
    pub global: Global,
    /// Comma-separated chunk ids.
    #[arg(long)]
    pub ids: String,
    #[arg(long, default_value = "private")]
    pub channel: Channel,
    #[arg(long, default_value_t = false)]
    pub include_quarantined: bool,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    #[command(flatten)]
    pub global: Global,
    #[arg(long)]
    pub query: Option<String>,
    #[arg(long)]
    pub session: Option<String>,
    #[arg(long)]
    pub scope: Option<Scope>,
    #[arg(long)]
    pub subject_type: Option<String>,
    #[arg(long)]
    pub subject_id: Option<String>,
    #[arg(long)]
    pub project_id: Option<String>,
    #[arg(long, default_value_t = 20)]
    pub limit: u32,
    #[arg(long, default_value = "private")]
    pub channel: Channel,
    #[arg(long, default_value_t = false)]
    pub include_quarantined: bool,
}

#[derive(Args, Debug)]
pub struct TimelineArgs {
    #[command(flatten)]
    pub global: Global,
    pub chunk_id: String,
    #[arg(long, default_value_t = 3600)]
    pub window_seconds: i64,
    #[arg(long, default_value = "private")]
    pub channel: Channel,
    #[arg(long, default_value_t = false)]
    pub include_quarantined: bool,
}

pub fn handle(command: ChunkCommand) -> anyhow::Result<()> {
    match command {
        ChunkCommand::Get(args) => get(args),
        ChunkCommand::Search(args) => search(args),
        ChunkCommand::Timeline(args) => timeline(args),
    }
}

fn get(args: GetArgs) -> anyhow::Result<()> {
    let store = args.global.open_store()?;
    let ids: Vec<String> = args.ids.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect();
    let chunks = store.get_chunks_by_ids(&args.global.tenant, &ids)?;
    let mut out = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
        let edits = store.approved_edits_for_target(&args.global.tenant, TargetType::Chunk, &chunk.chunk_id)?;
        if let Some(effective) = amc_memory::apply_edits_to_chunk(chunk, &edits, args.channel, args.include_quarantined) {
            out.push(effective);
        }
    }
    print_json(&out)
}

fn search(args: SearchArgs) -> anyhow::Result<()> {
    let store = args.global.open_store()?;
    let subject = match (&args.subject_type, &args.subject_id) {
        (Some(t), Some(i)) => Some((t.as_str(), i.as_str())),
        _ => None,
    };
    let candidates = store.search_chunks(
        &args.global.tenant,
        args.query.as_deref(),
        args.session.as_deref(),
        args.scope,
        subject,
        args.project_id.as_deref(),
        args.limit,
    )?;
    let mut out = Vec::with_capacity(candidates.len());
    for chunk in &candidates {
        let edits = store.approved_edits_for_target(&args.global.tenant, TargetType::Chunk, &chunk.chunk_id)?;
        if let Some(effective) = amc_memory::apply_edits_to_chunk(chunk, &edits, args.channel, args.include_quarantined) {
            out.push(effective);
        }
    }
    print_json(&out)
}

fn timeline(args: TimelineArgs) -> anyhow::Result<()> {
    let store = args.global.open_store()?;
    let neighbors = get_timeline(
        &store,
        &args.global.tenant,
        &args.chunk_id,
        args.window_seconds,
        args.channel,
        args.include_quarantined,
    )?;
    print_json(&neighbors)
}
