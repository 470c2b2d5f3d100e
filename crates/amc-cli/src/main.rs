use anyhow::Result;
use clap::{Parser, Subcommand};

mod acb;
mod capsule;
mod chunk;
mod common;
mod decision;
mod edit;
mod event;
mod handoff;
mod task_cli;

#[derive(Parser)]
#[command(name = "amc")]
#[command(about = "Agent Memory Cockpit CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record and read raw events.
    Event {
        #[command(subcommand)]
        action: event::EventCommand,
    },
    /// Read chunks through the Effective View.
    Chunk {
        #[command(subcommand)]
        action: chunk::ChunkCommand,
    },
    /// Assemble Active Context Bundles.
    Acb {
        #[command(subcommand)]
        action: acb::AcbCommand,
    },
    /// Manage the Decision Ledger.
    Decision {
        #[command(subcommand)]
        action: decision::DecisionCommand,
    },
    /// Manage tasks and project summaries.
    Task {
        #[command(subcommand)]
        action: task_cli::TaskCommand,
    },
    /// Propose, list, and approve memory edits.
    Edit {
        #[command(subcommand)]
        action: edit::EditCommand,
    },
    /// Create and transfer capsules.
    Capsule {
        #[command(subcommand)]
        action: capsule::CapsuleCommand,
    },
    /// Record handoffs and wake up with stratified context.
    Handoff {
        #[command(subcommand)]
        action: handoff::HandoffCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Event { action } => event::handle(action),
        Commands::Chunk { action } => chunk::handle(action),
        Commands::Acb { action } => acb::handle(action),
        Commands::Decision { action } => decision::handle(action),
        Commands::Task { action } => task_cli::handle(action),
        Commands::Edit { action } => edit::handle(action),
        Commands::Capsule { action } => capsule::handle(action),
        Commands::Handoff { action } => handoff::handle(action),
    }
}
