//! autosync: commit and push a working tree whenever it settles.
//!
//! # Usage
//!
//! ```text
//! autosync watch [ROOT] [--config <path>] [--dry-run] [--debounce <secs>]
//! autosync sync [ROOT] [--config <path>] [--dry-run]
//! autosync stop [ROOT]
//! autosync status [ROOT] [--json]
//! autosync init [ROOT] [--force]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    init::InitArgs, status::StatusArgs, stop::StopArgs, sync::SyncArgs, watch::WatchArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "autosync",
    version,
    about = "Watch a git checkout and commit, rebase and push changes automatically",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch a checkout in the foreground until ctrl-c or `autosync stop`.
    Watch(WatchArgs),

    /// Run the add, commit, pull --rebase, push sequence once.
    Sync(SyncArgs),

    /// Ask a running watcher to shut down.
    Stop(StopArgs),

    /// Show whether a watcher is running and its last sync.
    Status(StatusArgs),

    /// Write a commented `.autosync.yaml` with the defaults.
    Init(InitArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Watch(args) => args.run(),
        Commands::Sync(args) => args.run(),
        Commands::Stop(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Init(args) => args.run(),
    }
}
