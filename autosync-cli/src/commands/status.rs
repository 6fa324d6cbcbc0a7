//! `autosync status [ROOT] [--json]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::{json, Value};

use autosync_daemon::paths::{canonical_root, socket_path};
use autosync_daemon::{request_status, DaemonError};

use super::home;

/// Arguments for `autosync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Watched directory. Defaults to the current one.
    #[arg(default_value = ".")]
    pub root: PathBuf,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let root = canonical_root(&self.root);

        let status = match request_status(&home, &root) {
            Ok(status) => status,
            Err(DaemonError::DaemonNotRunning { .. }) => json!({
                "running": false,
                "root": root.display().to_string(),
                "socket": socket_path(&home, &root).display().to_string(),
            }),
            Err(err) => return Err(err).context("failed to query watcher status"),
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&status).context("failed to render status JSON")?
            );
        } else {
            print_human(&status);
        }
        Ok(())
    }
}

fn print_human(status: &Value) {
    let root = status["root"].as_str().unwrap_or("?");
    if status["running"].as_bool() != Some(true) {
        let state = status["state"].as_str().unwrap_or("not running");
        println!("{} {root}: {state}", "●".bright_black());
        return;
    }

    println!("{} {root}: watching", "●".green());
    if let Some(started) = status["started_at"].as_str() {
        println!("  started:   {started}");
    }
    if let Some(ms) = status["debounce_ms"].as_u64() {
        println!("  debounce:  {ms} ms");
    }
    if status["dry_run"].as_bool() == Some(true) {
        println!("  mode:      {}", "dry run".yellow());
    }
    println!("  syncs:     {}", status["syncs"].as_u64().unwrap_or(0));

    let last = &status["last_sync"];
    if last.is_null() {
        println!("  last sync: never");
        return;
    }
    let outcome = last["outcome"].as_str().unwrap_or("?");
    let colored_outcome = match outcome {
        "pushed" | "commit_noop" | "no_changes" => outcome.green(),
        _ => outcome.red(),
    };
    println!(
        "  last sync: {colored_outcome} ({}, {} ms) at {}",
        last["trigger"].as_str().unwrap_or("?"),
        last["duration_ms"].as_u64().unwrap_or(0),
        last["finished_at"].as_str().unwrap_or("?"),
    );
}
