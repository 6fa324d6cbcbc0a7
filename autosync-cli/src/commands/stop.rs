//! `autosync stop [ROOT]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use autosync_daemon::{paths::canonical_root, request_stop, DaemonError};

use super::home;

/// Ask the watcher on ROOT to shut down.
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Watched directory. Defaults to the current one.
    #[arg(default_value = ".")]
    pub root: PathBuf,
}

impl StopArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let root = canonical_root(&self.root);
        match request_stop(&home, &root) {
            Ok(()) => println!("{} Stop requested for {}", "✓".green(), root.display()),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("autosync is not running for {}", root.display());
            }
            Err(err) => return Err(err).context("failed to stop watcher"),
        }
        Ok(())
    }
}
