//! `autosync watch [ROOT]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use autosync_daemon::{init_tracing, start_blocking, WatchOptions};

use super::{home, load_config, resolve_root};

/// Watch a checkout in the foreground.
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Directory to watch (a git working tree). Defaults to the current one.
    #[arg(default_value = ".")]
    pub root: PathBuf,

    /// Read settings from this file instead of the usual lookup.
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log the git commands instead of running them.
    #[arg(long)]
    pub dry_run: bool,

    /// Quiet window in seconds before a sync starts.
    #[arg(long, value_name = "SECS")]
    pub debounce: Option<f64>,
}

impl WatchArgs {
    pub fn run(self) -> Result<()> {
        init_tracing();
        let root = resolve_root(&self.root)?;
        let home = home()?;

        let mut config = load_config(&root, self.config.as_deref())?.config;
        if self.dry_run {
            config.dry_run = true;
        }
        if let Some(secs) = self.debounce {
            config.debounce_secs = secs;
        }
        config.validate().context("invalid settings")?;

        println!(
            "{} Watching {}{}",
            "✓".green(),
            root.display(),
            if config.dry_run { " (dry run)" } else { "" }
        );
        start_blocking(WatchOptions {
            root: root.clone(),
            config,
            home,
        })
        .with_context(|| format!("watcher for '{}' exited with error", root.display()))?;
        Ok(())
    }
}
