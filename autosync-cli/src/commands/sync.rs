//! `autosync sync [ROOT]`: one pipeline run without watching.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;

use autosync_core::SyncOutcome;
use autosync_daemon::init_tracing;
use autosync_sync::{CommandRunner, DryRunRunner, ProcessRunner, RunnerRegistry, SyncPipeline};

use super::{load_config, resolve_root};

/// Run the pipeline once and exit.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Git working tree to sync. Defaults to the current directory.
    #[arg(default_value = ".")]
    pub root: PathBuf,

    /// Read settings from this file instead of the usual lookup.
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log the git commands instead of running them.
    #[arg(long)]
    pub dry_run: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        init_tracing();
        let root = resolve_root(&self.root)?;
        let config = load_config(&root, self.config.as_deref())?.config;
        let dry_run = self.dry_run || config.dry_run;

        let registry = Arc::new(RunnerRegistry::new());
        let runner: Box<dyn CommandRunner> = if dry_run {
            Box::new(DryRunRunner::new(registry))
        } else {
            Box::new(ProcessRunner::new(&root, registry))
        };

        let outcome = SyncPipeline::from_config(&config).run(runner.as_ref());
        let prefix = if dry_run { "[dry-run] " } else { "" };
        match outcome {
            SyncOutcome::Pushed => println!("{prefix}{} Changes pushed", "✓".green()),
            SyncOutcome::CommitNoop | SyncOutcome::NoChanges => {
                println!("{prefix}{} Nothing to commit", "✓".green())
            }
            failed => bail!("sync did not complete: {failed}"),
        }
        Ok(())
    }
}
