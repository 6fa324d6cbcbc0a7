//! `autosync init [ROOT] [--force]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use autosync_core::config;

use super::resolve_root;

/// Write `.autosync.yaml` with the default settings.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory to place the config file in. Defaults to the current one.
    #[arg(default_value = ".")]
    pub root: PathBuf,

    /// Overwrite an existing config file.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let root = resolve_root(&self.root)?;
        let path = config::write_default_at(&root, self.force)
            .with_context(|| format!("failed to write config in '{}'", root.display()))?;

        println!("{} Wrote {}", "✓".green(), path.display());
        println!("  Edit it to change ignored paths, the debounce window or the commit message.");
        Ok(())
    }
}
