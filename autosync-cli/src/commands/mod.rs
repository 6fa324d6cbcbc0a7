pub mod init;
pub mod status;
pub mod stop;
pub mod sync;
pub mod watch;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use autosync_core::config::{self, LoadedConfig};

/// Canonical form of the ROOT argument; must be an existing directory.
pub(crate) fn resolve_root(root: &Path) -> Result<PathBuf> {
    let resolved = root
        .canonicalize()
        .with_context(|| format!("cannot resolve path '{}'", root.display()))?;
    if !resolved.is_dir() {
        anyhow::bail!("'{}' is not a directory", resolved.display());
    }
    Ok(resolved)
}

pub(crate) fn home() -> Result<PathBuf> {
    config::home_dir().context("could not determine home directory")
}

pub(crate) fn load_config(root: &Path, explicit: Option<&Path>) -> Result<LoadedConfig> {
    let loaded = config::load(root, explicit).context("failed to load configuration")?;
    if let Some(source) = &loaded.source {
        tracing::debug!(path = %source.display(), "loaded configuration");
    }
    Ok(loaded)
}
