//! Static configuration, loaded once at startup.
//!
//! # Lookup order
//!
//! ```text
//! --config <path>                        (explicit; must exist)
//! <root>/.autosync.yaml                  (per-checkout)
//! <config_dir>/autosync/config.yaml      (per-user, via dirs::config_dir)
//! built-in defaults
//! ```
//!
//! # API pattern
//!
//! As with the rest of the workspace, the lookup has two forms:
//! - `load_at(root, explicit, config_dir)`: explicit user config dir; used in tests
//! - `load(root, explicit)`: derives the user config dir from `dirs::config_dir()`

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};

/// Per-checkout config file name.
pub const CONFIG_FILE_NAME: &str = ".autosync.yaml";

/// Commented template written by `autosync init`. Parses to [`Config::default`].
pub const DEFAULT_CONFIG_YAML: &str = r#"# autosync configuration
#
# Path segments that make an event irrelevant wherever they appear.
ignored_dir_segments:
  - .git
  - .vscode
  - __pycache__
# Path suffixes that make an event irrelevant.
ignored_extensions:
  - .swp
  - .tmp
  - .log
# Quiet window in seconds; every relevant event restarts it.
debounce_secs: 2.0
commit_message: Auto update
git_program: git
# Run `git status --porcelain` first and skip the cycle on a clean tree.
preflight_status: false
# How long shutdown waits for killed git processes to exit.
terminate_grace_ms: 2000
# Log the git commands instead of running them.
dry_run: false
"#;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub ignored_dir_segments: BTreeSet<String>,
    pub ignored_extensions: BTreeSet<String>,
    pub debounce_secs: f64,
    pub commit_message: String,
    pub git_program: String,
    pub preflight_status: bool,
    pub terminate_grace_ms: u64,
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ignored_dir_segments: [".git", ".vscode", "__pycache__"]
                .into_iter()
                .map(String::from)
                .collect(),
            ignored_extensions: [".swp", ".tmp", ".log"]
                .into_iter()
                .map(String::from)
                .collect(),
            debounce_secs: 2.0,
            commit_message: "Auto update".to_string(),
            git_program: "git".to_string(),
            preflight_status: false,
            terminate_grace_ms: 2000,
            dry_run: false,
        }
    }
}

impl Config {
    /// Reject values that would make the watcher misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.debounce_secs.is_finite() || self.debounce_secs <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "debounce_secs must be a positive number of seconds, got {}",
                self.debounce_secs
            )));
        }
        if Duration::try_from_secs_f64(self.debounce_secs).is_err() {
            return Err(ConfigError::Invalid(format!(
                "debounce_secs is too large to be a delay, got {}",
                self.debounce_secs
            )));
        }
        if self.commit_message.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "commit_message must not be empty".to_string(),
            ));
        }
        if self.git_program.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "git_program must not be empty".to_string(),
            ));
        }
        if let Some(segment) = self
            .ignored_dir_segments
            .iter()
            .find(|s| s.is_empty() || s.contains(std::path::MAIN_SEPARATOR))
        {
            return Err(ConfigError::Invalid(format!(
                "ignored_dir_segments entries must be single path segments, got '{segment}'"
            )));
        }
        if self.ignored_extensions.iter().any(String::is_empty) {
            return Err(ConfigError::Invalid(
                "ignored_extensions entries must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Quiet window as a [`Duration`]. Only meaningful on a validated config.
    pub fn debounce(&self) -> Duration {
        Duration::from_secs_f64(self.debounce_secs)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }

    pub fn ignore_rules(&self) -> IgnoreRules {
        IgnoreRules {
            ignored_dir_segments: self.ignored_dir_segments.clone(),
            ignored_extensions: self.ignored_extensions.clone(),
        }
    }

    pub fn git_commands(&self) -> GitCommands {
        GitCommands::new(&self.git_program, &self.commit_message)
    }
}

// ---------------------------------------------------------------------------
// IgnoreRules
// ---------------------------------------------------------------------------

/// Immutable ignore configuration consumed by [`crate::filter::is_relevant`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreRules {
    pub ignored_dir_segments: BTreeSet<String>,
    pub ignored_extensions: BTreeSet<String>,
}

impl IgnoreRules {
    pub fn new<S, E>(segments: S, extensions: E) -> Self
    where
        S: IntoIterator,
        S::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        Self {
            ignored_dir_segments: segments.into_iter().map(Into::into).collect(),
            ignored_extensions: extensions.into_iter().map(Into::into).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// GitCommands
// ---------------------------------------------------------------------------

/// argv for each pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommands {
    pub preflight: Vec<String>,
    pub stage: Vec<String>,
    pub commit: Vec<String>,
    pub integrate: Vec<String>,
    pub push: Vec<String>,
}

impl GitCommands {
    pub fn new(program: &str, commit_message: &str) -> Self {
        let argv = |args: &[&str]| -> Vec<String> {
            std::iter::once(program)
                .chain(args.iter().copied())
                .map(String::from)
                .collect()
        };
        Self {
            preflight: argv(&["status", "--porcelain"]),
            stage: argv(&["add", "."]),
            commit: argv(&["commit", "-m", commit_message]),
            integrate: argv(&["pull", "--rebase"]),
            push: argv(&["push"]),
        }
    }
}

impl Default for GitCommands {
    fn default() -> Self {
        Config::default().git_commands()
    }
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// A loaded config and the file it came from (`None` for built-in defaults).
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedConfig {
    pub config: Config,
    pub source: Option<PathBuf>,
}

/// `<root>/.autosync.yaml`: pure, no I/O.
pub fn local_config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE_NAME)
}

/// `<config_dir>/autosync/config.yaml`: pure, no I/O.
pub fn user_config_path(config_dir: &Path) -> PathBuf {
    config_dir.join("autosync").join("config.yaml")
}

/// Parse and validate a single config file.
///
/// Returns `ConfigError::Io` if unreadable and `ConfigError::Parse` (with
/// path + line context) if malformed.
pub fn load_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let config: Config = if contents.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?
    };
    config.validate()?;
    Ok(config)
}

/// Resolve and load the effective config for `root`.
pub fn load_at(
    root: &Path,
    explicit: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig, ConfigError> {
    if let Some(path) = explicit {
        return Ok(LoadedConfig {
            config: load_file(path)?,
            source: Some(path.to_path_buf()),
        });
    }

    let candidates = std::iter::once(local_config_path(root))
        .chain(config_dir.map(user_config_path));
    for path in candidates {
        if path.is_file() {
            return Ok(LoadedConfig {
                config: load_file(&path)?,
                source: Some(path),
            });
        }
    }

    Ok(LoadedConfig {
        config: Config::default(),
        source: None,
    })
}

/// `load_at` convenience wrapper using `dirs::config_dir()`.
pub fn load(root: &Path, explicit: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    load_at(root, explicit, dirs::config_dir().as_deref())
}

/// Write the commented default template to `<root>/.autosync.yaml`.
///
/// Refuses to overwrite an existing file unless `force` is set. Write flow:
/// `.tmp` sibling → `rename`, so a crash never leaves a half-written config.
pub fn write_default_at(root: &Path, force: bool) -> Result<PathBuf, ConfigError> {
    let path = local_config_path(root);
    if path.exists() && !force {
        return Err(ConfigError::Invalid(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    let tmp = path.with_file_name(format!("{CONFIG_FILE_NAME}.tmp"));
    std::fs::write(&tmp, DEFAULT_CONFIG_YAML).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(path)
}

/// Home directory, for callers that place runtime files under it.
pub fn home_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
