//! Domain types shared by the filter, pipeline and daemon.
//!
//! Everything here is plain data: no I/O, no clocks beyond the timestamp
//! carried by [`SyncReport`].

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// FileEvent
// ---------------------------------------------------------------------------

/// A single filesystem change as reported by the subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub is_directory: bool,
}

impl FileEvent {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_directory: false,
        }
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_directory: true,
        }
    }
}

// ---------------------------------------------------------------------------
// CommandResult
// ---------------------------------------------------------------------------

/// Captured result of one external command invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    /// Exit code reported when the process could not be launched at all
    /// (same convention as a shell's "command not found").
    pub const LAUNCH_FAILURE: i32 = 127;

    /// Exit code reported when the process was killed, or refused because the
    /// runner had already been shut down.
    pub const TERMINATED: i32 = -1;

    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn launch_failure(diagnostic: impl Into<String>) -> Self {
        Self::new(Self::LAUNCH_FAILURE, String::new(), diagnostic)
    }

    pub fn terminated(diagnostic: impl Into<String>) -> Self {
        Self::new(Self::TERMINATED, String::new(), diagnostic)
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn was_terminated(&self) -> bool {
        self.exit_code == Self::TERMINATED
    }

    /// stdout followed by stderr, newline-separated.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            return self.stdout.clone();
        }
        if self.stdout.is_empty() {
            return self.stderr.clone();
        }
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

// ---------------------------------------------------------------------------
// SyncOutcome
// ---------------------------------------------------------------------------

/// Classification of one completed sync pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The preflight status check found a clean working tree.
    NoChanges,
    /// Every stage succeeded and the remote now has the local commit.
    Pushed,
    /// The commit stage failed for a reason other than "nothing to commit".
    StageFailed,
    /// The commit stage found nothing staged.
    CommitNoop,
    /// Fetch-and-rebase onto the remote failed; nothing was pushed.
    IntegrateFailed,
    /// The push was rejected or failed. Also reported when the local commit
    /// was made but shutdown began before push could start, in which case
    /// push never ran and the commit is still only local.
    PushFailed,
}

impl SyncOutcome {
    /// `true` for outcomes that leave local and remote consistent.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Pushed | Self::CommitNoop | Self::NoChanges)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoChanges => "no_changes",
            Self::Pushed => "pushed",
            Self::StageFailed => "stage_failed",
            Self::CommitNoop => "commit_noop",
            Self::IntegrateFailed => "integrate_failed",
            Self::PushFailed => "push_failed",
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SyncReport
// ---------------------------------------------------------------------------

/// What caused a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    /// The debounce window elapsed after filesystem activity.
    Debounced,
    /// Requested explicitly (control socket or `autosync sync`).
    Manual,
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debounced => f.write_str("debounced"),
            Self::Manual => f.write_str("manual"),
        }
    }
}

/// Record of one finished pipeline run, kept by the daemon for `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    pub trigger: SyncTrigger,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u128,
}
