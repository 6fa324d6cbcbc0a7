//! Shared sync pipeline entrypoint used by the CLI and the daemon.
//!
//! Stage order is fixed: stage → commit → integrate → push. The first stage
//! that fails (or finds nothing to commit) ends the run, so a failed rebase is
//! never followed by a push.

use std::fmt;

use autosync_core::{CommandResult, Config, GitCommands, SyncOutcome};

use crate::runner::{describe, CommandRunner};

/// Substrings git prints when a commit finds nothing staged.
pub const NOTHING_TO_COMMIT_MARKERS: &[&str] = &[
    "nothing to commit",
    "nothing added to commit",
    "no changes added to commit",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Preflight,
    Stage,
    Commit,
    Integrate,
    Push,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Preflight => "preflight",
            Stage::Stage => "stage",
            Stage::Commit => "commit",
            Stage::Integrate => "integrate",
            Stage::Push => "push",
        })
    }
}

impl Stage {
    /// Outcome reported when shutdown prevents this stage from starting.
    fn interrupted_outcome(self) -> SyncOutcome {
        match self {
            Stage::Preflight | Stage::Stage | Stage::Commit => SyncOutcome::StageFailed,
            Stage::Integrate => SyncOutcome::IntegrateFailed,
            Stage::Push => SyncOutcome::PushFailed,
        }
    }
}

/// The add → commit → pull --rebase → push sequence for one checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPipeline {
    commands: GitCommands,
    preflight: bool,
}

impl SyncPipeline {
    pub fn new(commands: GitCommands) -> Self {
        Self {
            commands,
            preflight: false,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.git_commands()).with_preflight(config.preflight_status)
    }

    /// Run `status --porcelain` first and report [`SyncOutcome::NoChanges`]
    /// on a clean tree.
    pub fn with_preflight(mut self, enabled: bool) -> Self {
        self.preflight = enabled;
        self
    }

    pub fn commands(&self) -> &GitCommands {
        &self.commands
    }

    /// Run every stage in order through `runner`, stopping at the first
    /// failure or no-op.
    pub fn run(&self, runner: &dyn CommandRunner) -> SyncOutcome {
        if self.preflight {
            let Some(status) = self.step(runner, Stage::Preflight, &self.commands.preflight) else {
                return Stage::Preflight.interrupted_outcome();
            };
            if status.success() && status.stdout.trim().is_empty() {
                tracing::info!("working tree clean, nothing to sync");
                return SyncOutcome::NoChanges;
            }
        }

        // Staging with nothing to stage is not an error; the commit decides.
        if self
            .step(runner, Stage::Stage, &self.commands.stage)
            .is_none()
        {
            return Stage::Stage.interrupted_outcome();
        }

        let Some(commit) = self.step(runner, Stage::Commit, &self.commands.commit) else {
            return Stage::Commit.interrupted_outcome();
        };
        if is_nothing_to_commit(&commit) {
            tracing::info!("no new changes to commit");
            return SyncOutcome::CommitNoop;
        }
        if !commit.success() {
            log_failure(Stage::Commit, &commit);
            return SyncOutcome::StageFailed;
        }

        let Some(integrate) = self.step(runner, Stage::Integrate, &self.commands.integrate) else {
            return Stage::Integrate.interrupted_outcome();
        };
        if !integrate.success() {
            log_failure(Stage::Integrate, &integrate);
            return SyncOutcome::IntegrateFailed;
        }

        let Some(push) = self.step(runner, Stage::Push, &self.commands.push) else {
            return Stage::Push.interrupted_outcome();
        };
        if !push.success() {
            log_failure(Stage::Push, &push);
            return SyncOutcome::PushFailed;
        }

        tracing::info!("changes pushed");
        SyncOutcome::Pushed
    }

    /// `None` when the runner has been closed and the stage was not started.
    fn step(
        &self,
        runner: &dyn CommandRunner,
        stage: Stage,
        argv: &[String],
    ) -> Option<CommandResult> {
        if runner.is_closed() {
            tracing::warn!("shutdown in progress, skipping {stage} stage");
            return None;
        }
        tracing::debug!("{stage}: {}", describe(argv));
        let result = runner.execute(argv);
        if !result.success() {
            tracing::debug!("{stage} exited with {}", result.exit_code);
        }
        Some(result)
    }
}

impl Default for SyncPipeline {
    fn default() -> Self {
        Self::new(GitCommands::default())
    }
}

/// `true` if the commit output says there was nothing staged.
pub fn is_nothing_to_commit(result: &CommandResult) -> bool {
    let output = result.combined_output();
    NOTHING_TO_COMMIT_MARKERS
        .iter()
        .any(|marker| output.contains(marker))
}

fn log_failure(stage: Stage, result: &CommandResult) {
    let detail = result.stderr.trim();
    let detail = if detail.is_empty() {
        result.stdout.trim()
    } else {
        detail
    };
    match stage {
        Stage::Push => tracing::error!("push failed (exit {}): {detail}", result.exit_code),
        _ => tracing::warn!("{stage} failed (exit {}): {detail}", result.exit_code),
    }
}
