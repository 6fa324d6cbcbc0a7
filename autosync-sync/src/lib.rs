//! # autosync-sync
//!
//! External command execution and the ordered git sync pipeline.
//!
//! Build a [`ProcessRunner`] over a shared [`RunnerRegistry`], then call
//! [`SyncPipeline::run`] to stage, commit, rebase onto the remote and push.
//! Failures never escape as errors: every run ends in a
//! [`SyncOutcome`](autosync_core::SyncOutcome).

pub mod pipeline;
pub mod runner;

pub use pipeline::{is_nothing_to_commit, Stage, SyncPipeline};
pub use runner::{CommandRunner, DryRunRunner, ProcessRunner, RunnerRegistry};
