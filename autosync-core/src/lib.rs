//! autosync core library: domain types, configuration, event filter, errors.
//!
//! Public API surface:
//! - [`types`]: events, command results, sync outcomes
//! - [`config`]: [`Config`] loading and [`IgnoreRules`]
//! - [`filter`]: [`is_relevant`]
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod filter;
pub mod types;

pub use config::{Config, GitCommands, IgnoreRules, LoadedConfig};
pub use error::ConfigError;
pub use filter::is_relevant;
pub use types::{CommandResult, FileEvent, SyncOutcome, SyncReport, SyncTrigger};
