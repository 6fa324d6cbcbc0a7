//! Watcher runtime: filesystem subscription, debouncer, sync processor and
//! the per-root control socket.

mod debounce;
mod error;
pub mod lifecycle;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod watch;

pub use debounce::Debouncer;
pub use error::DaemonError;
pub use lifecycle::{Lifecycle, LifecycleState};
pub use protocol::{
    request_status, request_stop, request_sync, send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{init_tracing, run, start_blocking, SyncJob, WatchOptions, WatchStatus};
pub use watch::{forward_events, EventStream, Subscription};
