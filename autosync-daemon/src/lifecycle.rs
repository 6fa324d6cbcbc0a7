//! Starting → Running → Stopping → Stopped.
//!
//! Entering `Stopping` closes the command registry in the same step, so a
//! pipeline that is already running cannot launch its next git command.
//! `stop` then tears down in a fixed order: debouncer (no new sync can be
//! scheduled), every in-flight git process, the filesystem subscription.
//! Once it returns, no git command is running and none will be started by
//! this process.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use autosync_sync::RunnerRegistry;

use crate::debounce::Debouncer;
use crate::error::DaemonError;
use crate::watch::Subscription;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        })
    }
}

pub struct Lifecycle {
    state: Mutex<LifecycleState>,
    debouncer: Arc<Debouncer>,
    registry: Arc<RunnerRegistry>,
    subscription: Mutex<Option<Subscription>>,
    grace: Duration,
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("state", &self.state())
            .field("grace", &self.grace)
            .finish()
    }
}

impl Lifecycle {
    pub fn new(debouncer: Arc<Debouncer>, registry: Arc<RunnerRegistry>, grace: Duration) -> Self {
        Self {
            state: Mutex::new(LifecycleState::Starting),
            debouncer,
            registry,
            subscription: Mutex::new(None),
            grace,
        }
    }

    pub fn state(&self) -> LifecycleState {
        *lock(&self.state)
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// Take ownership of the live subscription and enter `Running`.
    pub fn start(&self, subscription: Subscription) -> Result<(), DaemonError> {
        let mut state = lock(&self.state);
        if *state != LifecycleState::Starting {
            return Err(DaemonError::Lifecycle(format!("cannot start while {}", *state)));
        }
        *lock(&self.subscription) = Some(subscription);
        *state = LifecycleState::Running;
        Ok(())
    }

    /// Shut everything down. Returns `false` when another caller already did
    /// (or is doing) it.
    pub async fn stop(&self) -> bool {
        if !self.begin_stop() {
            return false;
        }
        tracing::info!("stopping, no further syncs will start");

        self.debouncer.stop();

        let registry = Arc::clone(&self.registry);
        let grace = self.grace;
        match tokio::task::spawn_blocking(move || registry.terminate_all(grace)).await {
            Ok(0) => {}
            Ok(killed) => tracing::warn!(killed, "terminated in-flight git commands"),
            Err(err) => {
                tracing::error!(error = %err, "terminating git commands panicked");
            }
        }

        let subscription = lock(&self.subscription).take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }

        *lock(&self.state) = LifecycleState::Stopped;
        tracing::info!("stopped cleanly");
        true
    }

    /// Enter `Stopping` and close the registry under the state lock.
    fn begin_stop(&self) -> bool {
        let mut state = lock(&self.state);
        match *state {
            LifecycleState::Starting | LifecycleState::Running => {
                *state = LifecycleState::Stopping;
                self.registry.close();
                true
            }
            LifecycleState::Stopping | LifecycleState::Stopped => false,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use autosync_sync::{CommandRunner, ProcessRunner};
    use tokio::sync::mpsc;

    use crate::runtime::SyncJob;

    type Parts = (
        Arc<Lifecycle>,
        Arc<Debouncer>,
        Arc<RunnerRegistry>,
        mpsc::Receiver<SyncJob>,
    );

    fn lifecycle() -> Parts {
        let (tx, rx) = mpsc::channel(1);
        let debouncer = Arc::new(Debouncer::new(Duration::from_millis(100), tx));
        let registry = Arc::new(RunnerRegistry::new());
        let lifecycle = Arc::new(Lifecycle::new(
            Arc::clone(&debouncer),
            Arc::clone(&registry),
            Duration::from_secs(2),
        ));
        (lifecycle, debouncer, registry, rx)
    }

    #[tokio::test]
    async fn start_then_stop_walks_every_state() {
        let (lifecycle, debouncer, registry, _rx) = lifecycle();
        assert_eq!(lifecycle.state(), LifecycleState::Starting);

        let (subscription, _stream) = Subscription::manual(Path::new("/watched"));
        lifecycle.start(subscription).expect("start");
        assert!(lifecycle.is_running());

        assert!(lifecycle.stop().await);
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
        assert!(!debouncer.is_active());
        assert!(registry.is_closed());
    }

    #[tokio::test]
    async fn second_stop_is_a_noop() {
        let (lifecycle, _debouncer, _registry, _rx) = lifecycle();
        let (subscription, _stream) = Subscription::manual(Path::new("/watched"));
        lifecycle.start(subscription).expect("start");

        assert!(lifecycle.stop().await);
        assert!(!lifecycle.stop().await);
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn cannot_restart_after_stop() {
        let (lifecycle, _debouncer, _registry, _rx) = lifecycle();
        lifecycle.stop().await;

        let (subscription, _stream) = Subscription::manual(Path::new("/watched"));
        let err = lifecycle.start(subscription).expect_err("restart");
        assert!(matches!(err, DaemonError::Lifecycle(_)));
    }

    #[tokio::test]
    async fn stop_releases_the_subscription() {
        let (lifecycle, debouncer, _registry, _rx) = lifecycle();
        let (subscription, stream) = Subscription::manual(Path::new("/watched"));
        lifecycle.start(subscription).expect("start");
        lifecycle.stop().await;

        // With the sending side gone the forwarding loop ends on its own.
        let rules = autosync_core::Config::default().ignore_rules();
        crate::watch::forward_events(stream, rules, debouncer)
            .await
            .expect("stream ends cleanly");
    }

    #[cfg(unix)]
    #[test]
    fn commands_are_refused_as_soon_as_stopping_begins() {
        let (lifecycle, _debouncer, registry, _rx) = lifecycle();
        let (subscription, _stream) = Subscription::manual(Path::new("/watched"));
        lifecycle.start(subscription).expect("start");

        // Only the state transition; the kill sweep has not run yet.
        assert!(lifecycle.begin_stop());
        assert_eq!(lifecycle.state(), LifecycleState::Stopping);
        assert!(registry.is_closed());

        let workdir = tempfile::tempdir().expect("tempdir");
        let runner = ProcessRunner::new(workdir.path(), Arc::clone(&registry));
        assert!(runner.is_closed());
        let result = runner.execute(&["touch".to_string(), "index.lock".to_string()]);
        assert!(result.was_terminated(), "got {result:?}");
        assert!(!workdir.path().join("index.lock").exists());
        assert_eq!(registry.in_flight(), 0);

        assert!(!lifecycle.begin_stop());
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_kills_in_flight_command() {
        let (lifecycle, _debouncer, registry, _rx) = lifecycle();
        let (subscription, _stream) = Subscription::manual(Path::new("/watched"));
        lifecycle.start(subscription).expect("start");

        let runner = ProcessRunner::new(std::env::temp_dir(), Arc::clone(&registry));
        let command = tokio::task::spawn_blocking(move || {
            runner.execute(&["sleep".to_string(), "30".to_string()])
        });

        for _ in 0..100 {
            if registry.in_flight() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(registry.in_flight(), 1, "sleep should be running");

        let started = std::time::Instant::now();
        assert!(lifecycle.stop().await);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(registry.in_flight(), 0);

        let result = command.await.expect("join");
        assert!(result.was_terminated());
    }
}
