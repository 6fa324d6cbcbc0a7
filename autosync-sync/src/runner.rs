//! External command execution with shutdown-aware bookkeeping.
//!
//! Every [`ProcessRunner::execute`] call owns its child process for the whole
//! invocation but parks it in the shared [`RunnerRegistry`] while it runs, so
//! [`RunnerRegistry::terminate_all`] can kill it from another thread. The
//! owning call polls `try_wait` through the registry and is always the one that
//! reaps and deregisters the child.
//!
//! Output is drained by one reader thread per stream. A killed command only
//! waits a bounded time for those readers, because a grandchild (ssh, a
//! credential helper) can inherit the pipes and keep them open long after
//! git itself is gone.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use autosync_core::CommandResult;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
/// How long a killed command keeps collecting output when no grace period
/// was set by [`RunnerRegistry::terminate_all`].
const OUTPUT_GRACE: Duration = Duration::from_millis(500);
const READ_CHUNK: usize = 8 * 1024;

// ---------------------------------------------------------------------------
// CommandRunner
// ---------------------------------------------------------------------------

/// Runs one argv to completion. Never fails: launch errors and kills are
/// folded into the returned [`CommandResult`].
pub trait CommandRunner: Send + Sync {
    fn execute(&self, argv: &[String]) -> CommandResult;

    /// `true` once shutdown has begun; no further command will be started.
    fn is_closed(&self) -> bool {
        false
    }
}

/// `git commit -m "Auto update"` style rendering for logs.
pub fn describe(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                format!("{arg:?}")
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// RunnerRegistry
// ---------------------------------------------------------------------------

struct InFlight {
    child: Child,
    killed: bool,
}

#[derive(Default)]
struct RegistryState {
    closed: bool,
    grace: Option<Duration>,
    next_id: u64,
    children: HashMap<u64, InFlight>,
}

/// The set of currently running child processes.
///
/// Once closed (by [`close`](Self::close) or
/// [`terminate_all`](Self::terminate_all)) the registry refuses new
/// registrations, which is what stops a half-finished pipeline from launching
/// its next stage during shutdown.
#[derive(Default)]
pub struct RunnerRegistry {
    state: Mutex<RegistryState>,
}

impl std::fmt::Debug for RunnerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("RunnerRegistry")
            .field("closed", &state.closed)
            .field("in_flight", &state.children.len())
            .finish()
    }
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Refuse every later command without touching the ones already running.
    pub fn close(&self) {
        self.lock().closed = true;
    }

    /// Number of children currently registered.
    pub fn in_flight(&self) -> usize {
        self.lock().children.len()
    }

    /// Close the registry, kill every registered child, then wait up to
    /// `grace` for the owning invocations to reap them.
    ///
    /// Returns how many children were signalled. Never blocks past `grace`.
    pub fn terminate_all(&self, grace: Duration) -> usize {
        let signalled = {
            let mut state = self.lock();
            state.closed = true;
            state.grace = Some(grace);
            let mut signalled = 0usize;
            for (id, entry) in state.children.iter_mut() {
                if entry.killed {
                    continue;
                }
                entry.killed = true;
                match entry.child.kill() {
                    Ok(()) => {
                        signalled += 1;
                        tracing::info!("terminating in-flight command #{id} (pid {})", entry.child.id());
                    }
                    // Already exited; the owner will reap it on its next poll.
                    Err(err) if err.kind() == std::io::ErrorKind::InvalidInput => {}
                    Err(err) => tracing::warn!("failed to kill command #{id}: {err}"),
                }
            }
            signalled
        };

        let deadline = Instant::now() + grace;
        while self.in_flight() > 0 && Instant::now() < deadline {
            thread::sleep(POLL_INTERVAL);
        }
        let remaining = self.in_flight();
        if remaining > 0 {
            tracing::warn!(
                "{remaining} command(s) still exiting after {}ms grace period",
                grace.as_millis()
            );
        }
        signalled
    }

    fn register(&self, child: Child) -> Result<u64, Child> {
        let mut state = self.lock();
        if state.closed {
            return Err(child);
        }
        let id = state.next_id;
        state.next_id += 1;
        state.children.insert(
            id,
            InFlight {
                child,
                killed: false,
            },
        );
        Ok(id)
    }

    fn try_wait(&self, id: u64) -> std::io::Result<Option<ExitStatus>> {
        let mut state = self.lock();
        match state.children.get_mut(&id) {
            Some(entry) => entry.child.try_wait(),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("command #{id} is not registered"),
            )),
        }
    }

    fn deregister(&self, id: u64) -> Option<InFlight> {
        self.lock().children.remove(&id)
    }

    fn output_grace(&self) -> Duration {
        self.lock().grace.unwrap_or(OUTPUT_GRACE)
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// ProcessRunner
// ---------------------------------------------------------------------------

/// Runs commands as child processes in a fixed working directory.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    workdir: PathBuf,
    registry: Arc<RunnerRegistry>,
}

impl ProcessRunner {
    pub fn new(workdir: impl Into<PathBuf>, registry: Arc<RunnerRegistry>) -> Self {
        Self {
            workdir: workdir.into(),
            registry,
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn registry(&self) -> &Arc<RunnerRegistry> {
        &self.registry
    }
}

impl CommandRunner for ProcessRunner {
    fn execute(&self, argv: &[String]) -> CommandResult {
        let Some((program, args)) = argv.split_first() else {
            return CommandResult::launch_failure("empty command line");
        };
        let rendered = describe(argv);

        if self.registry.is_closed() {
            tracing::debug!("not starting `{rendered}`: runner is shut down");
            return CommandResult::terminated(format!(
                "`{rendered}` not started: shutdown in progress"
            ));
        }

        tracing::debug!("running `{rendered}` in {}", self.workdir.display());
        let spawned = Command::new(program)
            .args(args)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(err) => {
                tracing::error!("failed to launch `{rendered}`: {err}");
                return CommandResult::launch_failure(format!(
                    "failed to launch `{rendered}`: {err}"
                ));
            }
        };

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let id = match self.registry.register(child) {
            Ok(id) => id,
            Err(mut child) => {
                // Shutdown began between the closed check and registration.
                let _ = child.kill();
                let _ = child.wait();
                return CommandResult::terminated(format!(
                    "`{rendered}` not started: shutdown in progress"
                ));
            }
        };

        let waited = loop {
            match self.registry.try_wait(id) {
                Ok(Some(status)) => break Ok(status),
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(err) => break Err(err),
            }
        };

        let killed = match self.registry.deregister(id) {
            Some(mut entry) => {
                if waited.is_err() {
                    let _ = entry.child.kill();
                    let _ = entry.child.wait();
                }
                entry.killed
            }
            None => false,
        };

        // A clean exit closes both pipes unless something detached still holds
        // them, so only killed or unwaitable commands get a deadline.
        let deadline = (killed || waited.is_err())
            .then(|| Instant::now() + self.registry.output_grace());
        let stdout = collect(stdout, deadline);
        let mut stderr = collect(stderr, deadline);

        match waited {
            Ok(_) if killed => {
                push_line(&mut stderr, "terminated during shutdown");
                CommandResult::new(CommandResult::TERMINATED, stdout, stderr)
            }
            Ok(status) => CommandResult::new(
                status.code().unwrap_or(CommandResult::TERMINATED),
                stdout,
                stderr,
            ),
            Err(err) => {
                tracing::error!("failed to wait for `{rendered}`: {err}");
                push_line(&mut stderr, &format!("failed to wait for process: {err}"));
                CommandResult::new(CommandResult::TERMINATED, stdout, stderr)
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.registry.is_closed()
    }
}

/// Forward everything read from `source` as chunks until EOF. The thread is
/// detached; if nobody is listening any more it exits on its next read.
fn drain<R>(source: Option<R>) -> Option<Receiver<Vec<u8>>>
where
    R: Read + Send + 'static,
{
    source.map(|mut source| {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut chunk = vec![0u8; READ_CHUNK];
            loop {
                match source.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(chunk[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                    Err(_) => break,
                }
            }
        });
        rx
    })
}

/// Gather chunks until the reader hangs up or, with a deadline, until it
/// passes. Whatever arrived by then is the output.
fn collect(output: Option<Receiver<Vec<u8>>>, deadline: Option<Instant>) -> String {
    let mut buf = Vec::new();
    if let Some(rx) = output {
        loop {
            let chunk = match deadline {
                None => rx.recv().ok(),
                Some(deadline) => rx
                    .recv_timeout(deadline.saturating_duration_since(Instant::now()))
                    .ok(),
            };
            match chunk {
                Some(chunk) => buf.extend_from_slice(&chunk),
                None => break,
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn push_line(buf: &mut String, line: &str) {
    if !buf.is_empty() && !buf.ends_with('\n') {
        buf.push('\n');
    }
    buf.push_str(line);
}

// ---------------------------------------------------------------------------
// DryRunRunner
// ---------------------------------------------------------------------------

/// Logs each command instead of running it and reports success.
///
/// Shares the registry with the real runner so shutdown still closes it.
#[derive(Debug, Clone)]
pub struct DryRunRunner {
    registry: Arc<RunnerRegistry>,
}

impl DryRunRunner {
    pub fn new(registry: Arc<RunnerRegistry>) -> Self {
        Self { registry }
    }
}

impl CommandRunner for DryRunRunner {
    fn execute(&self, argv: &[String]) -> CommandResult {
        if self.registry.is_closed() {
            return CommandResult::terminated("shutdown in progress");
        }
        tracing::info!("[dry-run] would run: {}", describe(argv));
        CommandResult::new(0, String::new(), String::new())
    }

    fn is_closed(&self) -> bool {
        self.registry.is_closed()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
