use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::Instant;

use autosync_core::{Config, SyncReport, SyncTrigger};
use autosync_sync::{CommandRunner, DryRunRunner, ProcessRunner, RunnerRegistry, SyncPipeline};

use crate::debounce::Debouncer;
use crate::error::{io_err, DaemonError};
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::paths::{canonical_root, run_dir, socket_path};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::watch::{forward_events, Subscription};

/// One queued pipeline run. Manual requests carry a channel for the report.
pub struct SyncJob {
    pub trigger: SyncTrigger,
    respond_to: Option<oneshot::Sender<SyncReport>>,
}

impl SyncJob {
    pub fn new(trigger: SyncTrigger) -> Self {
        Self {
            trigger,
            respond_to: None,
        }
    }
}

/// Everything needed to run one watcher instance.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub root: PathBuf,
    pub config: Config,
    /// Base for `~/.autosync/run`. Tests point this at a temp dir.
    pub home: PathBuf,
}

/// Snapshot served over the control socket's `status` command.
#[derive(Debug, Clone, Serialize)]
pub struct WatchStatus {
    pub root: PathBuf,
    pub started_at: DateTime<Utc>,
    pub dry_run: bool,
    pub debounce_ms: u128,
    pub syncs: u64,
    pub last_sync: Option<SyncReport>,
}

impl WatchStatus {
    fn new(root: PathBuf, config: &Config) -> Self {
        Self {
            root,
            started_at: Utc::now(),
            dry_run: config.dry_run,
            debounce_ms: config.debounce().as_millis(),
            syncs: 0,
            last_sync: None,
        }
    }

    fn record(&mut self, report: SyncReport) {
        self.syncs += 1;
        self.last_sync = Some(report);
    }
}

/// Build a runtime, run the watcher on it and block until it exits.
pub fn start_blocking(options: WatchOptions) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(options))
}

/// Watch `options.root` until ctrl-c, a `stop` request, or a fatal watch
/// error. The last case is returned as an error after a clean shutdown.
pub async fn run(options: WatchOptions) -> Result<(), DaemonError> {
    let WatchOptions { root, config, home } = options;
    config.validate()?;
    let root = canonical_root(&root);
    ensure_runtime_dirs(&home)?;

    // Bind first so a second instance on the same root fails before it
    // subscribes or touches git.
    let socket = socket_path(&home, &root);
    prepare_socket_for_bind(&socket)?;
    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    let registry = Arc::new(RunnerRegistry::new());
    let runner: Arc<dyn CommandRunner> = if config.dry_run {
        Arc::new(DryRunRunner::new(Arc::clone(&registry)))
    } else {
        Arc::new(ProcessRunner::new(&root, Arc::clone(&registry)))
    };
    let pipeline = Arc::new(SyncPipeline::from_config(&config));

    let (sync_tx, sync_rx) = mpsc::channel::<SyncJob>(1);
    let debouncer = Arc::new(Debouncer::new(config.debounce(), sync_tx.clone()));
    let lifecycle = Arc::new(Lifecycle::new(
        Arc::clone(&debouncer),
        Arc::clone(&registry),
        config.terminate_grace(),
    ));
    let status = Arc::new(RwLock::new(WatchStatus::new(root.clone(), &config)));

    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let mut control_rx = shutdown_tx.subscribe();

    let (subscription, events) = match Subscription::subscribe(&root) {
        Ok(pair) => pair,
        Err(err) => {
            let _ = fs::remove_file(&socket);
            return Err(err);
        }
    };
    lifecycle.start(subscription)?;
    tracing::info!(
        root = %root.display(),
        debounce_ms = config.debounce().as_millis() as u64,
        dry_run = config.dry_run,
        "watching for changes, press ctrl-c to stop",
    );

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let rules = config.ignore_rules();
        let debouncer = Arc::clone(&debouncer);
        tokio::spawn(async move {
            let result = forward_events(events, rules, debouncer).await;
            if let Err(err) = &result {
                tracing::error!(error = %err, "file watching failed, shutting down");
            }
            let _ = shutdown.send(());
            result
        })
    };

    // Receivers are subscribed before spawning so none can miss an early
    // shutdown.
    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        let lifecycle = Arc::clone(&lifecycle);
        let status = Arc::clone(&status);
        tokio::spawn(async move {
            let result = sync_processor_task(
                pipeline,
                runner,
                lifecycle,
                status,
                sync_rx,
                shutdown_rx,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let lifecycle = Arc::clone(&lifecycle);
        let status = Arc::clone(&status);
        let shutdown_rx = shutdown_tx.subscribe();
        let sync_tx = sync_tx.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                listener,
                socket,
                status,
                lifecycle,
                sync_tx,
                shutdown.clone(),
                shutdown_rx,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    // Only the debouncer and socket tasks may enqueue; dropping ours lets the
    // processor observe a closed queue once they are gone.
    drop(sync_tx);
    drop(debouncer);

    let _ = control_rx.recv().await;
    lifecycle.stop().await;

    let (watcher_result, processor_result, socket_result, signal_result) = tokio::join!(
        watcher_handle,
        processor_handle,
        socket_handle,
        signal_handle
    );

    handle_join("watcher", watcher_result)?;
    handle_join("sync_processor", processor_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn sync_processor_task(
    pipeline: Arc<SyncPipeline>,
    runner: Arc<dyn CommandRunner>,
    lifecycle: Arc<Lifecycle>,
    status: Arc<RwLock<WatchStatus>>,
    mut sync_rx: mpsc::Receiver<SyncJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = sync_rx.recv() => {
                let Some(job) = maybe_job else { break };
                if !lifecycle.is_running() {
                    tracing::debug!("stop requested, dropping queued sync");
                    break;
                }

                tracing::info!(trigger = %job.trigger, "change detected, committing and pushing");
                let started = Instant::now();
                let pipeline = Arc::clone(&pipeline);
                let runner = Arc::clone(&runner);
                let outcome = tokio::task::spawn_blocking(move || pipeline.run(runner.as_ref()))
                    .await
                    .map_err(|err| DaemonError::Protocol(format!("sync task join error: {err}")))?;

                let report = SyncReport {
                    outcome,
                    trigger: job.trigger,
                    finished_at: Utc::now(),
                    duration_ms: started.elapsed().as_millis(),
                };
                if outcome.is_success() {
                    tracing::info!(outcome = %outcome, duration_ms = report.duration_ms as u64, "sync finished");
                } else {
                    tracing::warn!(outcome = %outcome, duration_ms = report.duration_ms as u64, "sync did not complete");
                }
                status.write().await.record(report.clone());

                if let Some(respond_to) = job.respond_to {
                    let _ = respond_to.send(report);
                }
            }
        }
    }

    Ok(())
}

async fn socket_server_task(
    listener: UnixListener,
    socket: PathBuf,
    status: Arc<RwLock<WatchStatus>>,
    lifecycle: Arc<Lifecycle>,
    sync_tx: mpsc::Sender<SyncJob>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let status = Arc::clone(&status);
                let lifecycle = Arc::clone(&lifecycle);
                let sync_tx = sync_tx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(
                        stream,
                        status,
                        lifecycle,
                        sync_tx,
                        shutdown_tx,
                    ).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    status: Arc<RwLock<WatchStatus>>,
    lifecycle: Arc<Lifecycle>,
    sync_tx: mpsc::Sender<SyncJob>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("control socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = match request.cmd.as_str() {
            "status" => {
                let payload = build_status_payload(&status, lifecycle.state()).await;
                DaemonResponse::ok(payload)
            }
            "sync" => {
                if lifecycle.is_running() {
                    match enqueue_manual_sync(&sync_tx).await {
                        Ok(report) => DaemonResponse::ok(json!(report)),
                        Err(err) => DaemonResponse::error(err.to_string()),
                    }
                } else {
                    DaemonResponse::error(format!("not accepting syncs while {}", lifecycle.state()))
                }
            }
            "stop" => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };
        write_response(&mut writer, &response).await?;
        if request.cmd == "stop" {
            break;
        }
    }

    Ok(())
}

async fn build_status_payload(status: &RwLock<WatchStatus>, state: LifecycleState) -> Value {
    let snapshot = status.read().await.clone();
    json!({
        "running": state == LifecycleState::Running,
        "state": state,
        "root": snapshot.root.display().to_string(),
        "pid": std::process::id(),
        "started_at": snapshot.started_at,
        "dry_run": snapshot.dry_run,
        "debounce_ms": snapshot.debounce_ms as u64,
        "syncs": snapshot.syncs,
        "last_sync": snapshot.last_sync,
    })
}

async fn enqueue_manual_sync(sync_tx: &mpsc::Sender<SyncJob>) -> Result<SyncReport, DaemonError> {
    let (tx, rx) = oneshot::channel();
    sync_tx
        .send(SyncJob {
            trigger: SyncTrigger::Manual,
            respond_to: Some(tx),
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("sync queue"))?;
    rx.await
        .map_err(|_| DaemonError::ChannelClosed("sync response"))
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::AlreadyRunning {
                socket: socket.to_path_buf(),
            });
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale control socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let run = run_dir(home);
    if !run.exists() {
        fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("control socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("control socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("control socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

/// Install the fmt subscriber. `RUST_LOG` overrides the default `info`.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
