//! Recursive filesystem subscription on the watched root.
//!
//! The notify callback only forwards raw events into an unbounded channel;
//! classification and filtering happen on the async side in
//! [`forward_events`]. Dropping the subscription drops the notify watcher and
//! with it the channel sender, which ends the forwarding loop.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::{CreateKind, RemoveKind};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use autosync_core::{is_relevant, FileEvent, IgnoreRules};

use crate::debounce::Debouncer;
use crate::error::{io_err, DaemonError};

type RawEvent = notify::Result<Event>;

/// Live notify watch on one directory tree.
pub struct Subscription {
    root: PathBuf,
    watcher: Option<RecommendedWatcher>,
    #[cfg(test)]
    manual: Option<mpsc::UnboundedSender<RawEvent>>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("root", &self.root)
            .field("active", &self.watcher.is_some())
            .finish()
    }
}

/// Receiving end of a [`Subscription`].
#[derive(Debug)]
pub struct EventStream {
    root: PathBuf,
    rx: mpsc::UnboundedReceiver<RawEvent>,
}

impl EventStream {
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Subscription {
    /// Watch `root` recursively. `root` is canonicalized so that reported
    /// paths share its prefix.
    pub fn subscribe(root: &Path) -> Result<(Self, EventStream), DaemonError> {
        let root = fs::canonicalize(root).map_err(|e| io_err(root, e))?;
        if !root.is_dir() {
            return Err(io_err(
                &root,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel::<RawEvent>();
        let mut watcher = recommended_watcher(move |event| {
            let _ = tx.send(event);
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;
        tracing::debug!(root = %root.display(), "filesystem subscription active");

        Ok((
            Self {
                root: root.clone(),
                watcher: Some(watcher),
                #[cfg(test)]
                manual: None,
            },
            EventStream { root, rx },
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Release the OS watch. No events are delivered afterwards.
    pub fn unsubscribe(mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            if let Err(err) = watcher.unwatch(&self.root) {
                // The root may already be gone; dropping the watcher is enough.
                tracing::debug!(error = %err, "unwatch failed");
            }
        }
        #[cfg(test)]
        self.manual.take();
        tracing::debug!(root = %self.root.display(), "filesystem subscription released");
    }

    /// Subscription without an OS watch; events are injected by the test.
    #[cfg(test)]
    pub(crate) fn manual(root: &Path) -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                root: root.to_path_buf(),
                watcher: None,
                manual: Some(tx),
            },
            EventStream {
                root: root.to_path_buf(),
                rx,
            },
        )
    }

    #[cfg(test)]
    pub(crate) fn inject(&self, event: RawEvent) {
        if let Some(tx) = &self.manual {
            let _ = tx.send(event);
        }
    }
}

/// Pump events from `stream` through the filter into the debouncer until the
/// subscription is released.
///
/// Returns an error if the OS reports a watch failure or the root itself is
/// removed; both are fatal for the process.
pub async fn forward_events(
    mut stream: EventStream,
    rules: IgnoreRules,
    debouncer: Arc<Debouncer>,
) -> Result<(), DaemonError> {
    while let Some(event) = stream.rx.recv().await {
        let event = event?;
        if !is_change(&event.kind) {
            continue;
        }

        for path in &event.paths {
            if event.kind.is_remove() && path == &stream.root {
                return Err(DaemonError::WatchRootLost {
                    root: stream.root.clone(),
                });
            }

            let file_event = to_file_event(&stream.root, path, &event.kind);
            if is_relevant(&file_event, &rules) {
                tracing::debug!(path = %file_event.path.display(), "relevant change");
                debouncer.on_relevant_event();
            }
        }
    }
    Ok(())
}

/// Create, modify (including renames) and remove. Reads and opens are not
/// changes, and git touches plenty of files while it runs.
fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Any | EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

fn to_file_event(root: &Path, path: &Path, kind: &EventKind) -> FileEvent {
    let relative = path.strip_prefix(root).unwrap_or(path).to_path_buf();
    let is_directory = matches!(
        kind,
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder)
    ) || path.is_dir();
    FileEvent {
        path: relative,
        is_directory,
    }
}
