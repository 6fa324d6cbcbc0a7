//! Control-socket wire format and the blocking client used by the CLI.
//!
//! One exchange per connection: the client writes a single JSON line naming
//! a command, the watcher answers with a single JSON line and hangs up.

use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{io_err, DaemonError};
use crate::paths::{canonical_root, socket_path};

const STATUS_ATTEMPTS: u32 = 5;
const STATUS_RETRY_DELAY: Duration = Duration::from_millis(100);

/// `{"cmd":"status"}`, `{"cmd":"sync"}` or `{"cmd":"stop"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub cmd: String,
}

impl DaemonRequest {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }
}

/// What the watcher sends back: either the command's result or the reason
/// it refused to carry it out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum DaemonResponse {
    Done {
        #[serde(default)]
        result: Value,
    },
    Refused {
        reason: String,
    },
}

impl DaemonResponse {
    pub fn ok(result: Value) -> Self {
        Self::Done { result }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::Refused {
            reason: reason.into(),
        }
    }

    pub fn into_result(self) -> Result<Value, DaemonError> {
        match self {
            Self::Done { result } => Ok(result),
            Self::Refused { reason } => Err(DaemonError::Protocol(reason)),
        }
    }
}

/// Deliver `request` to the watcher of `root` (canonicalized first) and wait
/// for its answer.
pub fn send_request(
    home: &Path,
    root: &Path,
    request: &DaemonRequest,
) -> Result<DaemonResponse, DaemonError> {
    let socket = socket_path(home, &canonical_root(root));
    let stream = connect(&socket)?;

    let mut line = serde_json::to_string(request)?;
    line.push('\n');
    (&stream)
        .write_all(line.as_bytes())
        .map_err(|e| io_err(&socket, e))?;

    line.clear();
    let read = BufReader::new(&stream)
        .read_line(&mut line)
        .map_err(|e| io_err(&socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(format!(
            "watcher hung up without replying to '{}'",
            request.cmd
        )));
    }
    Ok(serde_json::from_str(line.trim_end())?)
}

/// A socket file with nobody listening is left over from a crashed watcher
/// and counts as "not running", the same as no file at all.
fn connect(socket: &Path) -> Result<UnixStream, DaemonError> {
    let not_running = || DaemonError::DaemonNotRunning {
        socket: socket.to_path_buf(),
    };
    if !socket.exists() {
        return Err(not_running());
    }
    UnixStream::connect(socket).map_err(|err| {
        if is_stale(&err) {
            not_running()
        } else {
            io_err(socket, err)
        }
    })
}

fn is_stale(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset
    )
}

/// Status of the watcher of `root`. A watcher that was started a moment ago
/// may not have bound its socket yet, so "not running" is retried briefly.
pub fn request_status(home: &Path, root: &Path) -> Result<Value, DaemonError> {
    let request = DaemonRequest::new("status");
    let mut attempt = 1;
    loop {
        match send_request(home, root, &request) {
            Ok(response) => return response.into_result(),
            Err(DaemonError::DaemonNotRunning { .. }) if attempt < STATUS_ATTEMPTS => {
                attempt += 1;
                sleep(STATUS_RETRY_DELAY);
            }
            Err(err) => return Err(err),
        }
    }
}

pub fn request_stop(home: &Path, root: &Path) -> Result<(), DaemonError> {
    send_request(home, root, &DaemonRequest::new("stop"))?
        .into_result()
        .map(|_| ())
}

/// Run a sync right away and return its report once it has finished.
pub fn request_sync(home: &Path, root: &Path) -> Result<Value, DaemonError> {
    send_request(home, root, &DaemonRequest::new("sync"))?.into_result()
}
