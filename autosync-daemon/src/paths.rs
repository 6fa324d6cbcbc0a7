use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

pub const DAEMON_SOCKET_EXT: &str = "sock";

/// Hex characters of the root digest used in the socket file name.
const SOCKET_KEY_LEN: usize = 16;

pub fn autosync_root(home: &Path) -> PathBuf {
    home.join(".autosync")
}

pub fn run_dir(home: &Path) -> PathBuf {
    autosync_root(home).join("run")
}

/// Stable key for a watched directory: the first 16 hex chars of
/// `sha256(root)`. Callers pass the canonical root.
pub fn root_key(root: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(root.to_string_lossy().as_bytes());
    let mut key = hex::encode(hasher.finalize());
    key.truncate(SOCKET_KEY_LEN);
    key
}

/// `~/.autosync/run/<key>.sock`
pub fn socket_path(home: &Path, root: &Path) -> PathBuf {
    run_dir(home).join(format!("{}.{DAEMON_SOCKET_EXT}", root_key(root)))
}

/// Canonicalize `root`, falling back to the path as given when it cannot be
/// resolved (so a missing root still maps to a deterministic socket).
pub fn canonical_root(root: &Path) -> PathBuf {
    std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf())
}
