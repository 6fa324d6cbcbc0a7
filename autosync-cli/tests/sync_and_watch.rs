use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use predicates::prelude::*;
use tempfile::TempDir;

fn autosync_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_autosync") {
        return PathBuf::from(path);
    }

    let this_test = std::env::current_exe().expect("current_exe");
    let deps_dir = this_test.parent().expect("deps dir");
    let debug_dir = deps_dir.parent().expect("debug dir");

    let direct = debug_dir.join(format!("autosync{}", std::env::consts::EXE_SUFFIX));
    if direct.exists() {
        return direct;
    }

    let mut candidates: Vec<_> = std::fs::read_dir(deps_dir)
        .expect("read deps dir")
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            let Some(name) = p.file_name().and_then(|n| n.to_str()) else {
                return false;
            };
            name.starts_with("autosync-") && !name.ends_with(".d") && p.is_file()
        })
        .collect();
    candidates.sort();
    candidates
        .into_iter()
        .next()
        .expect("unable to locate autosync binary in target/debug or target/debug/deps")
}

fn autosync(home: &Path) -> Command {
    let mut cmd = Command::new(autosync_bin_path());
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("RUST_LOG");
    cmd
}

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("spawn git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Bare remote plus a clone with one pushed commit on `main`.
fn remote_and_clone(tmp: &Path) -> (PathBuf, PathBuf) {
    let remote = tmp.join("remote.git");
    let work = tmp.join("work");
    git(tmp, &["init", "--bare", "remote.git"]);
    git(&remote, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    git(tmp, &["clone", "remote.git", "work"]);
    git(&work, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    git(&work, &["config", "user.email", "autosync@example.invalid"]);
    git(&work, &["config", "user.name", "autosync tests"]);
    git(&work, &["config", "commit.gpgsign", "false"]);
    std::fs::write(work.join("README.md"), "seed\n").expect("write seed");
    git(&work, &["add", "."]);
    git(&work, &["commit", "-m", "seed"]);
    git(&work, &["push", "-u", "origin", "main"]);
    (remote, work)
}

struct WatchProcess {
    child: Child,
    home: PathBuf,
    root: PathBuf,
}

impl WatchProcess {
    fn start(home: &Path, root: &Path, extra: &[&str]) -> Self {
        let child = autosync(home)
            .arg("watch")
            .arg(root)
            .args(extra)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn watcher");
        Self {
            child,
            home: home.to_path_buf(),
            root: root.to_path_buf(),
        }
    }

    fn status(&self) -> serde_json::Value {
        let output = autosync(&self.home)
            .args(["status", "--json"])
            .arg(&self.root)
            .output()
            .expect("run status");
        serde_json::from_slice(&output.stdout).expect("status JSON")
    }

    fn wait_until(&self, what: &str, mut ready: impl FnMut(&serde_json::Value) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(20);
        while Instant::now() < deadline {
            if ready(&self.status()) {
                return;
            }
            sleep(Duration::from_millis(100));
        }
        panic!("timed out waiting for {what}");
    }

    fn stop(&mut self) -> std::process::ExitStatus {
        let _ = autosync(&self.home).arg("stop").arg(&self.root).output();
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if let Some(status) = self.child.try_wait().expect("try_wait") {
                return status;
            }
            sleep(Duration::from_millis(50));
        }
        let _ = self.child.kill();
        panic!("watcher did not exit after stop");
    }
}

impl Drop for WatchProcess {
    fn drop(&mut self) {
        if matches!(self.child.try_wait(), Ok(None)) {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[test]
fn dry_run_sync_succeeds_outside_a_repository() {
    let home = TempDir::new().expect("home");
    let root = TempDir::new().expect("root");

    assert_cmd::Command::new(autosync_bin_path())
        .env("HOME", home.path())
        .args(["sync", "--dry-run"])
        .arg(root.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("[dry-run]"));
}

#[test]
fn sync_pushes_then_reports_nothing_to_commit() {
    if !git_available() {
        return;
    }
    let home = TempDir::new().expect("home");
    let tmp = TempDir::new().expect("tmp");
    let (remote, work) = remote_and_clone(tmp.path());
    std::fs::write(work.join("notes.md"), "hello\n").expect("write");

    let first = autosync(home.path()).arg("sync").arg(&work).output().expect("sync");
    assert!(first.status.success(), "{}", String::from_utf8_lossy(&first.stderr));
    assert!(String::from_utf8_lossy(&first.stdout).contains("Changes pushed"));
    let log = git(&remote, &["log", "--format=%s", "main"]);
    assert_eq!(log.lines().next(), Some("Auto update"));

    let second = autosync(home.path()).arg("sync").arg(&work).output().expect("sync");
    assert!(second.status.success());
    assert!(String::from_utf8_lossy(&second.stdout).contains("Nothing to commit"));
}

#[test]
fn sync_without_upstream_exits_non_zero() {
    if !git_available() {
        return;
    }
    let home = TempDir::new().expect("home");
    let tmp = TempDir::new().expect("tmp");
    let work = tmp.path().join("solo");
    std::fs::create_dir_all(&work).expect("mkdir");
    git(&work, &["init"]);
    git(&work, &["config", "user.email", "autosync@example.invalid"]);
    git(&work, &["config", "user.name", "autosync tests"]);
    git(&work, &["config", "commit.gpgsign", "false"]);
    std::fs::write(work.join("a.txt"), "a\n").expect("write");

    let output = autosync(home.path()).arg("sync").arg(&work).output().expect("sync");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("integrate_failed"));
}

#[test]
fn dry_run_watcher_syncs_after_change_and_stops_cleanly() {
    let home = TempDir::new().expect("home");
    let root = TempDir::new().expect("root");
    let mut watcher = WatchProcess::start(home.path(), root.path(), &["--dry-run", "--debounce", "0.3"]);

    watcher.wait_until("watcher to come up", |s| s["running"] == serde_json::json!(true));

    // Ignored paths alone never trigger a sync.
    std::fs::write(root.path().join("scratch.tmp"), "x").expect("write tmp");
    sleep(Duration::from_millis(800));
    assert_eq!(watcher.status()["syncs"], serde_json::json!(0));

    std::fs::write(root.path().join("notes.md"), "hello\n").expect("write notes");
    watcher.wait_until("a debounced sync", |s| s["syncs"].as_u64().unwrap_or(0) >= 1);
    let status = watcher.status();
    assert_eq!(status["last_sync"]["trigger"], serde_json::json!("debounced"));
    assert_eq!(status["last_sync"]["outcome"], serde_json::json!("pushed"));

    let exit = watcher.stop();
    assert!(exit.success(), "watcher exit status: {exit:?}");
    assert_eq!(watcher.status()["running"], serde_json::json!(false));
}

#[test]
fn watcher_pushes_real_changes() {
    if !git_available() {
        return;
    }
    let home = TempDir::new().expect("home");
    let tmp = TempDir::new().expect("tmp");
    let (remote, work) = remote_and_clone(tmp.path());
    let mut watcher = WatchProcess::start(home.path(), &work, &["--debounce", "0.3"]);
    watcher.wait_until("watcher to come up", |s| s["running"] == serde_json::json!(true));

    std::fs::write(work.join("live.md"), "edited while watching\n").expect("write");
    let deadline = Instant::now() + Duration::from_secs(20);
    loop {
        let files = git(&remote, &["ls-tree", "--name-only", "main"]);
        if files.lines().any(|f| f == "live.md") {
            break;
        }
        assert!(Instant::now() < deadline, "change never reached the remote: {files}");
        sleep(Duration::from_millis(100));
    }
    let log = git(&remote, &["log", "--format=%s", "main"]);
    assert_eq!(log.lines().next(), Some("Auto update"));
    assert!(watcher.stop().success());
}
