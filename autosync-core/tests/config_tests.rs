//! Config lookup-order, error-message and validation tests.

use assert_fs::prelude::*;
use autosync_core::{config, Config, ConfigError};
use predicates::prelude::predicate;

// ---------------------------------------------------------------------------
// 1. Lookup order
// ---------------------------------------------------------------------------

#[test]
fn local_file_wins_over_user_file() {
    let root = assert_fs::TempDir::new().expect("root");
    let user = assert_fs::TempDir::new().expect("user config dir");
    root.child(".autosync.yaml")
        .write_str("debounce_secs: 7\n")
        .expect("write local");
    user.child("autosync/config.yaml")
        .write_str("debounce_secs: 9\n")
        .expect("write user");

    let loaded = config::load_at(root.path(), None, Some(user.path())).expect("load");
    assert_eq!(loaded.config.debounce_secs, 7.0);
    assert_eq!(loaded.source, Some(root.path().join(".autosync.yaml")));
}

#[test]
fn user_file_used_when_no_local_file() {
    let root = assert_fs::TempDir::new().expect("root");
    let user = assert_fs::TempDir::new().expect("user config dir");
    user.child("autosync/config.yaml")
        .write_str("commit_message: from user\n")
        .expect("write user");

    let loaded = config::load_at(root.path(), None, Some(user.path())).expect("load");
    assert_eq!(loaded.config.commit_message, "from user");
    // Unspecified keys keep their defaults.
    assert_eq!(loaded.config.git_program, "git");
    assert_eq!(
        loaded.config.ignored_extensions,
        Config::default().ignored_extensions
    );
}

#[test]
fn explicit_path_must_exist() {
    let root = assert_fs::TempDir::new().expect("root");
    let missing = root.path().join("nope.yaml");
    let err = config::load_at(root.path(), Some(&missing), None).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }), "got: {err}");
    assert!(err.to_string().contains("nope.yaml"));
}

#[test]
fn explicit_path_skips_local_file() {
    let root = assert_fs::TempDir::new().expect("root");
    root.child(".autosync.yaml")
        .write_str("debounce_secs: 7\n")
        .expect("write local");
    let explicit = root.child("custom.yaml");
    explicit.write_str("debounce_secs: 0.5\n").expect("write explicit");

    let loaded = config::load_at(root.path(), Some(explicit.path()), None).expect("load");
    assert_eq!(loaded.config.debounce_secs, 0.5);
}

#[test]
fn empty_file_means_defaults() {
    let root = assert_fs::TempDir::new().expect("root");
    root.child(".autosync.yaml").write_str("").expect("write");
    let loaded = config::load_at(root.path(), None, None).expect("load");
    assert_eq!(loaded.config, Config::default());
    assert!(loaded.source.is_some());
}

// ---------------------------------------------------------------------------
// 2. Parse and validation errors
// ---------------------------------------------------------------------------

#[test]
fn corrupt_yaml_returns_parse_error_with_path() {
    let root = assert_fs::TempDir::new().expect("root");
    root.child(".autosync.yaml")
        .write_str(": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = config::load_at(root.path(), None, None).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains(".autosync.yaml"));
}

#[test]
fn unknown_keys_are_rejected() {
    let root = assert_fs::TempDir::new().expect("root");
    root.child(".autosync.yaml")
        .write_str("debounce: 3\n")
        .expect("write");
    let err = config::load_at(root.path(), None, None).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
}

#[test]
fn non_positive_debounce_is_invalid() {
    let root = assert_fs::TempDir::new().expect("root");
    root.child(".autosync.yaml")
        .write_str("debounce_secs: 0\n")
        .expect("write");
    let err = config::load_at(root.path(), None, None).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)), "got: {err}");
    assert!(err.to_string().contains("debounce_secs"));
}

#[test]
fn huge_debounce_is_invalid_rather_than_a_panic() {
    let root = assert_fs::TempDir::new().expect("root");
    root.child(".autosync.yaml")
        .write_str("debounce_secs: 1e20\n")
        .expect("write");
    let err = config::load_at(root.path(), None, None).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)), "got: {err}");
    assert!(err.to_string().contains("debounce_secs"));

    let config = Config {
        debounce_secs: 1e20,
        ..Config::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn multi_segment_ignore_entry_is_invalid() {
    let root = assert_fs::TempDir::new().expect("root");
    root.child(".autosync.yaml")
        .write_str("ignored_dir_segments: [\"a/b\"]\n")
        .expect("write");
    let err = config::load_at(root.path(), None, None).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)), "got: {err}");
}

// ---------------------------------------------------------------------------
// 3. Init template
// ---------------------------------------------------------------------------

#[test]
fn written_template_loads_back_as_defaults() {
    let root = assert_fs::TempDir::new().expect("root");
    let path = config::write_default_at(root.path(), false).expect("write template");
    root.child(".autosync.yaml")
        .assert(predicate::str::contains("commit_message: Auto update"));

    let loaded = config::load_at(root.path(), None, None).expect("load");
    assert_eq!(loaded.source, Some(path));
    assert_eq!(loaded.config, Config::default());
}
