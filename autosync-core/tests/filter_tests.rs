//! Parameterised relevance tests for the event filter.

use autosync_core::{is_relevant, Config, FileEvent, IgnoreRules};
use rstest::rstest;

fn default_rules() -> IgnoreRules {
    Config::default().ignore_rules()
}

// ---------------------------------------------------------------------------
// Ignored
// ---------------------------------------------------------------------------

#[rstest]
#[case(".git/index")]
#[case(".git/refs/heads/main")]
#[case("src/.vscode/settings.json")]
#[case("pkg/__pycache__/mod.cpython-312.pyc")]
#[case("notes/todo.md.swp")]
#[case("build/output.tmp")]
#[case("logs/server.log")]
#[case("/home/user/project/.git/ORIG_HEAD")]
fn ignored_paths_are_not_relevant(#[case] path: &str) {
    assert!(!is_relevant(&FileEvent::file(path), &default_rules()), "{path}");
}

// ---------------------------------------------------------------------------
// Relevant
// ---------------------------------------------------------------------------

#[rstest]
#[case("README.md")]
#[case("src/main.rs")]
#[case("docs/.gitignore")]
#[case("logs/readme.txt")]
#[case("catalog.logic")]
#[case("gitkeep/file.txt")]
fn ordinary_files_are_relevant(#[case] path: &str) {
    assert!(is_relevant(&FileEvent::file(path), &default_rules()), "{path}");
}

#[rstest]
#[case("README.md")]
#[case(".git/index")]
#[case("src")]
fn directories_are_never_relevant(#[case] path: &str) {
    assert!(!is_relevant(&FileEvent::directory(path), &default_rules()));
    assert!(!is_relevant(&FileEvent::directory(path), &IgnoreRules::default()));
}

#[test]
fn custom_rules_replace_defaults() {
    let rules = IgnoreRules::new(["target"], [".rs.bk", "~"]);
    assert!(!is_relevant(&FileEvent::file("target/debug/app"), &rules));
    assert!(!is_relevant(&FileEvent::file("src/lib.rs.bk"), &rules));
    assert!(!is_relevant(&FileEvent::file("notes.txt~"), &rules));
    assert!(is_relevant(&FileEvent::file(".vscode/settings.json"), &rules));
    assert!(is_relevant(&FileEvent::file("app.log"), &rules));
}
