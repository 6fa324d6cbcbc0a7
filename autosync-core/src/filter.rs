//! Event filter: decides whether a filesystem event should restart the
//! debounce window.

use std::path::{Component, Path};

use crate::config::IgnoreRules;
use crate::types::FileEvent;

/// `true` if `event` should count as a change worth syncing.
///
/// Directory events never count. A file event is dropped when any of its path
/// segments is an ignored directory segment, or when the path ends with an
/// ignored extension (plain suffix match, so `.log` also drops `debug.log`).
pub fn is_relevant(event: &FileEvent, rules: &IgnoreRules) -> bool {
    if event.is_directory {
        return false;
    }
    if has_ignored_segment(&event.path, rules) {
        return false;
    }
    !has_ignored_extension(&event.path, rules)
}

fn has_ignored_segment(path: &Path, rules: &IgnoreRules) -> bool {
    path.components().any(|component| match component {
        Component::Normal(segment) => segment
            .to_str()
            .map(|s| rules.ignored_dir_segments.contains(s))
            .unwrap_or(false),
        _ => false,
    })
}

fn has_ignored_extension(path: &Path, rules: &IgnoreRules) -> bool {
    let path = path.to_string_lossy();
    rules
        .ignored_extensions
        .iter()
        .any(|ext| path.ends_with(ext.as_str()))
}
