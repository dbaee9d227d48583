//! Change classification between two configuration snapshots.
//!
//! # Decision
//! ```text
//! RESTART_PATHS mismatch   → Restart            (first match short-circuits the scan)
//! resolve.alias mismatch   → AliasHotUpdate
//! HOT_PATHS mismatch       → HotUpdate
//! nothing                  → None
//! ```
//! The flags are computed independently; restart takes precedence when acting.
//!
//! Both path lists are maintained by hand alongside the schema. A new field
//! that needs a restart must be added to [`RESTART_PATHS`] explicitly.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::config::tree::{AliasEntry, ConfigTree, ALIAS_PATH};
use crate::config::version::canonical_json;

/// Paths whose change requires a full dev-session restart, in logging priority order.
pub const RESTART_PATHS: &[&str] = &[
    "server.port",
    "server.host",
    "server.https",
    "root",
    "preset",
    "plugins",
    "define",
];

/// Paths that can be applied to a live session.
pub const HOT_PATHS: &[&str] = &[
    "server.proxy",
    "server.cors",
    "define",
    "css.modules",
    "build.outDir",
    "build.sourcemap",
    "build.minify",
    "build.target",
];

/// Path whose values are stripped of build-timestamp keys before the restart check.
const DEFINE_PATH: &str = "define";

/// Exact `define` keys that are regenerated on every build.
const VOLATILE_DEFINE_KEYS: &[&str] = &[
    "__BUILD_TIME__",
    "__BUILD_TIMESTAMP__",
    "import.meta.env.BUILD_TIME",
];

/// What a reload should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReloadAction {
    Restart,
    AliasHotUpdate,
    HotUpdate,
    None,
}

impl ReloadAction {
    pub fn label(&self) -> &'static str {
        match self {
            ReloadAction::Restart => "restart",
            ReloadAction::AliasHotUpdate => "alias_hot_update",
            ReloadAction::HotUpdate => "hot_update",
            ReloadAction::None => "none",
        }
    }
}

/// Flags describing how two snapshots differ.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeClassification {
    pub needs_restart: bool,
    pub server_changed: bool,
    pub alias_changed: bool,
    pub other_changed: bool,
    /// First restart path that differed.
    pub restart_path: Option<&'static str>,
}

impl ChangeClassification {
    pub fn action(&self) -> ReloadAction {
        if self.needs_restart {
            ReloadAction::Restart
        } else if self.alias_changed {
            ReloadAction::AliasHotUpdate
        } else if self.other_changed {
            ReloadAction::HotUpdate
        } else {
            ReloadAction::None
        }
    }
}

/// Classify the change from `old` to `new`.
pub fn classify(old: &ConfigTree, new: &ConfigTree) -> ChangeClassification {
    let mut result = ChangeClassification::default();

    for path in RESTART_PATHS {
        let (before, after) = if *path == DEFINE_PATH {
            (
                strip_volatile_defines(old.get_path(path)),
                strip_volatile_defines(new.get_path(path)),
            )
        } else {
            (serialized(old.get_path(path)), serialized(new.get_path(path)))
        };
        if before != after {
            result.needs_restart = true;
            result.server_changed = path.starts_with("server.");
            result.restart_path = Some(*path);
            tracing::debug!(path, "Restart-required field changed");
            break;
        }
    }

    result.alias_changed = old.aliases() != new.aliases();

    result.other_changed = HOT_PATHS
        .iter()
        .filter(|path| **path != ALIAS_PATH)
        .any(|path| serialized(old.get_path(path)) != serialized(new.get_path(path)));
    if result.other_changed
        && serialized(old.get_path("server.proxy")) != serialized(new.get_path("server.proxy"))
    {
        result.server_changed = true;
    }

    result
}

fn serialized(value: Option<&Value>) -> Option<String> {
    value.map(canonical_json)
}

fn strip_volatile_defines(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::Object(map)) => {
            let kept: Map<String, Value> = map
                .iter()
                .filter(|(key, _)| !is_volatile_define(key))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Some(canonical_json(&Value::Object(kept)))
        }
        other => serialized(other),
    }
}

fn is_volatile_define(key: &str) -> bool {
    VOLATILE_DEFINE_KEYS.contains(&key) || key.contains("TIMESTAMP") || key.ends_with("_TIME__")
}

/// Alias changes between two snapshots, keyed by `find`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AliasDiff {
    pub added: Vec<AliasEntry>,
    pub changed: Vec<AliasEntry>,
    /// Entries gone from the new list; `replacement` is `None`.
    pub removed: Vec<AliasEntry>,
}

impl AliasDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.changed.len() + self.removed.len()
    }
}

/// Diff two alias lists. For repeated `find` keys the last entry wins, matching
/// lookup precedence.
pub fn diff_aliases(old: &[AliasEntry], new: &[AliasEntry]) -> AliasDiff {
    let old_map = effective(old);
    let new_map = effective(new);
    let mut diff = AliasDiff::default();

    for (find, replacement) in ordered(new, &new_map) {
        match old_map.get(find) {
            None => diff.added.push(AliasEntry {
                find: find.to_string(),
                replacement: replacement.clone(),
            }),
            Some(previous) if *previous != replacement => diff.changed.push(AliasEntry {
                find: find.to_string(),
                replacement: replacement.clone(),
            }),
            Some(_) => {}
        }
    }

    for (find, _) in ordered(old, &old_map) {
        if !new_map.contains_key(find) {
            diff.removed.push(AliasEntry::removed(find));
        }
    }

    diff
}

fn effective(entries: &[AliasEntry]) -> HashMap<&str, &Option<String>> {
    entries
        .iter()
        .map(|entry| (entry.find.as_str(), &entry.replacement))
        .collect()
}

/// Unique `find` keys in first-appearance order, paired with their effective replacement.
fn ordered<'a>(
    entries: &'a [AliasEntry],
    map: &HashMap<&'a str, &'a Option<String>>,
) -> Vec<(&'a str, &'a Option<String>)> {
    let mut seen = std::collections::HashSet::new();
    entries
        .iter()
        .filter(|entry| seen.insert(entry.find.as_str()))
        .map(|entry| (entry.find.as_str(), map[entry.find.as_str()]))
        .collect()
}
