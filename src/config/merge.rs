//! Deep merge of configuration layers.
//!
//! Objects recurse, arrays and scalars are replaced by the override. Fields
//! listed in [`FIELD_MERGERS`] use their own merger instead; the alias list
//! is concatenated so aliases accumulate across presets, overlays and user
//! configuration.

use serde_json::{Map, Value};

use crate::config::tree::{alias_list_value, normalize_alias, ConfigTree, ALIAS_PATH};

/// Merger for a single named field: `(base, override) -> merged`.
pub type FieldMerger = fn(&Value, &Value) -> Value;

/// Per-field merge overrides, keyed by dotted path.
pub const FIELD_MERGERS: &[(&str, FieldMerger)] = &[(ALIAS_PATH, merge_alias)];

/// Merge `overlay` on top of `base`.
pub fn merge(base: &ConfigTree, overlay: &ConfigTree) -> ConfigTree {
    let mut merged = base.as_value().clone();
    merge_value(&mut merged, overlay.as_value(), "");
    ConfigTree::from(merged)
}

/// Fold a sequence of layers, lowest priority first.
pub fn merge_all<'a>(layers: impl IntoIterator<Item = &'a ConfigTree>) -> ConfigTree {
    layers
        .into_iter()
        .fold(ConfigTree::default(), |acc, layer| merge(&acc, layer))
}

fn merge_value(base: &mut Value, overlay: &Value, path: &str) {
    if let Some(merger) = field_merger(path) {
        let merged = merger(base, overlay);
        *base = merged;
        return;
    }

    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            merge_maps(base_map, overlay_map, path);
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

fn merge_maps(base: &mut Map<String, Value>, overlay: &Map<String, Value>, path: &str) {
    for (key, value) in overlay {
        let child_path = if path.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", path, key)
        };
        match base.get_mut(key) {
            Some(existing) => merge_value(existing, value, &child_path),
            None => {
                // Recurse into a fresh object so nested field mergers still apply.
                let mut inserted = match value {
                    Value::Object(_) => Value::Object(Map::new()),
                    _ => Value::Null,
                };
                merge_value(&mut inserted, value, &child_path);
                base.insert(key.clone(), inserted);
            }
        }
    }
}

fn field_merger(path: &str) -> Option<FieldMerger> {
    FIELD_MERGERS
        .iter()
        .find(|(field, _)| *field == path)
        .map(|(_, merger)| *merger)
}

/// Concatenate both alias lists, base first. No deduplication: later entries
/// win at lookup time by scan order.
fn merge_alias(base: &Value, overlay: &Value) -> Value {
    let mut entries = normalize_alias(base);
    entries.extend(normalize_alias(overlay));
    alias_list_value(&entries)
}
