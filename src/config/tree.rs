//! Configuration tree and alias entries.
//!
//! A [`ConfigTree`] is an untyped, arbitrarily nested JSON-like document.
//! Every layer (defaults, presets, files, CLI flags) is carried in this form so
//! the merge engine and the change classifier can work on fields the typed
//! schema does not know about.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Dotted path of the alias list inside a configuration tree.
pub const ALIAS_PATH: &str = "resolve.alias";

/// A nested configuration document. The root is always an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub struct ConfigTree(Value);

impl Default for ConfigTree {
    fn default() -> Self {
        ConfigTree(Value::Object(Map::new()))
    }
}

impl ConfigTree {
    /// Wrap a value. Non-object values are replaced by an empty object.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(_) => ConfigTree(value),
            _ => ConfigTree::default(),
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn as_object(&self) -> &Map<String, Value> {
        match &self.0 {
            Value::Object(map) => map,
            _ => unreachable!("ConfigTree root is always an object"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_object().is_empty()
    }

    /// Get a nested value by dot-separated path.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        get_path(&self.0, path)
    }

    /// Set a nested value, creating intermediate objects as needed.
    /// Non-object intermediates are replaced.
    pub fn set_path(&mut self, path: &str, value: Value) {
        let mut current = &mut self.0;
        let mut parts = path.split('.').peekable();
        while let Some(part) = parts.next() {
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }
            let map = match current {
                Value::Object(map) => map,
                _ => return,
            };
            if parts.peek().is_none() {
                map.insert(part.to_string(), value);
                return;
            }
            current = map
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
    }

    /// Remove a nested value, returning it if present.
    pub fn remove_path(&mut self, path: &str) -> Option<Value> {
        let (parent, leaf) = match path.rsplit_once('.') {
            Some((parent, leaf)) => (Some(parent), leaf),
            None => (None, path),
        };
        let container = match parent {
            Some(parent) => get_path_mut(&mut self.0, parent)?,
            None => &mut self.0,
        };
        container.as_object_mut()?.remove(leaf)
    }

    /// Alias entries of this tree, normalized to a list.
    pub fn aliases(&self) -> Vec<AliasEntry> {
        self.get_path(ALIAS_PATH).map(normalize_alias).unwrap_or_default()
    }
}

impl From<Value> for ConfigTree {
    fn from(value: Value) -> Self {
        ConfigTree::from_value(value)
    }
}

impl From<ConfigTree> for Value {
    fn from(tree: ConfigTree) -> Self {
        tree.0
    }
}

pub(crate) fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn get_path_mut<'a>(value: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut current = value;
    for part in path.split('.') {
        current = current.as_object_mut()?.get_mut(part)?;
    }
    Some(current)
}

/// A module-resolution path rewrite rule.
///
/// `replacement` is `None` only in an [`AliasDiff`](crate::config::classify::AliasDiff),
/// where it marks an entry that was removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasEntry {
    pub find: String,
    pub replacement: Option<String>,
}

impl AliasEntry {
    pub fn new(find: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            find: find.into(),
            replacement: Some(replacement.into()),
        }
    }

    pub fn removed(find: impl Into<String>) -> Self {
        Self {
            find: find.into(),
            replacement: None,
        }
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("find".to_string(), Value::String(self.find.clone()));
        map.insert(
            "replacement".to_string(),
            self.replacement.clone().map(Value::String).unwrap_or(Value::Null),
        );
        Value::Object(map)
    }
}

/// Normalize either alias representation into a list.
///
/// Objects become `{find: key, replacement: value}` entries in map order;
/// lists pass through. Malformed entries are skipped.
pub fn normalize_alias(value: &Value) -> Vec<AliasEntry> {
    match value {
        Value::Array(items) => items.iter().filter_map(alias_from_item).collect(),
        Value::Object(map) => map
            .iter()
            .map(|(find, replacement)| AliasEntry {
                find: find.clone(),
                replacement: scalar_string(replacement),
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn alias_from_item(item: &Value) -> Option<AliasEntry> {
    let map = item.as_object()?;
    let find = scalar_string(map.get("find")?)?;
    Some(AliasEntry {
        find,
        replacement: map.get("replacement").and_then(scalar_string),
    })
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Render alias entries back into the list representation.
pub fn alias_list_value(entries: &[AliasEntry]) -> Value {
    Value::Array(entries.iter().map(AliasEntry::to_value).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_and_set_path() {
        let mut tree = ConfigTree::default();
        tree.set_path("server.port", json!(3000));
        tree.set_path("server.proxy./api", json!("http://localhost:8080"));

        assert_eq!(tree.get_path("server.port"), Some(&json!(3000)));
        assert!(tree.get_path("server.host").is_none());
        assert!(tree.get_path("server.port.inner").is_none());

        // Scalars in the way are replaced by objects.
        tree.set_path("server.port.inner", json!(true));
        assert_eq!(tree.get_path("server.port.inner"), Some(&json!(true)));
    }

    #[test]
    fn test_remove_path() {
        let mut tree = ConfigTree::from(json!({"proxy": {"/a": "x"}, "server": {"port": 1}}));
        assert_eq!(tree.remove_path("proxy"), Some(json!({"/a": "x"})));
        assert_eq!(tree.remove_path("server.port"), Some(json!(1)));
        assert_eq!(tree.remove_path("server.missing"), None);
        assert_eq!(tree.as_value(), &json!({"server": {}}));
    }

    #[test]
    fn test_non_object_root_becomes_empty() {
        let tree = ConfigTree::from(json!([1, 2, 3]));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_normalize_alias_forms() {
        let list = json!([{"find": "@", "replacement": "./src"}, {"nope": 1}]);
        assert_eq!(normalize_alias(&list), vec![AliasEntry::new("@", "./src")]);

        let map = json!({"@": "./src", "~": "./"});
        let entries = normalize_alias(&map);
        assert_eq!(entries.len(), 2);
        assert!(entries.contains(&AliasEntry::new("~", "./")));

        assert!(normalize_alias(&json!("bogus")).is_empty());
    }
}
