//! Configuration loading from disk.
//!
//! # Fallback chain
//! ```text
//! schema-checked (.toml / .yaml / .yml):
//!     1. typed      parse + schema type check          → Compiled(Typed)
//!     2. tolerant   cleaned-up parse, no type check     → Compiled(Tolerant)
//!     3. sibling    <basename>.json loaded as plain     → Interpreted(Sibling)
//!     4. reencoded  BOM / UTF-16 repair, tolerant parse → Interpreted(Reencoded)
//!     5. defaults   built-in tree, never fails          → Default
//!
//! plain (.json):
//!     direct parse                                      → Interpreted(Direct)
//!     on failure: encoding repair, one retry            → Interpreted(Reencoded)
//!     on failure: error propagates
//! ```
//! Every successful stage goes through proxy normalization before returning.

use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::diagnostics::{Diagnostic, DiagnosticsSink, DEPRECATED_KEYS};
use crate::config::encoding;
use crate::config::error::{ConfigError, Result};
use crate::config::merge::merge;
use crate::config::schema::{check_types, default_tree};
use crate::config::tree::{get_path, ConfigTree};
use crate::observability::metrics;

/// Source format, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Toml,
    Yaml,
    Json,
}

impl Format {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "toml" => Some(Format::Toml),
            "yaml" | "yml" => Some(Format::Yaml),
            "json" => Some(Format::Json),
            _ => None,
        }
    }

    /// Schema-checked formats go through the full fallback chain.
    pub fn is_schema_checked(self) -> bool {
        !matches!(self, Format::Json)
    }

    fn parse(self, text: &str) -> std::result::Result<Value, String> {
        match self {
            Format::Toml => toml::from_str::<Value>(text).map_err(|e| e.to_string()),
            Format::Yaml => serde_yaml::from_str::<Value>(text).map_err(|e| e.to_string()),
            Format::Json => serde_json::from_str::<Value>(text).map_err(|e| e.to_string()),
        }
    }

    /// Serialize a tree in this format.
    pub fn render(self, tree: &ConfigTree) -> Result<String> {
        match self {
            Format::Toml => {
                // TOML has no null.
                let value = strip_nulls(tree.as_value().clone());
                toml::to_string_pretty(&value).map_err(|e| ConfigError::Serialize(e.to_string()))
            }
            Format::Yaml => {
                serde_yaml::to_string(tree.as_value()).map_err(|e| ConfigError::Serialize(e.to_string()))
            }
            Format::Json => serde_json::to_string_pretty(tree.as_value())
                .map(|mut text| {
                    text.push('\n');
                    text
                })
                .map_err(|e| ConfigError::Serialize(e.to_string())),
        }
    }
}

fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().filter(|v| !v.is_null()).map(strip_nulls).collect())
        }
        other => other,
    }
}

/// Which stage of the fallback chain produced a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Typed,
    Tolerant,
    Sibling,
    Reencoded,
    Direct,
}

/// How a configuration tree was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Compiled(LoadStage),
    Interpreted(LoadStage),
    Default,
}

impl LoadOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            LoadOutcome::Compiled(LoadStage::Typed) => "typed",
            LoadOutcome::Compiled(_) => "tolerant",
            LoadOutcome::Interpreted(LoadStage::Sibling) => "sibling",
            LoadOutcome::Interpreted(LoadStage::Reencoded) => "reencoded",
            LoadOutcome::Interpreted(_) => "direct",
            LoadOutcome::Default => "default",
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, LoadOutcome::Default)
    }
}

impl fmt::Display for LoadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of loading a single file.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub tree: ConfigTree,
    pub outcome: LoadOutcome,
    pub source: PathBuf,
}

/// Loads configuration files through the fallback chain.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    diagnostics: DiagnosticsSink,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> &DiagnosticsSink {
        &self.diagnostics
    }

    /// Load one file.
    ///
    /// A missing file or unsupported extension is an error. For schema-checked
    /// formats every other failure degrades to defaults; for JSON a parse
    /// failure after the encoding retry is returned.
    pub fn load(&self, path: &Path) -> Result<LoadedConfig> {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let format =
            Format::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat(path.to_path_buf()))?;

        let (value, outcome) = if format.is_schema_checked() {
            self.load_schema_checked(path, format)
        } else {
            load_plain(path)?
        };

        let mut tree = ConfigTree::from(value);
        if !outcome.is_default() {
            normalize_proxy(&mut tree);
        }

        metrics::record_config_load(outcome.label());
        tracing::info!(path = %path.display(), outcome = %outcome, "Configuration file loaded");

        Ok(LoadedConfig {
            tree,
            outcome,
            source: path.to_path_buf(),
        })
    }

    fn load_schema_checked(&self, path: &Path, format: Format) -> (Value, LoadOutcome) {
        match self.load_typed(path, format) {
            Ok(value) => return (value, LoadOutcome::Compiled(LoadStage::Typed)),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Typed load failed, trying tolerant parser"),
        }

        match self.load_tolerant(path, format) {
            Ok(value) => return (value, LoadOutcome::Compiled(LoadStage::Tolerant)),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Tolerant load failed, looking for a JSON sibling"),
        }

        let sibling = path.with_extension("json");
        match load_sibling(&sibling) {
            Ok(value) => {
                tracing::info!(sibling = %sibling.display(), "Loaded JSON sibling instead");
                return (value, LoadOutcome::Interpreted(LoadStage::Sibling));
            }
            Err(e) => tracing::warn!(sibling = %sibling.display(), error = %e, "Sibling load failed, retrying with encoding repair"),
        }

        match load_reencoded(path, format) {
            Ok(value) => return (value, LoadOutcome::Interpreted(LoadStage::Reencoded)),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "All load stages failed, using built-in defaults"),
        }

        (default_tree().into_value(), LoadOutcome::Default)
    }

    /// Stage 1: parse and check against the typed schema.
    fn load_typed(&self, path: &Path, format: Format) -> Result<Value> {
        let _quiet = self.diagnostics.suppress_deprecations();
        let text = fs::read_to_string(path)?;
        let value = format.parse(&text).map_err(|e| ConfigError::parse(path, e))?;
        self.report_deprecations(&value);
        check_types(&value).map_err(|e| ConfigError::parse(path, e))?;
        Ok(value)
    }

    /// Stage 2: clean up common hand-editing damage and parse without a type check.
    fn load_tolerant(&self, path: &Path, format: Format) -> Result<Value> {
        let _quiet = self.diagnostics.suppress_deprecations();
        let text = fs::read_to_string(path)?;
        let cleaned = tolerant_cleanup(&text, format);
        let value = format.parse(&cleaned).map_err(|e| ConfigError::parse(path, e))?;
        if !value.is_object() {
            return Err(ConfigError::parse(path, "top level is not a table"));
        }
        if cleaned != text {
            self.diagnostics.emit(Diagnostic::Notice(format!(
                "{} parsed after whitespace cleanup",
                path.display()
            )));
        }
        self.report_deprecations(&value);
        Ok(value)
    }

    fn report_deprecations(&self, value: &Value) {
        for &(key, hint) in DEPRECATED_KEYS {
            if get_path(value, key).is_some() {
                self.diagnostics.emit(Diagnostic::Deprecation {
                    key: key.to_string(),
                    hint,
                });
            }
        }
        if matches!(get_path(value, "server.https"), Some(Value::String(_))) {
            self.diagnostics.emit(Diagnostic::Deprecation {
                key: "server.https".to_string(),
                hint: "use `{ cert, key }`",
            });
        }
    }
}

/// Normalize line endings; YAML additionally gets leading tabs expanded.
fn tolerant_cleanup(text: &str, format: Format) -> String {
    let text = text.replace("\r\n", "\n");
    match format {
        Format::Yaml => text
            .lines()
            .map(|line| {
                let indent = line.len() - line.trim_start_matches('\t').len();
                format!("{}{}", "  ".repeat(indent), &line[indent..])
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => text,
    }
}

/// Plain (JSON) load: direct parse, then one retry after encoding repair.
fn load_plain(path: &Path) -> Result<(Value, LoadOutcome)> {
    let bytes = fs::read(path)?;
    let direct = std::str::from_utf8(&bytes)
        .map_err(|e| e.to_string())
        .and_then(|text| Format::Json.parse(text));

    match direct {
        Ok(value) => Ok((value, LoadOutcome::Interpreted(LoadStage::Direct))),
        Err(first) => {
            tracing::warn!(path = %path.display(), error = %first, "Direct parse failed, retrying with encoding repair");
            let text = encoding::repair(&bytes)
                .ok_or_else(|| ConfigError::parse(path, format!("unrecognized text encoding ({})", first)))?;
            let value = Format::Json.parse(&text).map_err(|e| ConfigError::parse(path, e))?;
            Ok((value, LoadOutcome::Interpreted(LoadStage::Reencoded)))
        }
    }
}

fn load_sibling(sibling: &Path) -> Result<Value> {
    if !sibling.is_file() {
        return Err(ConfigError::NotFound(sibling.to_path_buf()));
    }
    load_plain(sibling).map(|(value, _)| value)
}

/// Stage 4: re-decode the original bytes and run the tolerant parse.
fn load_reencoded(path: &Path, format: Format) -> Result<Value> {
    let bytes = fs::read(path)?;
    let text = encoding::repair(&bytes)
        .ok_or_else(|| ConfigError::parse(path, "unrecognized text encoding"))?;
    let value = format
        .parse(&tolerant_cleanup(&text, format))
        .map_err(|e| ConfigError::parse(path, e))?;
    if !value.is_object() {
        return Err(ConfigError::parse(path, "top level is not a table"));
    }
    Ok(value)
}

/// Proxy tables that are hoisted into `server.proxy`.
const MISPLACED_PROXY_PATHS: &[&str] = &["proxy", "devServer.proxy"];

/// Move proxy tables found outside `server` into `server.proxy`.
/// Entries already under `server.proxy` take precedence.
pub fn normalize_proxy(tree: &mut ConfigTree) {
    for path in MISPLACED_PROXY_PATHS {
        let hoisted = match tree.get_path(path) {
            Some(Value::Object(_)) => match tree.remove_path(path) {
                Some(Value::Object(map)) => map,
                _ => continue,
            },
            _ => continue,
        };

        let existing = tree
            .get_path("server.proxy")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let mut base = ConfigTree::default();
        base.set_path("server.proxy", Value::Object(hoisted));
        let mut overlay = ConfigTree::default();
        overlay.set_path("server.proxy", Value::Object(existing));
        let merged = merge(&base, &overlay);

        let proxy = merged
            .get_path("server.proxy")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        tracing::debug!(from = path, "Hoisted proxy table into server.proxy");
        tree.set_path("server.proxy", proxy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: impl AsRef<[u8]>) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_typed_toml() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "launcher.config.toml", "[server]\nport = 3000\n\n[custom]\nflag = true\n");

        let loaded = ConfigLoader::new().load(&path).unwrap();
        assert_eq!(loaded.outcome, LoadOutcome::Compiled(LoadStage::Typed));
        assert_eq!(loaded.tree.get_path("server.port"), Some(&json!(3000)));
        // Unknown sections survive.
        assert_eq!(loaded.tree.get_path("custom.flag"), Some(&json!(true)));
        // Defaults are not mixed in at file level.
        assert!(loaded.tree.get_path("server.host").is_none());
    }

    #[test]
    fn test_type_error_falls_back_to_tolerant() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "launcher.config.yaml", "server:\n  port: 70000\n");

        let loaded = ConfigLoader::new().load(&path).unwrap();
        assert_eq!(loaded.outcome, LoadOutcome::Compiled(LoadStage::Tolerant));
        assert_eq!(loaded.tree.get_path("server.port"), Some(&json!(70000)));
    }

    #[test]
    fn test_yaml_tabs_recovered() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "launcher.config.yml", "server:\n\tport: 4000\n");

        let loaded = ConfigLoader::new().load(&path).unwrap();
        assert_eq!(loaded.outcome, LoadOutcome::Compiled(LoadStage::Tolerant));
        assert_eq!(loaded.tree.get_path("server.port"), Some(&json!(4000)));
    }

    #[test]
    fn test_broken_toml_uses_json_sibling() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "launcher.config.toml", "[server\nport = ");
        write(&dir, "launcher.config.json", r#"{"server": {"port": 9000}}"#);

        let loaded = ConfigLoader::new().load(&path).unwrap();
        assert_eq!(loaded.outcome, LoadOutcome::Interpreted(LoadStage::Sibling));
        assert_eq!(loaded.tree.get_path("server.port"), Some(&json!(9000)));
    }

    #[test]
    fn test_utf16_toml_reencoded() {
        let dir = TempDir::new().unwrap();
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "[server]\nport = 7000\n".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let path = write(&dir, "launcher.config.toml", bytes);

        let loaded = ConfigLoader::new().load(&path).unwrap();
        assert_eq!(loaded.outcome, LoadOutcome::Interpreted(LoadStage::Reencoded));
        assert_eq!(loaded.tree.get_path("server.port"), Some(&json!(7000)));
    }

    #[test]
    fn test_hopeless_toml_degrades_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "launcher.config.toml", "this is not = = toml [[[");

        let loaded = ConfigLoader::new().load(&path).unwrap();
        assert_eq!(loaded.outcome, LoadOutcome::Default);
        assert_eq!(loaded.tree, default_tree());
    }

    #[test]
    fn test_json_bom_retry() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "launcher.config.json", b"\xEF\xBB\xBF{\"server\":{\"port\":1234}}");

        let loaded = ConfigLoader::new().load(&path).unwrap();
        assert_eq!(loaded.outcome, LoadOutcome::Interpreted(LoadStage::Reencoded));
        assert_eq!(loaded.tree.get_path("server.port"), Some(&json!(1234)));
    }

    #[test]
    fn test_broken_json_propagates() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "launcher.config.json", "{ server: ");

        let err = ConfigLoader::new().load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_and_unsupported() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("launcher.config.toml");
        assert!(matches!(
            ConfigLoader::new().load(&missing),
            Err(ConfigError::NotFound(_))
        ));

        let ini = write(&dir, "launcher.config.ini", "port=1");
        assert!(matches!(
            ConfigLoader::new().load(&ini),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_deprecations_suppressed_during_compile() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "launcher.config.toml", "[devServer]\nopen = true\n");

        let loader = ConfigLoader::new();
        loader.load(&path).unwrap();
        assert_eq!(loader.diagnostics().suppressed_count(), 1);
        assert!(!loader.diagnostics().is_suppressing());
    }

    #[test]
    fn test_proxy_hoisting() {
        let mut tree = ConfigTree::from(json!({
            "proxy": {"/api": "http://a", "/ws": "ws://b"},
            "devServer": {"proxy": {"/legacy": "http://c"}},
            "server": {"proxy": {"/api": "http://kept"}}
        }));
        normalize_proxy(&mut tree);

        assert!(tree.get_path("proxy").is_none());
        assert!(tree.get_path("devServer.proxy").is_none());
        assert_eq!(
            tree.get_path("server.proxy"),
            Some(&json!({"/api": "http://kept", "/ws": "ws://b", "/legacy": "http://c"}))
        );
    }

    #[test]
    fn test_render_formats() {
        let tree = ConfigTree::from(json!({"server": {"port": 1, "host": null}}));
        let toml_text = Format::Toml.render(&tree).unwrap();
        assert!(toml_text.contains("port = 1"));
        assert!(!toml_text.contains("host"));

        let yaml_text = Format::Yaml.render(&tree).unwrap();
        assert!(yaml_text.contains("port: 1"));

        let json_text = Format::Json.render(&tree).unwrap();
        let back: Value = serde_json::from_str(&json_text).unwrap();
        assert_eq!(&back, tree.as_value());
    }
}
