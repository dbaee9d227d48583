//! Configuration schema definitions.
//!
//! The typed schema serves two purposes: it produces the built-in default
//! tree, and it is the strict type check applied by the loader's fast path.
//! Loaded files stay untyped ([`ConfigTree`]) after the check so that unknown,
//! tool-specific sections survive merging.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::config::tree::ConfigTree;

/// Default dev-server port.
pub const DEFAULT_PORT: u16 = 5173;

/// Default preview-server port.
pub const DEFAULT_PREVIEW_PORT: u16 = 4173;

/// Accepted values for `logLevel`.
pub const LOG_LEVELS: &[&str] = &["info", "warn", "error", "silent"];

/// Accepted values for `mode`.
pub const MODES: &[&str] = &["development", "production", "test"];

/// Root configuration for a launcher project.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LauncherConfig {
    /// Project root directory.
    pub root: String,

    /// Run mode (development, production, test).
    pub mode: String,

    /// Log level (info, warn, error, silent).
    pub log_level: String,

    /// Active framework preset name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,

    /// Bundler plugin list, passed through untouched.
    pub plugins: Vec<Value>,

    /// Dev-server settings.
    pub server: ServerConfig,

    /// Preview-server settings.
    pub preview: PreviewConfig,

    /// Production build settings.
    pub build: BuildConfig,

    /// Module resolution settings.
    pub resolve: ResolveConfig,

    /// CSS handling.
    pub css: CssConfig,

    /// Global compile-time constant replacements.
    pub define: Map<String, Value>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            root: ".".to_string(),
            mode: "development".to_string(),
            log_level: "info".to_string(),
            preset: None,
            plugins: Vec::new(),
            server: ServerConfig::default(),
            preview: PreviewConfig::default(),
            build: BuildConfig::default(),
            resolve: ResolveConfig::default(),
            css: CssConfig::default(),
            define: Map::new(),
        }
    }
}

/// Dev-server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub port: u16,

    pub host: String,

    /// TLS flag, or certificate paths.
    pub https: HttpsSetting,

    pub cors: bool,

    /// Fail instead of picking the next free port.
    pub strict_port: bool,

    /// Path prefix → target (string or options table).
    pub proxy: Map<String, Value>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            host: "localhost".to_string(),
            https: HttpsSetting::Enabled(false),
            cors: true,
            strict_port: false,
            proxy: Map::new(),
        }
    }
}

/// `server.https` accepts a flag or a certificate pair.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum HttpsSetting {
    Enabled(bool),
    Certificate { cert: String, key: String },
    /// Deprecated: a single PEM bundle path.
    Bundle(String),
}

impl HttpsSetting {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, HttpsSetting::Enabled(false))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PreviewConfig {
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PREVIEW_PORT,
            host: None,
        }
    }
}

/// Production build configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BuildConfig {
    /// Output directory, relative to `root`.
    pub out_dir: String,

    /// Browser target(s).
    pub target: BuildTarget,

    pub sourcemap: bool,

    pub minify: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            out_dir: "dist".to_string(),
            target: BuildTarget::One("modules".to_string()),
            sourcemap: false,
            minify: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum BuildTarget {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolveConfig {
    pub alias: AliasSetting,
}

/// `resolve.alias` as either a list of entries or a find → replacement map.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AliasSetting {
    List(Vec<AliasItem>),
    Map(BTreeMap<String, String>),
}

impl Default for AliasSetting {
    fn default() -> Self {
        AliasSetting::List(Vec::new())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AliasItem {
    pub find: String,
    pub replacement: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CssConfig {
    /// CSS-modules options, passed through untouched.
    pub modules: Value,
}

impl Default for CssConfig {
    fn default() -> Self {
        Self {
            modules: Value::Object(Map::new()),
        }
    }
}

/// The built-in default configuration tree.
pub fn default_tree() -> ConfigTree {
    // LauncherConfig only holds JSON-representable data.
    ConfigTree::from(serde_json::to_value(LauncherConfig::default()).unwrap_or_default())
}

/// Strict type check of an untyped tree against the schema.
pub fn check_types(value: &Value) -> Result<LauncherConfig, serde_json::Error> {
    LauncherConfig::deserialize(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_tree_shape() {
        let tree = default_tree();
        assert_eq!(tree.get_path("server.port"), Some(&json!(DEFAULT_PORT)));
        assert_eq!(tree.get_path("preview.port"), Some(&json!(DEFAULT_PREVIEW_PORT)));
        assert_eq!(tree.get_path("build.outDir"), Some(&json!("dist")));
        assert_eq!(tree.get_path("server.https"), Some(&json!(false)));
        assert_eq!(tree.get_path("resolve.alias"), Some(&json!([])));
        assert!(tree.get_path("preset").is_none());
    }

    #[test]
    fn test_check_types_accepts_partial_documents() {
        let value = json!({
            "server": {"port": 3000, "https": {"cert": "a.pem", "key": "b.pem"}},
            "build": {"target": ["es2020", "chrome90"]},
            "resolve": {"alias": {"@": "./src"}},
            "somePlugin": {"anything": true}
        });
        let config = check_types(&value).unwrap();
        assert_eq!(config.server.port, 3000);
        assert!(matches!(config.build.target, BuildTarget::Many(ref t) if t.len() == 2));
        assert!(matches!(config.resolve.alias, AliasSetting::Map(_)));
    }

    #[test]
    fn test_check_types_rejects_wrong_types() {
        assert!(check_types(&json!({"server": {"port": "3000"}})).is_err());
        assert!(check_types(&json!({"server": {"port": 70000}})).is_err());
        assert!(check_types(&json!({"build": {"target": 5}})).is_err());
    }
}
