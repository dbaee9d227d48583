//! Configuration validation.
//!
//! # Responsibilities
//! - Structural checks on the merged tree (port ranges, types, enums)
//! - Caller-registered rules, run after the built-in checks
//! - Cache results by configuration hash
//!
//! # Design Decisions
//! - Returns all problems, not just the first; never fails with an error
//! - Failed results are cached too, so an unchanged invalid config is not
//!   re-checked on every reload
//! - Cache is bounded: expired entries go first, then the oldest half

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::config::schema::{LOG_LEVELS, MODES};
use crate::config::tree::ConfigTree;
use crate::config::version::hash_config;
use crate::observability::metrics;

/// Maximum number of cached results.
pub const CACHE_CAPACITY: usize = 50;

/// Default lifetime of a cached result.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Outcome of validating a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Problems reported by one rule.
#[derive(Debug, Clone, Default)]
pub struct RuleReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl RuleReport {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
            warnings: Vec::new(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            errors: Vec::new(),
            warnings: vec![message.into()],
        }
    }
}

/// A named, caller-supplied validation rule.
pub trait ValidationRule: Send + Sync {
    fn name(&self) -> &str;

    fn check(&self, config: &ConfigTree) -> RuleReport;
}

/// Rule backed by a closure.
pub struct FnRule<F> {
    name: String,
    check: F,
}

impl<F> FnRule<F>
where
    F: Fn(&ConfigTree) -> RuleReport + Send + Sync,
{
    pub fn new(name: impl Into<String>, check: F) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }
}

impl<F> ValidationRule for FnRule<F>
where
    F: Fn(&ConfigTree) -> RuleReport + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, config: &ConfigTree) -> RuleReport {
        (self.check)(config)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    result: ValidationResult,
    hash: String,
    timestamp: Instant,
}

/// Validator with a hash-keyed result cache.
pub struct Validator {
    rules: RwLock<Vec<Arc<dyn ValidationRule>>>,
    cache: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            cache: DashMap::new(),
            ttl,
        }
    }

    /// Validate `config`, serving from cache when possible.
    pub fn validate(&self, config: &ConfigTree) -> ValidationResult {
        let hash = hash_config(config);

        if let Some(entry) = self.cache.get(&hash) {
            if entry.timestamp.elapsed() < self.ttl && entry.hash == hash {
                metrics::record_validation(true);
                return entry.result.clone();
            }
        }
        metrics::record_validation(false);

        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        check_structure(config, &mut errors, &mut warnings);

        let rules = self.rules.read().expect("validation rules lock poisoned").clone();
        for rule in rules {
            let report = rule.check(config);
            for error in report.errors {
                errors.push(format!("[{}] {}", rule.name(), error));
            }
            for warning in report.warnings {
                warnings.push(format!("[{}] {}", rule.name(), warning));
            }
        }

        let result = ValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
        };

        if !result.valid {
            tracing::warn!(hash = %hash, errors = ?result.errors, "Configuration failed validation");
        }

        self.store(hash, result.clone());
        result
    }

    fn store(&self, hash: String, result: ValidationResult) {
        self.cache.insert(
            hash.clone(),
            CacheEntry {
                result,
                hash,
                timestamp: Instant::now(),
            },
        );
        if self.cache.len() > CACHE_CAPACITY {
            self.prune();
        }
    }

    /// Drop expired entries; if still over capacity, drop the oldest half.
    fn prune(&self) {
        let ttl = self.ttl;
        self.cache.retain(|_, entry| entry.timestamp.elapsed() < ttl);

        if self.cache.len() > CACHE_CAPACITY {
            let mut by_age: Vec<(String, Instant)> = self
                .cache
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().timestamp))
                .collect();
            by_age.sort_by_key(|(_, timestamp)| *timestamp);

            let evict = by_age.len() / 2;
            for (hash, _) in by_age.into_iter().take(evict) {
                self.cache.remove(&hash);
            }
            tracing::debug!(evicted = evict, remaining = self.cache.len(), "Validation cache pruned");
        }
    }

    /// Register a rule. A rule with the same name is replaced in place.
    pub fn add_rule(&self, rule: Arc<dyn ValidationRule>) {
        let mut rules = self.rules.write().expect("validation rules lock poisoned");
        match rules.iter().position(|r| r.name() == rule.name()) {
            Some(index) => rules[index] = rule,
            None => rules.push(rule),
        }
        drop(rules);
        self.clear_cache();
    }

    /// Remove a rule by name. Unknown names are ignored.
    pub fn remove_rule(&self, name: &str) -> bool {
        let mut rules = self.rules.write().expect("validation rules lock poisoned");
        let before = rules.len();
        rules.retain(|r| r.name() != name);
        let removed = rules.len() != before;
        drop(rules);
        if removed {
            self.clear_cache();
        }
        removed
    }

    pub fn rule_names(&self) -> Vec<String> {
        self.rules
            .read()
            .expect("validation rules lock poisoned")
            .iter()
            .map(|r| r.name().to_string())
            .collect()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

fn check_structure(config: &ConfigTree, errors: &mut Vec<String>, warnings: &mut Vec<String>) {
    match config.get_path("server.port") {
        Some(port) => check_port("server.port", port, errors),
        None => errors.push("server.port is required".to_string()),
    }

    if let Some(host) = config.get_path("server.host") {
        if !host.is_string() {
            errors.push(format!("server.host must be a string, got {}", type_name(host)));
        }
    }

    if let Some(port) = config.get_path("preview.port") {
        check_port("preview.port", port, errors);
    }

    if let Some(out_dir) = config.get_path("build.outDir") {
        match out_dir.as_str() {
            Some(dir) if !Path::new(dir).is_absolute() => warnings.push(format!(
                "build.outDir {:?} is relative and will be resolved against the project root",
                dir
            )),
            Some(_) => {}
            None => errors.push(format!("build.outDir must be a string, got {}", type_name(out_dir))),
        }
    }

    if let Some(target) = config.get_path("build.target") {
        let ok = match target {
            Value::String(_) => true,
            Value::Array(items) => items.iter().all(Value::is_string),
            _ => false,
        };
        if !ok {
            errors.push("build.target must be a string or a list of strings".to_string());
        }
    }

    check_enum(config, "logLevel", LOG_LEVELS, errors);
    check_enum(config, "mode", MODES, errors);
}

fn check_port(field: &str, value: &Value, errors: &mut Vec<String>) {
    match value.as_i64() {
        Some(port) if (1..=65535).contains(&port) => {}
        Some(port) => errors.push(format!("{} must be between 1 and 65535, got {}", field, port)),
        None => errors.push(format!("{} must be an integer, got {}", field, value)),
    }
}

fn check_enum(config: &ConfigTree, field: &str, allowed: &[&str], errors: &mut Vec<String>) {
    if let Some(value) = config.get_path(field) {
        match value.as_str() {
            Some(s) if allowed.contains(&s) => {}
            _ => errors.push(format!("{} must be one of {:?}, got {}", field, allowed, value)),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::default_tree;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_rule(counter: Arc<AtomicUsize>) -> Arc<dyn ValidationRule> {
        Arc::new(FnRule::new("counter", move |_config: &ConfigTree| {
            counter.fetch_add(1, Ordering::SeqCst);
            RuleReport::default()
        }))
    }

    #[test]
    fn test_defaults_are_valid() {
        let result = Validator::new().validate(&default_tree());
        assert!(result.valid, "{:?}", result.errors);
        // Default outDir is relative.
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_structural_errors_are_collected() {
        let config = ConfigTree::from(json!({
            "server": {"port": 70000, "host": 12},
            "preview": {"port": "4173"},
            "build": {"outDir": 5, "target": ["es2020", 1]},
            "logLevel": "verbose",
            "mode": "staging"
        }));

        let result = Validator::new().validate(&config);
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 7, "{:#?}", result.errors);
        assert!(result.errors.iter().any(|e| e.contains("server.port")));
        assert!(result.errors.iter().any(|e| e.contains("mode")));
    }

    #[test]
    fn test_missing_port_is_an_error() {
        let result = Validator::new().validate(&ConfigTree::default());
        assert!(!result.valid);
        assert_eq!(result.errors, vec!["server.port is required".to_string()]);
    }

    #[test]
    fn test_absolute_out_dir_has_no_warning() {
        let config = ConfigTree::from(json!({"server": {"port": 80}, "build": {"outDir": "/srv/www"}}));
        let result = Validator::new().validate(&config);
        assert!(result.valid);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_results_are_cached_by_hash() {
        let calls = Arc::new(AtomicUsize::new(0));
        let validator = Validator::new();
        validator.add_rule(counting_rule(calls.clone()));

        let mut config = default_tree();
        validator.validate(&config);
        validator.validate(&config.clone());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        config.set_path("server.port", json!(8080));
        validator.validate(&config);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(validator.cache_len(), 2);
    }

    #[test]
    fn test_invalid_results_are_cached_too() {
        let calls = Arc::new(AtomicUsize::new(0));
        let validator = Validator::new();
        validator.add_rule(counting_rule(calls.clone()));

        let config = ConfigTree::from(json!({"server": {"port": 0}}));
        assert!(!validator.validate(&config).valid);
        assert!(!validator.validate(&config).valid);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_expired_entries_are_recomputed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let validator = Validator::with_ttl(Duration::ZERO);
        validator.add_rule(counting_rule(calls.clone()));

        let config = default_tree();
        validator.validate(&config);
        validator.validate(&config);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cache_is_bounded() {
        let validator = Validator::new();
        for port in 1..=(CACHE_CAPACITY as i64 + 1) {
            validator.validate(&ConfigTree::from(json!({"server": {"port": port}})));
        }
        assert!(validator.cache_len() <= CACHE_CAPACITY);
        assert!(validator.cache_len() >= CACHE_CAPACITY / 2);
    }

    #[test]
    fn test_custom_rules() {
        let validator = Validator::new();
        validator.add_rule(Arc::new(FnRule::new("https-in-prod", |config: &ConfigTree| {
            let prod = config.get_path("mode") == Some(&json!("production"));
            let https = config.get_path("server.https") == Some(&json!(true));
            if prod && !https {
                RuleReport::error("production requires https")
            } else {
                RuleReport::default()
            }
        })));
        validator.add_rule(Arc::new(FnRule::new("nag", |_: &ConfigTree| {
            RuleReport::warning("consider a preset")
        })));

        let mut config = default_tree();
        config.set_path("mode", json!("production"));
        let result = validator.validate(&config);
        assert_eq!(result.errors, vec!["[https-in-prod] production requires https".to_string()]);
        assert!(result.warnings.contains(&"[nag] consider a preset".to_string()));

        assert!(validator.remove_rule("https-in-prod"));
        assert!(!validator.remove_rule("https-in-prod"));
        assert!(validator.validate(&config).valid);
        assert_eq!(validator.rule_names(), vec!["nag".to_string()]);
    }

    #[test]
    fn test_adding_rule_with_same_name_replaces() {
        let validator = Validator::new();
        validator.add_rule(Arc::new(FnRule::new("r", |_: &ConfigTree| RuleReport::error("first"))));
        validator.add_rule(Arc::new(FnRule::new("r", |_: &ConfigTree| RuleReport::error("second"))));

        let result = validator.validate(&default_tree());
        assert_eq!(result.errors, vec!["[r] second".to_string()]);
    }
}
