//! Configuration fingerprinting and version tracking.
//!
//! # Design Decisions
//! - The hash covers content only: objects are serialized with sorted keys,
//!   so insertion order never changes the fingerprint
//! - A version record is replaced on every change, never mutated in place
//! - Patch component bumps on each new hash, starting at 1.0.0

use semver::Version;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwapOption;

use crate::config::tree::ConfigTree;

/// Length of the hex fingerprint kept in version records.
const HASH_LEN: usize = 16;

/// A recorded configuration version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigVersion {
    pub version: Version,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub hash: String,
    pub source_file: Option<PathBuf>,
}

/// Stable content fingerprint of a configuration tree.
pub fn hash_config(config: &ConfigTree) -> String {
    let mut canonical = String::new();
    write_canonical(config.as_value(), &mut canonical);

    let digest = Sha256::digest(canonical.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(HASH_LEN);
    hex
}

/// Serialize with object keys sorted at every level.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Canonical JSON text of a value, used for order-insensitive comparisons.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Tracks the current configuration version.
#[derive(Default)]
pub struct VersionTracker {
    current: ArcSwapOption<ConfigVersion>,
}

impl VersionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a configuration, bumping the patch version if its hash changed.
    pub fn record(&self, config: &ConfigTree, source_file: Option<&Path>) -> ConfigVersion {
        let hash = hash_config(config);
        let previous = self.current.load_full();

        let version = match previous.as_deref() {
            None => Version::new(1, 0, 0),
            Some(prev) if prev.hash == hash => prev.version.clone(),
            Some(prev) => {
                let mut next = prev.version.clone();
                next.patch += 1;
                next
            }
        };

        let record = ConfigVersion {
            version,
            timestamp: now_millis(),
            hash,
            source_file: source_file.map(Path::to_path_buf),
        };

        match previous.as_deref() {
            Some(prev) if prev.version != record.version => {
                tracing::info!(
                    from = %prev.version,
                    to = %record.version,
                    hash = %record.hash,
                    "Configuration version bumped"
                );
            }
            None => {
                tracing::debug!(version = %record.version, hash = %record.hash, "Configuration version initialized");
            }
            _ => {}
        }

        self.current.store(Some(Arc::new(record.clone())));
        record
    }

    /// Whether `config` differs from the tracked version. True when nothing is tracked yet.
    pub fn has_changed(&self, config: &ConfigTree) -> bool {
        match self.current.load().as_deref() {
            Some(current) => current.hash != hash_config(config),
            None => true,
        }
    }

    pub fn current(&self) -> Option<ConfigVersion> {
        self.current.load_full().map(|v| v.as_ref().clone())
    }

    pub fn clear(&self) {
        self.current.store(None);
    }
}
