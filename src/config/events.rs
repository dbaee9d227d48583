//! Notifications published by the config manager.
//!
//! Events go out on a `tokio::sync::broadcast` channel. A slow subscriber
//! lags and loses events; it never blocks the manager.

use std::path::PathBuf;

use crate::config::classify::{AliasDiff, ChangeClassification};
use crate::config::tree::{AliasEntry, ConfigTree};
use crate::config::version::ConfigVersion;

/// Capacity of the event channel.
pub const EVENT_CAPACITY: usize = 256;

/// Payload of `update_config` notifications.
#[derive(Debug, Clone)]
pub struct ConfigDelta {
    pub updates: ConfigTree,
    pub new_config: ConfigTree,
    pub old_config: ConfigTree,
}

/// Everything the manager announces.
#[derive(Debug, Clone)]
pub enum ConfigEvent {
    /// `load` finished.
    Loaded {
        config: ConfigTree,
        source: Option<PathBuf>,
        version: ConfigVersion,
    },
    /// `save` wrote a file.
    Saved { path: PathBuf },
    /// Emitted by `update_config` before the new snapshot is committed.
    Change(ConfigDelta),
    /// Emitted by `update_config` after commit.
    Changed(ConfigDelta),
    /// `update_config` finished, with the resulting tree.
    Updated(ConfigTree),
    /// A watch-loop reload committed a new snapshot.
    ConfigChanged {
        config: ConfigTree,
        classification: ChangeClassification,
        version: ConfigVersion,
    },
    /// Hot-applicable fields changed; no restart needed.
    HotUpdate {
        config: ConfigTree,
        classification: ChangeClassification,
    },
    /// The alias list changed.
    AliasChanged {
        old: Vec<AliasEntry>,
        new: Vec<AliasEntry>,
    },
    /// Per-entry alias changes for consumers that can apply them live.
    AliasHotUpdate(AliasDiff),
    /// `reset` restored the built-in defaults.
    Reset(ConfigTree),
}

impl ConfigEvent {
    /// Stable event name, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            ConfigEvent::Loaded { .. } => "configLoaded",
            ConfigEvent::Saved { .. } => "configSaved",
            ConfigEvent::Change(_) => "change",
            ConfigEvent::Changed(_) => "changed",
            ConfigEvent::Updated(_) => "configUpdated",
            ConfigEvent::ConfigChanged { .. } => "configChanged",
            ConfigEvent::HotUpdate { .. } => "configHotUpdate",
            ConfigEvent::AliasChanged { .. } => "aliasChanged",
            ConfigEvent::AliasHotUpdate(_) => "aliasHotUpdate",
            ConfigEvent::Reset(_) => "reset",
        }
    }
}
