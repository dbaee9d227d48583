//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! cwd
//!     → resolver.rs (find base file and environment overlay)
//!     → loader.rs (parse with fallback chain → LoadOutcome)
//!     → merge.rs (defaults ← presets ← base ← overlay ← overrides)
//!     → version.rs (hash, bump patch on change)
//!     → ConfigTree snapshot behind ArcSwap in manager.rs
//!
//! On file change:
//!     watcher.rs (notify → mpsc → throttle.rs)
//!     → manager.rs reloads with the last load options
//!     → classify.rs decides restart / alias hot update / hot update / nothing
//!     → events.rs broadcast to subscribers
//! ```
//!
//! # Design Decisions
//! - The snapshot is a JSON tree; typed views come from `schema::check_types`
//! - Readers get copies, never the stored tree
//! - TOML and YAML go through the typed check; JSON is loaded as-is
//! - A broken schema-checked file degrades to defaults instead of failing

pub mod classify;
pub mod diagnostics;
pub mod encoding;
pub mod error;
pub mod events;
pub mod loader;
pub mod manager;
pub mod merge;
pub mod resolver;
pub mod schema;
pub mod throttle;
pub mod tree;
pub mod validation;
pub mod version;
pub mod watcher;

pub use classify::{ChangeClassification, ReloadAction};
pub use error::ConfigError;
pub use events::ConfigEvent;
pub use loader::LoadOutcome;
pub use manager::{restart_callback, ConfigManager, LoadOptions, RestartCallback};
pub use schema::LauncherConfig;
pub use tree::{AliasEntry, ConfigTree};
pub use validation::{ValidationResult, ValidationRule};
pub use version::ConfigVersion;
pub use watcher::{WatchOptions, WatchState};
