//! Dev-server launcher: configuration resolution, merging, validation and
//! hot reload in front of a web bundler.

pub mod bundler;
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use bundler::{Bundler, BundlerEvent, DryRunBundler};
pub use config::{ConfigError, ConfigManager, ConfigTree, LoadOptions};
pub use lifecycle::DevSession;
