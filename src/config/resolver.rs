//! Config file resolution.
//!
//! # Search order
//! ```text
//! for dir in [<cwd>/.launcher, <cwd>]
//!   for naming in [modern, legacy]
//!     for ext in SUPPORTED_EXTENSIONS
//!
//! base:     launcher.config<ext>        | launcher.default.config<ext>
//! overlay:  launcher.config.<env><ext>  | launcher.<env>.config<ext>
//! ```
//! The first existing candidate wins. A missing file is not an error: the
//! caller falls back to built-in defaults.

use std::path::{Path, PathBuf};

use crate::config::error::{ConfigError, Result};

/// Tool name used in file names.
pub const TOOL_NAME: &str = "launcher";

/// Dedicated tool subdirectory, searched before the project root.
pub const TOOL_DIR: &str = ".launcher";

/// Supported extensions, in priority order.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[".toml", ".yaml", ".yml", ".json"];

/// Name segment of the legacy base file (`launcher.default.config.toml`).
const LEGACY_BASE_NAME: &str = "default";

/// Base file names in priority order, without directory.
pub fn base_file_names() -> Vec<String> {
    let mut names = Vec::new();
    for ext in SUPPORTED_EXTENSIONS {
        names.push(format!("{}.config{}", TOOL_NAME, ext));
    }
    for ext in SUPPORTED_EXTENSIONS {
        names.push(format!("{}.{}.config{}", TOOL_NAME, LEGACY_BASE_NAME, ext));
    }
    names
}

/// Overlay file names for `environment` in priority order, without directory.
pub fn overlay_file_names(environment: &str) -> Vec<String> {
    let mut names = Vec::new();
    for ext in SUPPORTED_EXTENSIONS {
        names.push(format!("{}.config.{}{}", TOOL_NAME, environment, ext));
    }
    for ext in SUPPORTED_EXTENSIONS {
        names.push(format!("{}.{}.config{}", TOOL_NAME, environment, ext));
    }
    names
}

/// Directories searched for configuration, highest priority first.
pub fn search_dirs(cwd: &Path) -> [PathBuf; 2] {
    [cwd.join(TOOL_DIR), cwd.to_path_buf()]
}

/// Existing search directories; the watch loop observes these.
pub fn watch_dirs(cwd: &Path) -> Vec<PathBuf> {
    search_dirs(cwd).into_iter().filter(|d| d.is_dir()).collect()
}

/// Every base candidate path in priority order.
pub fn candidate_files(cwd: &Path) -> Vec<PathBuf> {
    expand(cwd, &base_file_names())
}

/// Every overlay candidate path for `environment` in priority order.
pub fn overlay_candidates(cwd: &Path, environment: &str) -> Result<Vec<PathBuf>> {
    check_environment(environment)?;
    Ok(expand(cwd, &overlay_file_names(environment)))
}

fn expand(cwd: &Path, names: &[String]) -> Vec<PathBuf> {
    search_dirs(cwd)
        .iter()
        .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
        .collect()
}

/// Resolve the base configuration file.
pub fn resolve(cwd: &Path) -> Option<PathBuf> {
    let found = candidate_files(cwd).into_iter().find(|p| p.is_file());
    match &found {
        Some(path) => tracing::debug!(path = %path.display(), "Resolved config file"),
        None => tracing::debug!(cwd = %cwd.display(), "No config file found, using defaults"),
    }
    found
}

/// Resolve the overlay file for `environment`.
pub fn resolve_overlay(cwd: &Path, environment: &str) -> Result<Option<PathBuf>> {
    let found = overlay_candidates(cwd, environment)?
        .into_iter()
        .find(|p| p.is_file());
    if let Some(path) = &found {
        tracing::debug!(path = %path.display(), environment, "Resolved environment overlay");
    }
    Ok(found)
}

/// Environment names end up in file names; keep them to a safe alphabet.
fn check_environment(environment: &str) -> Result<()> {
    let valid = !environment.is_empty()
        && environment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidEnvironment(environment.to_string()))
    }
}

/// Whether a file name looks like a launcher configuration file.
pub fn is_config_file_name(name: &str) -> bool {
    name.contains(TOOL_NAME) && name.contains("config")
}
