//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

use launcher::config::ConfigEvent;

/// A throwaway project directory.
pub struct Project {
    dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let project = Self::new();
        for (name, content) in files {
            project.write(name, content);
        }
        project
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write(&self, name: &str, content: &str) {
        let path = self.file(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// Write through a temp file and rename, so watchers never see a
    /// half-written file.
    pub fn replace(&self, name: &str, content: &str) {
        let target = self.file(name);
        let staging = self.dir.path().join(".staging.tmp");
        fs::write(&staging, content).unwrap();
        fs::rename(staging, target).unwrap();
    }
}

/// Wait for the first event matching `pred`, or `None` on timeout/close.
pub async fn next_event<F>(
    rx: &mut broadcast::Receiver<ConfigEvent>,
    within: Duration,
    pred: F,
) -> Option<ConfigEvent>
where
    F: Fn(&ConfigEvent) -> bool,
{
    tokio::time::timeout(within, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return Some(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}
