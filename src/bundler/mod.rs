//! Bundler collaborator interface.
//!
//! # Data Flow
//! ```text
//! lifecycle::DevSession
//!     → Bundler::start(config)      dev server up, emits Ready { url }
//!     → Bundler::close() + start()  on a restart-class config change
//!     → Bundler::build / preview    one-shot CLI commands
//! ```
//!
//! # Design Decisions
//! - Methods return boxed futures so the trait stays object-safe without a
//!   proc-macro
//! - Implementations use interior mutability; the session shares them via `Arc`

use futures_util::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::config::schema::{check_types, LauncherConfig};
use crate::config::tree::ConfigTree;

/// Lifecycle notifications from a bundler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundlerEvent {
    Ready { url: String },
    Error { message: String },
}

#[derive(Debug, Error)]
pub enum BundlerError {
    #[error("bundler configuration rejected: {0}")]
    InvalidConfig(String),

    #[error("bundler is not running")]
    NotRunning,

    #[error("bundler failed: {0}")]
    Failed(String),
}

/// The tool the launcher drives.
pub trait Bundler: Send + Sync + 'static {
    fn start(&self, config: ConfigTree) -> BoxFuture<'_, Result<(), BundlerError>>;
    fn build(&self, config: ConfigTree) -> BoxFuture<'_, Result<(), BundlerError>>;
    fn preview(&self, config: ConfigTree) -> BoxFuture<'_, Result<(), BundlerError>>;
    fn close(&self) -> BoxFuture<'_, Result<(), BundlerError>>;
    fn subscribe(&self) -> broadcast::Receiver<BundlerEvent>;
}

fn typed(config: &ConfigTree) -> Result<LauncherConfig, BundlerError> {
    check_types(config.as_value()).map_err(|e| BundlerError::InvalidConfig(e.to_string()))
}

fn url(https: bool, host: &str, port: u16) -> String {
    let scheme = if https { "https" } else { "http" };
    format!("{}://{}:{}/", scheme, host, port)
}

/// Logs what it would run and reports success.
pub struct DryRunBundler {
    events: broadcast::Sender<BundlerEvent>,
    running: AtomicBool,
}

impl Default for DryRunBundler {
    fn default() -> Self {
        Self::new()
    }
}

impl DryRunBundler {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            events,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Bundler for DryRunBundler {
    fn start(&self, config: ConfigTree) -> BoxFuture<'_, Result<(), BundlerError>> {
        Box::pin(async move {
            let typed = typed(&config)?;
            let server = &typed.server;
            let url = url(server.https.is_enabled(), &server.host, server.port);
            tracing::info!(
                url = %url,
                root = %typed.root,
                plugins = typed.plugins.len(),
                "Would start dev server"
            );
            self.running.store(true, Ordering::Release);
            let _ = self.events.send(BundlerEvent::Ready { url });
            Ok(())
        })
    }

    fn build(&self, config: ConfigTree) -> BoxFuture<'_, Result<(), BundlerError>> {
        Box::pin(async move {
            let typed = typed(&config)?;
            tracing::info!(
                out_dir = %typed.build.out_dir,
                minify = typed.build.minify,
                sourcemap = typed.build.sourcemap,
                "Would run production build"
            );
            Ok(())
        })
    }

    fn preview(&self, config: ConfigTree) -> BoxFuture<'_, Result<(), BundlerError>> {
        Box::pin(async move {
            let typed = typed(&config)?;
            let host = typed.preview.host.as_deref().unwrap_or(&typed.server.host);
            let url = url(false, host, typed.preview.port);
            tracing::info!(url = %url, out_dir = %typed.build.out_dir, "Would serve build output");
            let _ = self.events.send(BundlerEvent::Ready { url });
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), BundlerError>> {
        Box::pin(async move {
            if !self.running.swap(false, Ordering::AcqRel) {
                return Err(BundlerError::NotRunning);
            }
            tracing::info!("Would stop dev server");
            Ok(())
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<BundlerEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::default_tree;
    use serde_json::json;

    #[tokio::test]
    async fn test_dry_run_start_emits_ready() {
        let bundler = DryRunBundler::new();
        let mut events = bundler.subscribe();

        bundler.start(default_tree()).await.unwrap();
        assert!(bundler.is_running());
        assert_eq!(
            events.recv().await.unwrap(),
            BundlerEvent::Ready {
                url: "http://localhost:5173/".to_string()
            }
        );

        bundler.close().await.unwrap();
        assert!(matches!(bundler.close().await, Err(BundlerError::NotRunning)));
    }

    #[tokio::test]
    async fn test_dry_run_rejects_mistyped_config() {
        let bundler = DryRunBundler::new();
        let bad = ConfigTree::from(json!({"server": {"port": "eighty"}}));
        assert!(matches!(
            bundler.start(bad).await,
            Err(BundlerError::InvalidConfig(_))
        ));
        assert!(!bundler.is_running());
    }
}
