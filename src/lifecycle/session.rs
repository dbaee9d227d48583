//! Dev session: keeps a bundler in step with the project's configuration.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, watch};

use crate::bundler::{Bundler, BundlerError, BundlerEvent};
use crate::config::manager::{restart_callback, ConfigManager, LoadOptions};
use crate::config::tree::ConfigTree;
use crate::config::watcher::WatchOptions;
use crate::config::ConfigError;
use crate::lifecycle::signals::shutdown_signal;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error(transparent)]
    Bundler(#[from] BundlerError),
}

/// Load and validate. Warnings are logged; errors fail the load.
pub fn load_validated(manager: &ConfigManager, options: LoadOptions) -> Result<ConfigTree, SessionError> {
    let config = manager.load(options)?;
    let result = manager.validate(&config);
    for warning in &result.warnings {
        tracing::warn!(warning = %warning, "Configuration warning");
    }
    if !result.valid {
        for error in &result.errors {
            tracing::error!(error = %error, "Configuration error");
        }
        return Err(SessionError::Invalid(result.errors));
    }
    Ok(config)
}

/// Load, validate and run one production build.
pub async fn build_once<B: Bundler>(
    manager: &ConfigManager,
    bundler: &B,
    options: LoadOptions,
) -> Result<ConfigTree, SessionError> {
    let config = load_validated(manager, options)?;
    bundler.build(config.clone()).await?;
    Ok(config)
}

/// Load, validate and serve the build output.
pub async fn preview_once<B: Bundler>(
    manager: &ConfigManager,
    bundler: &B,
    options: LoadOptions,
) -> Result<ConfigTree, SessionError> {
    let config = load_validated(manager, options)?;
    bundler.preview(config.clone()).await?;
    Ok(config)
}

async fn restart_bundler<B: Bundler>(bundler: &B, config: ConfigTree) {
    tracing::info!("Restarting bundler with new configuration");
    match bundler.close().await {
        Ok(()) | Err(BundlerError::NotRunning) => {}
        Err(e) => tracing::warn!(error = %e, "Bundler did not close cleanly"),
    }
    if let Err(e) = bundler.start(config).await {
        tracing::error!(error = %e, "Bundler restart failed");
    }
}

pub struct DevSession<B: Bundler> {
    manager: ConfigManager,
    bundler: Arc<B>,
    watch: Option<WatchOptions>,
    stop: watch::Sender<bool>,
}

impl<B: Bundler> DevSession<B> {
    pub fn new(manager: ConfigManager, bundler: Arc<B>) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            manager,
            bundler,
            watch: Some(WatchOptions::default()),
            stop,
        }
    }

    /// `None` disables file watching; restarts then only follow explicit
    /// `ConfigManager::reload` calls.
    pub fn with_watch(mut self, watch: Option<WatchOptions>) -> Self {
        self.watch = watch;
        self
    }

    pub fn manager(&self) -> &ConfigManager {
        &self.manager
    }

    pub fn bundler(&self) -> &Arc<B> {
        &self.bundler
    }

    /// Load, validate, start the bundler and begin watching.
    pub async fn start(&self, options: LoadOptions) -> Result<ConfigTree, SessionError> {
        let config = load_validated(&self.manager, options)?;
        self.bundler.start(config.clone()).await?;

        let bundler = Arc::clone(&self.bundler);
        let on_restart = restart_callback(move |config: ConfigTree| {
            let bundler = Arc::clone(&bundler);
            async move { restart_bundler(bundler.as_ref(), config).await }
        });

        match self.watch {
            Some(options) => self.manager.watch(options, on_restart)?,
            None => self.manager.set_restart_handler(on_restart),
        }
        tracing::info!("Dev session started");
        Ok(config)
    }

    /// Ask a running `run` loop to finish.
    pub fn request_stop(&self) {
        self.stop.send_replace(true);
    }

    /// Tear down the engine and close the bundler.
    pub async fn stop(&self) -> Result<(), SessionError> {
        self.manager.destroy();
        match self.bundler.close().await {
            Ok(()) | Err(BundlerError::NotRunning) => {}
            Err(e) => return Err(e.into()),
        }
        tracing::info!("Dev session stopped");
        Ok(())
    }

    /// Start, then log bundler events until a shutdown signal or `request_stop`.
    pub async fn run(&self, options: LoadOptions) -> Result<(), SessionError> {
        let mut events = self.bundler.subscribe();
        let mut stop = self.stop.subscribe();
        self.start(options).await?;

        let signal = shutdown_signal();
        tokio::pin!(signal);

        while !*stop.borrow_and_update() {
            tokio::select! {
                _ = &mut signal => break,
                _ = stop.changed() => {}
                event = events.recv() => match event {
                    Ok(BundlerEvent::Ready { url }) => tracing::info!(url = %url, "Dev server ready"),
                    Ok(BundlerEvent::Error { message }) => tracing::error!(message = %message, "Bundler error"),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Bundler events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        self.stop().await
    }
}
