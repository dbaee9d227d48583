//! `launcher` command line.
//!
//! # Architecture Overview
//!
//! ```text
//!   CLI flags ───────────────┐
//!                            ▼
//!   cwd ──▶ resolver ──▶ loader ──▶ merge ──▶ ConfigManager ──▶ validate
//!                                                 │
//!            notify ──▶ throttle ──▶ reload ──────┤
//!                                                 ▼
//!                                  classify ──▶ restart / hot update
//!                                                 │
//!                                                 ▼
//!                                             Bundler
//! ```

use clap::{Args, Parser, Subcommand};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use launcher::config::resolver;
use launcher::config::schema::MODES;
use launcher::config::watcher::WatchOptions;
use launcher::lifecycle::{build_once, preview_once, DevSession};
use launcher::observability::logging;
use launcher::{ConfigManager, ConfigTree, DryRunBundler, LoadOptions};

#[derive(Parser)]
#[command(name = "launcher", version)]
#[command(about = "Resolve, validate and hot-reload dev-server configuration", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Project directory
    #[arg(long, global = true, default_value = ".")]
    cwd: PathBuf,

    /// Explicit config file (must exist)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Environment whose overlay file is merged in
    #[arg(short, long, global = true)]
    mode: Option<String>,

    /// Dev-server port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Dev-server host
    #[arg(long, global = true)]
    host: Option<String>,

    /// info, warn, error or silent
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the dev server and reload on config changes
    Dev {
        /// Do not watch config files
        #[arg(long)]
        no_watch: bool,

        /// Throttle window for reloads, in milliseconds
        #[arg(long, default_value_t = 300)]
        delay_ms: u64,
    },
    /// Run a production build
    Build,
    /// Serve the build output
    Preview,
    /// Validate the merged configuration
    Validate,
    /// Print the merged configuration as JSON
    Show,
    /// Print the resolved config files
    Which,
}

impl GlobalArgs {
    /// CLI flags as the highest-priority merge layer.
    fn overrides(&self) -> Option<ConfigTree> {
        let mut layer = Map::new();
        let mut server = Map::new();
        if let Some(port) = self.port {
            server.insert("port".to_string(), json!(port));
        }
        if let Some(host) = &self.host {
            server.insert("host".to_string(), json!(host));
        }
        if !server.is_empty() {
            layer.insert("server".to_string(), Value::Object(server));
        }
        if let Some(level) = &self.log_level {
            layer.insert("logLevel".to_string(), json!(level));
        }
        if let Some(mode) = self.mode.as_deref().filter(|m| MODES.contains(m)) {
            layer.insert("mode".to_string(), json!(mode));
        }

        (!layer.is_empty()).then(|| ConfigTree::from(Value::Object(layer)))
    }

    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            cwd: self.cwd.clone(),
            config_file: self.config.clone(),
            environment: self.mode.clone(),
            presets: Vec::new(),
            overrides: self.overrides(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(cli.global.log_level.as_deref());

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "launcher starting");

    let manager = ConfigManager::new();
    let options = cli.global.load_options();

    match cli.command {
        Commands::Dev { no_watch, delay_ms } => {
            let watch = (!no_watch).then(|| WatchOptions::with_delay(std::time::Duration::from_millis(delay_ms)));
            let session = DevSession::new(manager, Arc::new(DryRunBundler::new())).with_watch(watch);
            session.run(options).await?;
        }
        Commands::Build => {
            build_once(&manager, &DryRunBundler::new(), options).await?;
        }
        Commands::Preview => {
            preview_once(&manager, &DryRunBundler::new(), options).await?;
        }
        Commands::Validate => {
            let config = manager.load(options)?;
            let result = manager.validate(&config);
            for warning in &result.warnings {
                println!("warning: {}", warning);
            }
            for error in &result.errors {
                println!("error: {}", error);
            }
            if !result.valid {
                return Ok(ExitCode::FAILURE);
            }
            println!("configuration is valid");
        }
        Commands::Show => {
            let config = manager.load(options)?;
            println!("{}", serde_json::to_string_pretty(config.as_value())?);
        }
        Commands::Which => {
            let cwd = &cli.global.cwd;
            let base = match &cli.global.config {
                Some(explicit) => Some(cwd.join(explicit)),
                None => resolver::resolve(cwd),
            };
            match base {
                Some(path) => println!("base: {}", path.display()),
                None => println!("base: (none, using defaults)"),
            }
            if let Some(env) = &cli.global.mode {
                match resolver::resolve_overlay(cwd, env)? {
                    Some(path) => println!("overlay: {}", path.display()),
                    None => println!("overlay: (none for {})", env),
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
