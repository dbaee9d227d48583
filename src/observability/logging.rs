//! Structured logging setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive for a configured `logLevel`.
pub fn directive(level: Option<&str>) -> &'static str {
    match level {
        Some("silent") => "off",
        Some("error") => "launcher=error",
        Some("warn") => "launcher=warn",
        Some("debug") => "launcher=debug",
        Some("trace") => "launcher=trace",
        _ => "launcher=info",
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
pub fn init(level: Option<&str>) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| directive(level).into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
