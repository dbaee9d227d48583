//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! config subsystem produces:
//!     → logging.rs (structured tracing events, one subscriber per process)
//!     → metrics.rs (counters through the `metrics` facade)
//!
//! Consumers:
//!     → stderr via tracing-subscriber's fmt layer
//!     → whatever recorder the embedding process installs
//! ```
//!
//! # Design Decisions
//! - No exporter is installed; without a recorder the counters are no-ops
//! - `RUST_LOG` overrides the CLI log level

pub mod logging;
pub mod metrics;
