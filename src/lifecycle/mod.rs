//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Dev session (session.rs):
//!     Load config → Validate → Start bundler → Watch config files
//!     restart-class change → close bundler → start with new config
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → stop watching → close bundler → exit
//! ```
//!
//! # Design Decisions
//! - Fail fast: an invalid config stops the session before the bundler starts
//! - A failed restart is logged; the watch loop keeps running

pub mod session;
pub mod signals;

pub use session::{build_once, load_validated, preview_once, DevSession, SessionError};
