//! Loader diagnostics sink.
//!
//! Parsing stages report notices (deprecated keys, recovered syntax) to an
//! explicit [`DiagnosticsSink`] instead of logging directly. Known deprecation
//! noise can be muted for the duration of a stage with
//! [`DiagnosticsSink::suppress_deprecations`]; the returned guard restores the
//! previous filter when dropped.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// A notice produced while parsing a configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A deprecated key or value form was used.
    Deprecation { key: String, hint: &'static str },
    /// Anything else worth surfacing.
    Notice(String),
}

/// Keys whose use is reported as deprecated, with a replacement hint.
pub const DEPRECATED_KEYS: &[(&str, &str)] = &[
    ("devServer", "use `server`"),
    ("proxy", "use `server.proxy`"),
    ("build.polyfillDynamicImport", "no longer needed"),
    ("server.force", "use `optimizeDeps.force`"),
];

/// Forwards diagnostics to `tracing`, honoring the current filter.
#[derive(Debug, Default)]
pub struct DiagnosticsSink {
    suppress_deprecations: AtomicBool,
    suppressed: AtomicUsize,
}

impl DiagnosticsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, diagnostic: Diagnostic) {
        match diagnostic {
            Diagnostic::Deprecation { key, hint } => {
                if self.suppress_deprecations.load(Ordering::Acquire) {
                    self.suppressed.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(key = %key, "Deprecation notice suppressed");
                } else {
                    tracing::warn!(key = %key, hint, "Deprecated configuration key");
                }
            }
            Diagnostic::Notice(message) => tracing::info!("{}", message),
        }
    }

    /// Mute deprecation notices until the guard is dropped.
    pub fn suppress_deprecations(&self) -> SuppressionGuard<'_> {
        let previous = self.suppress_deprecations.swap(true, Ordering::AcqRel);
        SuppressionGuard {
            sink: self,
            previous,
        }
    }

    pub fn is_suppressing(&self) -> bool {
        self.suppress_deprecations.load(Ordering::Acquire)
    }

    /// Number of notices muted so far.
    pub fn suppressed_count(&self) -> usize {
        self.suppressed.load(Ordering::Relaxed)
    }
}

/// Restores the sink's previous filter on drop.
#[must_use = "suppression ends when the guard is dropped"]
pub struct SuppressionGuard<'a> {
    sink: &'a DiagnosticsSink,
    previous: bool,
}

impl Drop for SuppressionGuard<'_> {
    fn drop(&mut self) {
        self.sink
            .suppress_deprecations
            .store(self.previous, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deprecation() -> Diagnostic {
        Diagnostic::Deprecation {
            key: "devServer".into(),
            hint: "use `server`",
        }
    }

    #[test]
    fn test_guard_restores_on_drop() {
        let sink = DiagnosticsSink::new();
        {
            let _guard = sink.suppress_deprecations();
            assert!(sink.is_suppressing());
            sink.emit(deprecation());
        }
        assert!(!sink.is_suppressing());
        sink.emit(deprecation());
        assert_eq!(sink.suppressed_count(), 1);
    }

    #[test]
    fn test_nested_guards_restore_outer_state() {
        let sink = DiagnosticsSink::new();
        let outer = sink.suppress_deprecations();
        {
            let _inner = sink.suppress_deprecations();
        }
        assert!(sink.is_suppressing());
        drop(outer);
        assert!(!sink.is_suppressing());
    }

    #[test]
    fn test_guard_restores_on_panic() {
        let sink = DiagnosticsSink::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = sink.suppress_deprecations();
            panic!("stage blew up");
        }));
        assert!(result.is_err());
        assert!(!sink.is_suppressing());
    }
}
