//! Counters for the config subsystem.
//!
//! # Metrics
//! - `launcher_config_loads_total` (counter): file loads by `outcome`
//! - `launcher_validation_total` (counter): validations by `cache` (hit/miss)
//! - `launcher_reloads_total` (counter): watch-loop reloads by `action`
//! - `launcher_reload_errors_total` (counter): reloads that failed

use metrics::counter;

pub fn record_config_load(outcome: &'static str) {
    counter!("launcher_config_loads_total", "outcome" => outcome).increment(1);
}

pub fn record_validation(cache_hit: bool) {
    let cache = if cache_hit { "hit" } else { "miss" };
    counter!("launcher_validation_total", "cache" => cache).increment(1);
}

pub fn record_reload(action: &'static str) {
    counter!("launcher_reloads_total", "action" => action).increment(1);
}

pub fn record_reload_error() {
    counter!("launcher_reload_errors_total").increment(1);
}
