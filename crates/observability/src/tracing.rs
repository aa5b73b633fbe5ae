//! Tracing/logging initialization.
//!
//! Engine operations emit `tracing` events with structured fields
//! (`order_id`, `item_id`, `actor_role`, ...). This module installs the JSON
//! subscriber that renders them.

use tracing_subscriber::EnvFilter;

/// Fallback filter when `RUST_LOG` is not set.
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    init_with_default(DEFAULT_DIRECTIVE);
}

pub fn init_with_default(directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    // JSON logs + timestamps, configurable via RUST_LOG.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_a_no_op() {
        init();
        init_with_default("debug");
        ::tracing::info!(component = "observability", "subscriber installed");
    }
}
