//! Tracing subscriber setup for host applications
//!
//! The library only emits `tracing` events. Hosts that have no subscriber of
//! their own can install this one; `RUST_LOG` overrides the default filter.

use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "rapport=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global fmt subscriber.
///
/// Panics if a global subscriber is already set; use [`try_init`] when that
/// may be the case.
pub fn init() {
    fmt().with_env_filter(env_filter()).with_target(false).init();
}

/// Install the global fmt subscriber unless one is already set.
/// Returns false when another subscriber was already installed.
pub fn try_init() -> bool {
    fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_init_is_repeatable() {
        try_init();
        assert!(!try_init());
    }
}
