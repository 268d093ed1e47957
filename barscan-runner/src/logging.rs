//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the filter directives, e.g. `barscan_core=debug`.
pub const LOG_ENV: &str = "BARSCAN_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

/// Filter from `BARSCAN_LOG`, or `info` when unset or unparsable.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Install the global fmt subscriber.
///
/// Returns `false` when a subscriber was already installed; the existing one is kept.
pub fn init() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let _ = init();
        assert!(!init());
        tracing::info!(target: "barscan_runner", "still logging after second init");
    }
}
