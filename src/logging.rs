//! Diagnostic logging setup
//!
//! Degraded-mode notices (connect failures, fallbacks, persistence errors)
//! only ever reach the user through this log, written to stderr.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter (e.g. `debug`, `rush_predict=trace`)
pub const LOG_ENV: &str = "RUSH_PREDICT_LOG";

/// Install the stderr subscriber
///
/// Filter comes from `RUSH_PREDICT_LOG`, then `RUST_LOG`, then `warn`.
/// Calling this more than once is harmless.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice() {
        init_logging();
        init_logging();
        tracing::debug!("logging initialised");
    }
}
