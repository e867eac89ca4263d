//! Tracing subscriber setup for the binaries

use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Environment variable holding the log filter directives
pub const LOG_ENV: &str = "TAB_ARCHIVE_LOG";

/// Install a stderr subscriber filtered by `TAB_ARCHIVE_LOG`
///
/// Defaults to `warn`, or `debug` when the config has debug enabled. Calling
/// this more than once is harmless.
pub fn init(config: &Config) {
    let default_level = if config.debug { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV)
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
