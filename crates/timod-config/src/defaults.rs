//! Defaults applied to unset configuration and settings values.

use std::time::Duration;

/// Port used for a node when the configuration omits one.
pub const DEFAULT_PORT: u16 = 9200;

/// Default timeout applied to every backend operation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Owned default log filter for serde field defaults.
#[must_use]
pub fn default_log_filter() -> String {
    String::from(DEFAULT_LOG_FILTER)
}

/// Environment variable overriding the log filter.
pub const LOG_FILTER_ENV: &str = "TIMOD_LOG_FILTER";

/// Environment variable overriding the log format.
pub const LOG_FORMAT_ENV: &str = "TIMOD_LOG_FORMAT";
