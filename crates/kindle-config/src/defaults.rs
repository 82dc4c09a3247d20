use std::time::Duration;

use crate::logging::LogFormat;

/// Environment name used when none is configured.
pub const DEFAULT_ENVIRONMENT: &str = "dev";

/// Application configuration file read during boot.
pub const DEFAULT_APP_CONFIG: &str = "config/config.yml";

/// Parameter overrides file read during boot. Missing files are skipped.
pub const DEFAULT_APP_PARAMETERS: &str = "config/parameters.yml";

/// Default log filter expression used by the kernel.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Seconds each worker is given to exit after a graceful termination request.
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 10;

/// Default log filter expression used by the kernel.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the kernel.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

/// Default grace period applied when shutting workers down.
#[must_use]
pub fn default_grace_period() -> Duration {
    Duration::from_secs(DEFAULT_GRACE_PERIOD_SECS)
}
