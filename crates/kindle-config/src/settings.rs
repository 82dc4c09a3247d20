//! Launch settings for the kernel itself.
//!
//! These are distinct from the application configuration assembled from
//! bundle schemas: they decide *where* that configuration lives, how the
//! kernel logs, and how long workers are given to stop. Values are layered by
//! `ortho_config` from defaults, a settings file, `KINDLE_*` environment
//! variables, and command-line flags.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

use crate::defaults::{
    DEFAULT_APP_CONFIG, DEFAULT_APP_PARAMETERS, DEFAULT_ENVIRONMENT, DEFAULT_GRACE_PERIOD_SECS,
    DEFAULT_LOG_FILTER, default_grace_period, default_log_format,
};
use crate::logging::LogFormat;

/// Layered kernel launch settings.
///
/// Every field is optional so each layer can leave it unset; the accessors
/// fall back to the crate defaults. The `ortho_config` defaults keep the
/// lowest layer non-empty, so loading with no flags, variables, or file
/// still yields a value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "KINDLE")]
pub struct KernelSettings {
    /// Environment name reported at boot (for example `dev` or `prod`).
    #[ortho_config(default = DEFAULT_ENVIRONMENT.to_owned())]
    pub environment: Option<String>,
    /// Path to the application configuration YAML file.
    pub app_config: Option<Utf8PathBuf>,
    /// Path to the optional parameter overrides YAML file.
    pub app_parameters: Option<Utf8PathBuf>,
    /// Tracing filter expression.
    #[ortho_config(default = DEFAULT_LOG_FILTER.to_owned())]
    pub log_filter: Option<String>,
    /// Log output format.
    pub log_format: Option<LogFormat>,
    /// Seconds granted to each worker after a graceful termination request.
    #[ortho_config(default = DEFAULT_GRACE_PERIOD_SECS)]
    pub grace_period_secs: Option<u64>,
}

impl KernelSettings {
    /// Environment name, defaulting to `dev`.
    #[must_use]
    pub fn environment(&self) -> &str {
        self.environment.as_deref().unwrap_or(DEFAULT_ENVIRONMENT)
    }

    /// Application configuration path.
    #[must_use]
    pub fn app_config(&self) -> &Utf8Path {
        self.app_config
            .as_deref()
            .unwrap_or_else(|| Utf8Path::new(DEFAULT_APP_CONFIG))
    }

    /// Parameter overrides path.
    #[must_use]
    pub fn app_parameters(&self) -> &Utf8Path {
        self.app_parameters
            .as_deref()
            .unwrap_or_else(|| Utf8Path::new(DEFAULT_APP_PARAMETERS))
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format.unwrap_or_else(default_log_format)
    }

    /// Grace period applied to every worker on shutdown.
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        self.grace_period_secs
            .map_or_else(default_grace_period, Duration::from_secs)
    }
}
