//! Configuration for the kindle application kernel.
//!
//! Two concerns live here. [`KernelSettings`] are the kernel's own launch
//! settings, layered by `ortho_config`. The application configuration is
//! assembled at boot from a YAML file whose `{PLACEHOLDER}`s are filled from
//! a parameters file and the environment, then validated against the
//! [`ConfigSchema`] fragments contributed by every bundle.

mod defaults;
mod error;
mod loader;
mod logging;
mod schema;
mod settings;
pub mod template;

pub use defaults::{
    DEFAULT_APP_CONFIG, DEFAULT_APP_PARAMETERS, DEFAULT_ENVIRONMENT, DEFAULT_GRACE_PERIOD_SECS,
    DEFAULT_LOG_FILTER, default_grace_period, default_log_filter, default_log_format,
};
pub use error::{ConfigurationError, FieldError, FieldErrorKind, ValidationError};
pub use loader::{ConfigurationLoader, StaticConfigurationLoader, YamlConfigurationLoader};
pub use logging::{LogFormat, LogFormatParseError};
pub use schema::{ConfigSchema, ConfigSection, Configuration, Section, SectionValue, Validate};
pub use settings::KernelSettings;
