//! Process entry point tying settings, telemetry, boot, and signals together.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use kindle_config::{KernelSettings, YamlConfigurationLoader};
use kindle_supervisor::SupervisorError;
use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use crate::bundle::Bundle;
use crate::kernel::{BootError, Kernel, KernelState, ShutdownError};
use crate::signals::{SignalError, SignalWatcher};
use crate::telemetry::{self, TelemetryError};

/// Errors surfaced while launching and running an application.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Kernel launch settings failed to load.
    #[error("failed to load kernel settings: {source}")]
    Settings {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The kernel failed to boot.
    #[error(transparent)]
    Boot {
        /// Underlying boot error.
        #[from]
        source: BootError,
    },
    /// Signal handling could not be installed.
    #[error("failed to install signal handling: {source}")]
    Signals {
        /// Underlying signal error.
        #[source]
        source: SignalError,
    },
    /// Services could not be started.
    #[error("failed to start services: {source}")]
    Supervisor {
        /// Underlying supervisor error.
        #[source]
        source: SupervisorError,
    },
    /// Shutdown completed with errors.
    #[error("shutdown completed with errors: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[source]
        source: ShutdownError,
    },
}

impl From<Arc<OrthoError>> for LaunchError {
    fn from(source: Arc<OrthoError>) -> Self {
        Self::Settings { source }
    }
}

impl From<TelemetryError> for LaunchError {
    fn from(source: TelemetryError) -> Self {
        Self::Telemetry { source }
    }
}

impl From<SignalError> for LaunchError {
    fn from(source: SignalError) -> Self {
        Self::Signals { source }
    }
}

impl From<SupervisorError> for LaunchError {
    fn from(source: SupervisorError) -> Self {
        Self::Supervisor { source }
    }
}

impl From<ShutdownError> for LaunchError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}

/// Launches an application and maps the outcome to an exit status.
///
/// Invalid configuration prints one line per offending field to `stderr`;
/// other failures print the error itself.
pub fn run<I, T, W>(args: I, bundles: Vec<Arc<dyn Bundle>>, stderr: &mut W) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    W: Write,
{
    match launch(args, bundles) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let message = match &error {
                LaunchError::Boot { source } => source
                    .validation()
                    .map_or_else(|| source.to_string(), |invalid| invalid.report()),
                other => other.to_string(),
            };
            writeln!(stderr, "{message}").ok();
            ExitCode::FAILURE
        }
    }
}

/// Loads settings from `args`, boots the kernel with `bundles`, and serves
/// until every worker has stopped.
pub fn launch<I, T>(args: I, bundles: Vec<Arc<dyn Bundle>>) -> Result<(), LaunchError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let settings = KernelSettings::load_from_iter(args)?;
    telemetry::initialise(&settings)?;

    let kernel = Kernel::builder(settings.environment())
        .bundles(bundles)
        .loader(YamlConfigurationLoader::from_settings(&settings))
        .grace_period(settings.grace_period())
        .boot()?;
    let _watcher = SignalWatcher::install(&kernel)?;
    serve(&kernel)
}

/// Runs the kernel's services and waits for the kernel to terminate.
///
/// Workers that exit on their own still end with a kernel shutdown, so
/// kernel-shutdown listeners and resource release always happen.
pub fn serve(kernel: &Kernel) -> Result<(), LaunchError> {
    let started = kernel.run();
    if started.is_ok() {
        kernel.wait();
    }
    let stopped = if kernel.state() == KernelState::Ready {
        kernel.shutdown()
    } else {
        Ok(())
    };
    kernel.wait_terminated();
    started?;
    stopped?;
    Ok(())
}
