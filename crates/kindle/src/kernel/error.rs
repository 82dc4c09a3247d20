//! Errors raised while booting and stopping the kernel.

use kindle_config::{ConfigurationError, ValidationError};
use kindle_supervisor::SupervisorError;
use thiserror::Error;

use super::state::BootPhase;
use crate::event::DispatchError;

/// Errors that abort the boot sequence.
#[derive(Debug, Error)]
pub enum BootError {
    /// The configuration could not be loaded or failed validation.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying configuration error.
        #[source]
        source: ConfigurationError,
    },
    /// A listener failed while a phase announced its event.
    #[error("boot phase {phase} failed: {source}")]
    Dispatch {
        /// Phase whose dispatch failed.
        phase: BootPhase,
        /// Underlying dispatch failure.
        #[source]
        source: DispatchError,
    },
}

impl BootError {
    /// Per-field validation failures, when boot stopped on invalid
    /// configuration.
    #[must_use]
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Configuration {
                source: ConfigurationError::Validation(error),
            } => Some(error),
            _ => None,
        }
    }
}

/// Errors reported by [`Kernel::shutdown`](crate::Kernel::shutdown).
///
/// Shutdown always runs to completion; these describe what went wrong on
/// the way.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// A kernel-shutdown listener failed.
    #[error("kernel shutdown listener failed: {source}")]
    Dispatch {
        /// Underlying dispatch failure.
        #[source]
        source: DispatchError,
    },
    /// Workers could not be signalled.
    #[error("failed to stop workers: {source}")]
    Supervisor {
        /// Underlying supervisor failure.
        #[source]
        source: SupervisorError,
    },
}
