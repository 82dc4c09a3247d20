//! Error surface of the process supervisor.

use std::io;

use nix::errno::Errno;
use thiserror::Error;

/// Errors raised while starting or stopping workers.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The OS refused to start an external program.
    #[error("failed to spawn service '{name}': {source}")]
    Spawn {
        /// Service whose program could not be started.
        name: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Forking a function worker failed.
    #[error("failed to fork service '{name}': {source}")]
    Fork {
        /// Service that could not be forked.
        name: String,
        /// Underlying OS error.
        #[source]
        source: Errno,
    },
    /// A signal could not be delivered to a live worker.
    #[error("failed to signal service '{name}' (pid {pid}): {source}")]
    Signal {
        /// Service that was being signalled.
        name: String,
        /// Process identifier of the worker.
        pid: i32,
        /// Underlying OS error.
        #[source]
        source: Errno,
    },
    /// The runtime driving the grace-period fan-out could not be built.
    #[error("failed to build shutdown runtime: {source}")]
    Runtime {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}
