//! Translates interrupt and terminate signals into kernel shutdown requests.

use std::io;
use std::thread::{self, JoinHandle};

use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use thiserror::Error;
use tracing::{error, info};

use crate::kernel::Kernel;

const SIGNALS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::signals");

/// Errors raised while installing the signal watcher.
#[derive(Debug, Error)]
pub enum SignalError {
    /// The signal handlers could not be registered.
    #[error("failed to register signal handlers: {source}")]
    Register {
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// The watcher thread could not be started.
    #[error("failed to spawn signal watcher thread: {source}")]
    Spawn {
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}

/// Background thread requesting a kernel shutdown for every SIGINT or
/// SIGTERM received.
///
/// Each delivery runs [`Kernel::shutdown`] on its own thread, so a second
/// signal can escalate while the first graceful stop is still waiting.
/// Dropping the watcher unregisters the handlers.
#[derive(Debug)]
pub struct SignalWatcher {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl SignalWatcher {
    /// Starts watching on behalf of `kernel`.
    pub fn install(kernel: &Kernel) -> Result<Self, SignalError> {
        let mut signals =
            Signals::new([SIGINT, SIGTERM]).map_err(|source| SignalError::Register { source })?;
        let handle = signals.handle();
        let kernel = kernel.clone();
        let thread = thread::Builder::new()
            .name("kindle-signals".to_owned())
            .spawn(move || {
                for signal in signals.forever() {
                    info!(target: SIGNALS_TARGET, signal, "shutdown signal received");
                    request_shutdown(&kernel);
                }
            })
            .map_err(|source| SignalError::Spawn { source })?;
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }
}

fn request_shutdown(kernel: &Kernel) {
    let kernel = kernel.clone();
    let spawned = thread::Builder::new()
        .name("kindle-shutdown".to_owned())
        .spawn(move || {
            if let Err(error) = kernel.shutdown() {
                error!(target: SIGNALS_TARGET, error = %error, "kernel shutdown failed");
            }
        });
    if let Err(error) = spawned {
        error!(target: SIGNALS_TARGET, error = %error, "failed to spawn shutdown thread");
    }
}

impl Drop for SignalWatcher {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            thread.join().ok();
        }
    }
}
