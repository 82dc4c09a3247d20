//! The boot sequencer and the lifecycle it drives.
//!
//! [`Kernel::builder`] collects bundles and collaborators; its `boot` runs
//! the fixed phase sequence once and yields a ready [`Kernel`]. The kernel
//! then starts and waits on services and answers shutdown requests, escalating
//! from a graceful stop to an immediate kill when asked twice.

mod builder;
mod error;
mod identity;
mod reporter;
mod state;

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::time::Duration;

use kindle_config::Configuration;
use kindle_supervisor::{ProcessSupervisor, SupervisorError};

use crate::container::Container;
use crate::event::{EventBus, KernelShutdown};

pub use builder::KernelBuilder;
pub use error::{BootError, ShutdownError};
pub use identity::ProcessIdentity;
pub use reporter::{KernelReporter, StructuredKernelReporter};
pub use state::{BootPhase, KernelState};

struct KernelInner {
    environment: String,
    state: Mutex<KernelState>,
    state_changed: Condvar,
    identity: ProcessIdentity,
    bus: Arc<EventBus>,
    container: Arc<Container>,
    supervisor: Arc<ProcessSupervisor>,
    configuration: Arc<Configuration>,
    reporter: Arc<dyn KernelReporter>,
    grace_period: Duration,
}

/// A booted application kernel.
///
/// Cloning is cheap; every clone drives the same kernel.
#[derive(Clone)]
pub struct Kernel {
    inner: Arc<KernelInner>,
}

impl fmt::Debug for Kernel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Kernel")
            .field("environment", &self.inner.environment)
            .field("state", &self.state())
            .field("identity", &self.inner.identity)
            .field("services", &self.inner.supervisor.len())
            .finish_non_exhaustive()
    }
}

/// Non-owning reference to a [`Kernel`], as installed in the container.
#[derive(Clone)]
pub struct KernelHandle {
    inner: Weak<KernelInner>,
}

impl KernelHandle {
    /// Returns the kernel if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Kernel> {
        self.inner.upgrade().map(|inner| Kernel { inner })
    }
}

impl fmt::Debug for KernelHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("KernelHandle")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl Kernel {
    /// Starts configuring a kernel for `environment`.
    pub fn builder(environment: impl Into<String>) -> KernelBuilder {
        KernelBuilder::new(environment.into())
    }

    /// Environment name given at boot.
    #[must_use]
    pub fn environment(&self) -> &str {
        &self.inner.environment
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> KernelState {
        *self.lock_state()
    }

    /// Returns `true` when called from the process that booted the kernel.
    #[must_use]
    pub fn is_origin(&self) -> bool {
        self.inner.identity.is_origin()
    }

    /// Validated application configuration.
    #[must_use]
    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.inner.configuration
    }

    /// Shared dependency container.
    #[must_use]
    pub fn container(&self) -> &Arc<Container> {
        &self.inner.container
    }

    /// Event bus every phase announced itself on.
    #[must_use]
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.inner.bus
    }

    /// Supervisor owning the registered services.
    #[must_use]
    pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.inner.supervisor
    }

    /// Time each worker is given to stop after a graceful request.
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        self.inner.grace_period
    }

    /// Non-owning reference to this kernel.
    #[must_use]
    pub fn handle(&self) -> KernelHandle {
        KernelHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Starts every registered service that is not already running.
    pub fn run(&self) -> Result<(), SupervisorError> {
        self.inner.supervisor.run()
    }

    /// Blocks until every started service has exited on its own.
    pub fn wait(&self) {
        self.inner.supervisor.wait();
    }

    /// Stops the kernel.
    ///
    /// The first call moves to [`KernelState::ShuttingDown`], announces
    /// kernel-shutdown, stops workers within the grace period, releases
    /// container resources, and finally moves to
    /// [`KernelState::Terminated`]. A call arriving while that is in progress
    /// kills every worker immediately. Calls after termination do nothing.
    ///
    /// Outside the origin process only the announcement and resource release
    /// happen: workers belong to the origin, and the state stays
    /// `ShuttingDown`.
    pub fn shutdown(&self) -> Result<(), ShutdownError> {
        let previous = {
            let mut state = self.lock_state();
            let previous = *state;
            if matches!(previous, KernelState::Booting | KernelState::Ready) {
                *state = KernelState::ShuttingDown;
            }
            previous
        };
        match previous {
            KernelState::Terminated => Ok(()),
            KernelState::ShuttingDown => self.escalate(),
            KernelState::Booting | KernelState::Ready => self.stop(),
        }
    }

    /// Blocks until the kernel reaches [`KernelState::Terminated`].
    ///
    /// Only the origin process ever terminates.
    pub fn wait_terminated(&self) {
        let mut state = self.lock_state();
        while *state != KernelState::Terminated {
            state = self
                .inner
                .state_changed
                .wait(state)
                .unwrap_or_else(|poison| poison.into_inner());
        }
    }

    fn stop(&self) -> Result<(), ShutdownError> {
        let origin = self.is_origin();
        let inner = &self.inner;
        inner.reporter.shutdown_requested(inner.grace_period);

        let dispatched = inner
            .bus
            .dispatch(&KernelShutdown)
            .map_err(|source| ShutdownError::Dispatch { source });
        let stopped = if origin {
            inner
                .supervisor
                .shutdown(inner.grace_period)
                .map_err(|source| ShutdownError::Supervisor { source })
        } else {
            Ok(())
        };
        inner.container.shutdown_resources();

        if origin {
            self.set_state(KernelState::Terminated);
        }
        dispatched.and(stopped)
    }

    // The graceful call still in flight owns the move to `Terminated`.
    fn escalate(&self) -> Result<(), ShutdownError> {
        if !self.is_origin() {
            return Ok(());
        }
        self.inner.reporter.kill_requested();
        self.inner
            .supervisor
            .kill()
            .map_err(|source| ShutdownError::Supervisor { source })
    }

    pub(crate) fn set_state(&self, next: KernelState) {
        *self.lock_state() = next;
        self.inner.state_changed.notify_all();
    }

    fn lock_state(&self) -> MutexGuard<'_, KernelState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}
