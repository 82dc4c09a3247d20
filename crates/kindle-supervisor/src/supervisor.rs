//! Owner of the registered services and their worker processes.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::join_all;
use tokio::runtime::Builder;

use crate::errors::SupervisorError;
use crate::grace::stop_gracefully;
use crate::reporter::{StructuredSupervisorReporter, SupervisorReporter};
use crate::service::ServiceSpec;
use crate::worker::Worker;

/// Snapshot of one registered service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    /// Service name.
    pub name: String,
    /// Worker pid, once started.
    pub pid: Option<i32>,
    /// Whether the worker process is still running.
    pub alive: bool,
}

struct ServiceSlot {
    spec: ServiceSpec,
    worker: Option<Arc<Worker>>,
}

/// Starts, observes, and stops a set of named worker processes.
///
/// Each registered descriptor is spawned at most once. Graceful shutdown
/// waits on every worker concurrently from a single thread, so its cost is
/// bounded by the grace period rather than by the number of workers.
pub struct ProcessSupervisor {
    slots: Mutex<Vec<ServiceSlot>>,
    reporter: Arc<dyn SupervisorReporter>,
}

impl fmt::Debug for ProcessSupervisor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ProcessSupervisor")
            .field("services", &self.len())
            .finish_non_exhaustive()
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSupervisor {
    /// Creates a supervisor reporting through `tracing`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_reporter(Arc::new(StructuredSupervisorReporter::new()))
    }

    /// Creates a supervisor with a custom reporter.
    #[must_use]
    pub fn with_reporter(reporter: Arc<dyn SupervisorReporter>) -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
            reporter,
        }
    }

    /// Registers a service without starting it.
    pub fn add_service(&self, spec: ServiceSpec) {
        self.lock_slots().push(ServiceSlot { spec, worker: None });
    }

    /// Number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_slots().len()
    }

    /// Returns `true` when no service is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock_slots().is_empty()
    }

    /// Spawns every registered service that has not been started yet.
    ///
    /// Returns as soon as the processes exist. A spawn failure aborts the
    /// remaining starts; workers already running stay tracked.
    pub fn run(&self) -> Result<(), SupervisorError> {
        let mut slots = self.lock_slots();
        for slot in slots.iter_mut().filter(|slot| slot.worker.is_none()) {
            self.reporter.service_starting(slot.spec.name());
            let worker = Worker::spawn(&slot.spec)?;
            self.reporter.service_started(worker.name(), worker.pid());
            slot.worker = Some(Arc::new(worker));
        }
        Ok(())
    }

    /// Handles to every started worker.
    #[must_use]
    pub fn workers(&self) -> Vec<Arc<Worker>> {
        self.lock_slots()
            .iter()
            .filter_map(|slot| slot.worker.clone())
            .collect()
    }

    /// Reports name, pid, and liveness for every registered service.
    #[must_use]
    pub fn statuses(&self) -> Vec<ServiceStatus> {
        self.lock_slots()
            .iter()
            .map(|slot| ServiceStatus {
                name: slot.spec.name().to_owned(),
                pid: slot.worker.as_ref().map(|worker| worker.pid()),
                alive: slot.worker.as_ref().is_some_and(|worker| worker.is_alive()),
            })
            .collect()
    }

    /// Blocks until every started worker has exited on its own.
    pub fn wait(&self) {
        for worker in self.workers() {
            let state = worker.join();
            self.reporter.exited(worker.name(), worker.pid(), state);
        }
    }

    /// Kills every live worker immediately and waits until each has exited.
    pub fn kill(&self) -> Result<(), SupervisorError> {
        let mut first_error = None;
        let mut killed = Vec::new();
        for worker in self.workers().into_iter().filter(|worker| worker.is_alive()) {
            match worker.kill() {
                Ok(()) => {
                    self.reporter.killed(worker.name(), worker.pid());
                    killed.push(worker);
                }
                Err(error) => {
                    first_error.get_or_insert(error);
                }
            }
        }
        for worker in killed {
            let state = worker.join();
            self.reporter.exited(worker.name(), worker.pid(), state);
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Asks every live worker to terminate and gives each `grace` to comply.
    ///
    /// Workers still running when their budget is spent are killed. Returns
    /// once every worker is confirmed exited.
    pub fn shutdown(&self, grace: Duration) -> Result<(), SupervisorError> {
        let workers = self.workers();
        if workers.is_empty() {
            return Ok(());
        }

        let runtime = Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|source| SupervisorError::Runtime { source })?;
        let tasks = workers
            .into_iter()
            .map(|worker| stop_gracefully(worker, grace, Arc::clone(&self.reporter)));

        runtime.block_on(join_all(tasks)).into_iter().collect()
    }

    fn lock_slots(&self) -> MutexGuard<'_, Vec<ServiceSlot>> {
        self.slots.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}
