//! Structured reporting of worker lifecycle milestones.

use std::sync::Arc;
use std::time::Duration;

use crate::worker::ExitState;

pub(crate) const SUPERVISOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::supervisor");

/// Observer notified as the supervisor starts and stops workers.
pub trait SupervisorReporter: Send + Sync {
    /// Invoked before a worker is spawned.
    fn service_starting(&self, name: &str);

    /// Invoked once a worker process exists.
    fn service_started(&self, name: &str, pid: i32);

    /// Invoked when a cooperative termination request is sent.
    fn terminating(&self, name: &str, pid: i32, grace: Duration);

    /// Invoked when a worker outlives its grace period and is about to be
    /// killed. Informational, not an error.
    fn grace_expired(&self, name: &str, pid: i32);

    /// Invoked when a worker is sent a non-catchable kill.
    fn killed(&self, name: &str, pid: i32);

    /// Invoked once a worker has been confirmed exited.
    fn exited(&self, name: &str, pid: i32, state: ExitState);
}

impl<T> SupervisorReporter for Arc<T>
where
    T: SupervisorReporter + ?Sized,
{
    fn service_starting(&self, name: &str) {
        (**self).service_starting(name);
    }

    fn service_started(&self, name: &str, pid: i32) {
        (**self).service_started(name, pid);
    }

    fn terminating(&self, name: &str, pid: i32, grace: Duration) {
        (**self).terminating(name, pid, grace);
    }

    fn grace_expired(&self, name: &str, pid: i32) {
        (**self).grace_expired(name, pid);
    }

    fn killed(&self, name: &str, pid: i32) {
        (**self).killed(name, pid);
    }

    fn exited(&self, name: &str, pid: i32, state: ExitState) {
        (**self).exited(name, pid, state);
    }
}

/// Default reporter that records milestones using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredSupervisorReporter;

impl StructuredSupervisorReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SupervisorReporter for StructuredSupervisorReporter {
    fn service_starting(&self, name: &str) {
        tracing::debug!(
            target: SUPERVISOR_TARGET,
            event = "service_starting",
            service = name,
            "starting service"
        );
    }

    fn service_started(&self, name: &str, pid: i32) {
        tracing::info!(
            target: SUPERVISOR_TARGET,
            event = "service_started",
            service = name,
            pid,
            "service started"
        );
    }

    fn terminating(&self, name: &str, pid: i32, grace: Duration) {
        tracing::info!(
            target: SUPERVISOR_TARGET,
            event = "terminating",
            service = name,
            pid,
            grace_ms = grace.as_millis(),
            "requesting service termination"
        );
    }

    fn grace_expired(&self, name: &str, pid: i32) {
        tracing::info!(
            target: SUPERVISOR_TARGET,
            event = "grace_expired",
            service = name,
            pid,
            "service ignored termination request; killing"
        );
    }

    fn killed(&self, name: &str, pid: i32) {
        tracing::warn!(
            target: SUPERVISOR_TARGET,
            event = "killed",
            service = name,
            pid,
            "service killed"
        );
    }

    fn exited(&self, name: &str, pid: i32, state: ExitState) {
        tracing::info!(
            target: SUPERVISOR_TARGET,
            event = "exited",
            service = name,
            pid,
            state = %state,
            "service exited"
        );
    }
}
