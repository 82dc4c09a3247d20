//! Structured reporting of kernel lifecycle milestones.

use std::sync::Arc;
use std::time::Duration;

use super::error::BootError;
use super::state::BootPhase;

const KERNEL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::kernel");

/// Observer notified as the kernel boots and shuts down.
pub trait KernelReporter: Send + Sync {
    /// Invoked before the first boot phase.
    fn boot_starting(&self, environment: &str);

    /// Invoked after each boot phase completes.
    fn phase_completed(&self, phase: BootPhase);

    /// Invoked when boot is aborted.
    fn boot_failed(&self, error: &BootError);

    /// Invoked after a listener registration phase with the number of
    /// bundle listeners it bound.
    fn listeners_registered(&self, phase: BootPhase, count: usize);

    /// Invoked for each service handed to the supervisor.
    fn service_registered(&self, name: &str);

    /// Invoked by the kernel's own kernel-ready listener.
    fn kernel_ready(&self);

    /// Invoked on the first shutdown request.
    fn shutdown_requested(&self, grace: Duration);

    /// Invoked when a shutdown request arrives while already shutting down.
    fn kill_requested(&self);

    /// Invoked by the kernel's own kernel-shutdown listener.
    fn kernel_shutdown(&self);
}

impl<T> KernelReporter for Arc<T>
where
    T: KernelReporter + ?Sized,
{
    fn boot_starting(&self, environment: &str) {
        (**self).boot_starting(environment);
    }

    fn phase_completed(&self, phase: BootPhase) {
        (**self).phase_completed(phase);
    }

    fn boot_failed(&self, error: &BootError) {
        (**self).boot_failed(error);
    }

    fn listeners_registered(&self, phase: BootPhase, count: usize) {
        (**self).listeners_registered(phase, count);
    }

    fn service_registered(&self, name: &str) {
        (**self).service_registered(name);
    }

    fn kernel_ready(&self) {
        (**self).kernel_ready();
    }

    fn shutdown_requested(&self, grace: Duration) {
        (**self).shutdown_requested(grace);
    }

    fn kill_requested(&self) {
        (**self).kill_requested();
    }

    fn kernel_shutdown(&self) {
        (**self).kernel_shutdown();
    }
}

/// Default reporter that records lifecycle milestones using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredKernelReporter;

impl StructuredKernelReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl KernelReporter for StructuredKernelReporter {
    fn boot_starting(&self, environment: &str) {
        tracing::info!(
            target: KERNEL_TARGET,
            event = "boot_starting",
            environment,
            "booting kernel"
        );
    }

    fn phase_completed(&self, phase: BootPhase) {
        tracing::debug!(
            target: KERNEL_TARGET,
            event = "phase_completed",
            phase = %phase,
            "boot phase completed"
        );
    }

    fn boot_failed(&self, error: &BootError) {
        tracing::error!(
            target: KERNEL_TARGET,
            event = "boot_failed",
            error = %error,
            "kernel boot failed"
        );
    }

    fn listeners_registered(&self, phase: BootPhase, count: usize) {
        tracing::debug!(
            target: KERNEL_TARGET,
            event = "listeners_registered",
            phase = %phase,
            count,
            "bundle listeners registered"
        );
    }

    fn service_registered(&self, name: &str) {
        tracing::debug!(
            target: KERNEL_TARGET,
            event = "service_registered",
            service = name,
            "service registered"
        );
    }

    fn kernel_ready(&self) {
        tracing::info!(target: KERNEL_TARGET, event = "kernel_ready", "kernel ready");
    }

    fn shutdown_requested(&self, grace: Duration) {
        tracing::warn!(
            target: KERNEL_TARGET,
            event = "shutdown_requested",
            grace_secs = grace.as_secs(),
            "shutdown requested; repeat to kill workers immediately"
        );
    }

    fn kill_requested(&self) {
        tracing::warn!(
            target: KERNEL_TARGET,
            event = "kill_requested",
            "killing workers now"
        );
    }

    fn kernel_shutdown(&self) {
        tracing::info!(
            target: KERNEL_TARGET,
            event = "kernel_shutdown",
            "kernel shutting down"
        );
    }
}
