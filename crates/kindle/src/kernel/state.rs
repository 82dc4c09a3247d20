//! Lifecycle states and boot phases.

use strum::{Display, EnumIter};

/// Lifecycle of a kernel.
///
/// Transitions only move forward. A second shutdown request while
/// `ShuttingDown` escalates the action instead of the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum KernelState {
    /// Boot phases are still running.
    Booting,
    /// Every phase completed; services may run.
    Ready,
    /// A shutdown request is being honoured.
    ShuttingDown,
    /// Every worker has exited and resources are released.
    Terminated,
}

/// The ordered phases of [`Kernel::builder`](crate::Kernel::builder)'s boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum BootPhase {
    /// Bundle schemas are merged and the configuration validated.
    LoadConfiguration,
    /// Listeners for configuration-ready and its subtypes are registered.
    RegisterConfigurationListeners,
    /// The validated configuration is announced.
    DispatchConfigurationReady,
    /// Every other listener is registered.
    RegisterListeners,
    /// Bundle bindings and well-known keys are installed.
    BuildContainer,
    /// Kernel-ready is announced and the kernel becomes ready.
    DispatchKernelReady,
    /// Bundle services are handed to the supervisor.
    RegisterServices,
}
