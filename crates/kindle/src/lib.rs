//! Application bootstrap kernel.
//!
//! A [`Kernel`] brings a process from nothing to fully wired through a fixed
//! sequence of boot phases, each announced on the [`EventBus`]. Plugins take
//! part as [`Bundle`]s contributing configuration schema, listeners,
//! dependency bindings, and services. Once ready, services run as supervised
//! worker processes until a signal or an explicit
//! [`Kernel::shutdown`] stops them, gracefully at first and forcefully when
//! asked again.
//!
//! [`run`] is the usual entry point for a binary: it layers the kernel's own
//! settings, installs telemetry and signal handling, boots, and serves.

mod bundle;
pub mod container;
pub mod event;
mod kernel;
mod launch;
mod signals;
mod telemetry;

pub use bundle::Bundle;
pub use container::{Container, ContainerError, Provider, ProviderError};
pub use event::{Event, EventBus, EventType, Listener, ListenerError, listener};
pub use kernel::{
    BootError, BootPhase, Kernel, KernelBuilder, KernelHandle, KernelReporter, KernelState,
    ProcessIdentity, ShutdownError, StructuredKernelReporter,
};
pub use launch::{LaunchError, launch, run, serve};
pub use signals::{SignalError, SignalWatcher};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};

pub use kindle_config as config;
pub use kindle_supervisor as supervisor;

#[cfg(test)]
mod tests;
