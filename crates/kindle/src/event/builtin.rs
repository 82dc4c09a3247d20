//! Events announced by the kernel during its lifecycle.

use std::sync::Arc;

use kindle_config::Configuration;

use super::{Event, EventType};
use crate::container::Container;

/// Root of every event taxonomy.
pub static EVENT: EventType = EventType::root("event");

/// Announced once the kernel is fully wired.
pub static KERNEL_READY: EventType = EventType::extends("kernel.kernel_ready", &EVENT);

/// Announced once the configuration has been validated.
pub static CONFIGURATION_READY: EventType =
    EventType::extends("kernel.configuration_ready", &EVENT);

/// Announced once the dependency container can be used.
pub static INJECTOR_READY: EventType = EventType::extends("kernel.injector_ready", &EVENT);

/// Announced when the kernel begins shutting down; bundles should stop their
/// work.
pub static KERNEL_SHUTDOWN: EventType = EventType::extends("kernel.kernel_shutdown", &EVENT);

/// Payload-free [`KERNEL_READY`] event.
#[derive(Debug, Default, Clone, Copy)]
pub struct KernelReady;

impl Event for KernelReady {
    fn event_type(&self) -> &'static EventType {
        &KERNEL_READY
    }
}

/// [`CONFIGURATION_READY`] event carrying the validated configuration.
#[derive(Debug, Clone)]
pub struct ConfigurationReady {
    /// Validated configuration.
    pub configuration: Arc<Configuration>,
}

impl Event for ConfigurationReady {
    fn event_type(&self) -> &'static EventType {
        &CONFIGURATION_READY
    }
}

/// [`INJECTOR_READY`] event carrying the populated container.
#[derive(Debug, Clone)]
pub struct InjectorReady {
    /// Container holding every bundle binding.
    pub container: Arc<Container>,
}

impl Event for InjectorReady {
    fn event_type(&self) -> &'static EventType {
        &INJECTOR_READY
    }
}

/// Payload-free [`KERNEL_SHUTDOWN`] event.
#[derive(Debug, Default, Clone, Copy)]
pub struct KernelShutdown;

impl Event for KernelShutdown {
    fn event_type(&self) -> &'static EventType {
        &KERNEL_SHUTDOWN
    }
}
