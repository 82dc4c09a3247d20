//! Contract through which plugins contribute to the kernel.

use std::any::type_name;
use std::sync::Arc;

use kindle_config::ConfigSection;
use kindle_supervisor::ServiceSpec;

use crate::container::{Container, Provider};
use crate::event::{EventType, Listener};

/// A unit contributing configuration, listeners, bindings, and services.
///
/// Every capability defaults to "none", so a bundle only overrides what it
/// actually provides. The kernel reads each capability once during boot.
pub trait Bundle: Send + Sync {
    /// Name used in boot diagnostics.
    fn name(&self) -> &str {
        type_name::<Self>()
    }

    /// Schema fragments, keyed by top-level configuration key.
    fn config_mapping(&self) -> Vec<(String, Arc<dyn ConfigSection>)> {
        Vec::new()
    }

    /// Listeners to register, each bound to an event type's channel.
    fn event_listeners(&self) -> Vec<(&'static EventType, Listener)> {
        Vec::new()
    }

    /// Providers to install in the shared container.
    fn injection_bindings(&self) -> Vec<(String, Provider)> {
        Vec::new()
    }

    /// Workers to hand to the supervisor once the kernel is ready.
    ///
    /// `container` is fully populated by the time this is called.
    fn services(&self, container: &Container) -> Vec<ServiceSpec> {
        let _ = container;
        Vec::new()
    }
}

impl<T> Bundle for Arc<T>
where
    T: Bundle + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn config_mapping(&self) -> Vec<(String, Arc<dyn ConfigSection>)> {
        (**self).config_mapping()
    }

    fn event_listeners(&self) -> Vec<(&'static EventType, Listener)> {
        (**self).event_listeners()
    }

    fn injection_bindings(&self) -> Vec<(String, Provider)> {
        (**self).injection_bindings()
    }

    fn services(&self, container: &Container) -> Vec<ServiceSpec> {
        (**self).services(container)
    }
}
