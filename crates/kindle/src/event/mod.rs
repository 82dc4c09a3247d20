//! Hierarchical events and the bus that delivers them.
//!
//! Every event type is a `static` [`EventType`] naming its parent, so the
//! taxonomy is fixed at compile time. Dispatching an event delivers it to the
//! listeners of its own channel and of every ancestor channel, which lets a
//! subsystem subscribe once to a base event and still observe every subtype.

mod builtin;
mod bus;

use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock};

use thiserror::Error;

pub use builtin::{
    CONFIGURATION_READY, ConfigurationReady, EVENT, INJECTOR_READY, InjectorReady, KERNEL_READY,
    KERNEL_SHUTDOWN, KernelReady, KernelShutdown,
};
pub use bus::{Channel, DispatchError, EventBus};

pub(crate) const EVENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::event");

/// Declaration of one event type and its place in the taxonomy.
///
/// ```ignore
/// static JOB_DONE: EventType = EventType::extends("jobs.done", &EVENT);
/// ```
pub struct EventType {
    name: &'static str,
    parent: Option<&'static EventType>,
    ancestry: OnceLock<Vec<&'static str>>,
}

impl EventType {
    /// Declares a type at the root of a taxonomy.
    #[must_use]
    pub const fn root(name: &'static str) -> Self {
        Self {
            name,
            parent: None,
            ancestry: OnceLock::new(),
        }
    }

    /// Declares a subtype of `parent`.
    #[must_use]
    pub const fn extends(name: &'static str, parent: &'static EventType) -> Self {
        Self {
            name,
            parent: Some(parent),
            ancestry: OnceLock::new(),
        }
    }

    /// Channel name of this type.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Direct parent, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&'static EventType> {
        self.parent
    }

    /// Channel names this type is delivered on: itself first, then each
    /// ancestor out to the root.
    pub fn ancestry(&self) -> &[&'static str] {
        self.ancestry.get_or_init(|| {
            let mut names = vec![self.name];
            let mut current = self.parent;
            while let Some(parent) = current {
                names.push(parent.name);
                current = parent.parent;
            }
            names
        })
    }

    /// Returns `true` if this type is `other` or one of its subtypes.
    #[must_use]
    pub fn is_a(&self, other: &EventType) -> bool {
        self.ancestry().contains(&other.name)
    }
}

impl PartialEq for EventType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for EventType {}

impl fmt::Debug for EventType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("EventType")
            .field("name", &self.name)
            .field("parent", &self.parent.map(EventType::name))
            .finish()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name)
    }
}

/// A dispatched notification.
pub trait Event: Any + Send + Sync + 'static {
    /// Type that decides which channels the event reaches.
    fn event_type(&self) -> &'static EventType;
}

impl dyn Event {
    /// Channel name of the event's own type.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.event_type().name()
    }

    /// Returns the concrete event if it is a `T`.
    #[must_use]
    pub fn downcast_ref<T: Event>(&self) -> Option<&T> {
        (self as &dyn Any).downcast_ref::<T>()
    }
}

/// Failure reported by a listener.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ListenerError {
    message: String,
}

impl ListenerError {
    /// Creates an error carrying `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Human-readable reason.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Callback invoked for every event reaching its channel.
pub type Listener = Arc<dyn Fn(&dyn Event) -> Result<(), ListenerError> + Send + Sync>;

/// Wraps a closure as a [`Listener`].
pub fn listener<F>(callback: F) -> Listener
where
    F: Fn(&dyn Event) -> Result<(), ListenerError> + Send + Sync + 'static,
{
    Arc::new(callback)
}
