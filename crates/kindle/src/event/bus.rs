use std::collections::HashMap;
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use tracing::debug;

use super::{EVENT_TARGET, Event, EventType, Listener, ListenerError};

/// Registration key of the bus: an event type's name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Channel(String);

impl Channel {
    /// Channel name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&EventType> for Channel {
    fn from(event_type: &EventType) -> Self {
        Self(event_type.name().to_owned())
    }
}

impl From<&str> for Channel {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl From<String> for Channel {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// A listener failed, cutting the rest of a dispatch short.
#[derive(Debug, Error)]
#[error("listener on '{channel}' failed while dispatching '{event}': {source}")]
pub struct DispatchError {
    /// Name of the dispatched event.
    pub event: &'static str,
    /// Channel whose listener failed.
    pub channel: &'static str,
    /// Failure reported by the listener.
    #[source]
    pub source: ListenerError,
}

/// Synchronous publish/subscribe hub keyed by channel name.
///
/// Listeners on one channel run in registration order; channels run from the
/// event's own type outward to the root. The first failing listener aborts
/// the remainder of that dispatch.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<HashMap<Channel, Vec<Listener>>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.read();
        let mut channels: Vec<(&str, usize)> = listeners
            .iter()
            .map(|(channel, bound)| (channel.as_str(), bound.len()))
            .collect();
        channels.sort_unstable();
        formatter
            .debug_struct("EventBus")
            .field("channels", &channels)
            .finish()
    }
}

impl EventBus {
    /// Creates a bus with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `listener` to `channel`.
    ///
    /// The listener only observes dispatches that start after this call.
    pub fn add_listener(&self, channel: impl Into<Channel>, listener: Listener) {
        let channel = channel.into();
        debug!(target: EVENT_TARGET, channel = %channel, "listener registered");
        self.write().entry(channel).or_default().push(listener);
    }

    /// Binds a closure to `channel`.
    pub fn listen<F>(&self, channel: impl Into<Channel>, callback: F)
    where
        F: Fn(&dyn Event) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.add_listener(channel, super::listener(callback));
    }

    /// Number of listeners bound to `channel`.
    #[must_use]
    pub fn listener_count(&self, channel: impl Into<Channel>) -> usize {
        self.read().get(&channel.into()).map_or(0, Vec::len)
    }

    /// Delivers `event` to every listener on its own channel and its
    /// ancestors' channels, returning once all of them have run.
    pub fn dispatch(&self, event: &dyn Event) -> Result<(), DispatchError> {
        let event_type = event.event_type();
        debug!(target: EVENT_TARGET, event = event_type.name(), "dispatching event");

        for &name in event_type.ancestry() {
            // Snapshot so listeners may register further listeners.
            let bound = self
                .read()
                .get(&Channel::from(name))
                .cloned()
                .unwrap_or_default();
            for listener in bound {
                listener(event).map_err(|source| DispatchError {
                    event: event_type.name(),
                    channel: name,
                    source,
                })?;
            }
        }
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Channel, Vec<Listener>>> {
        self.listeners
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Channel, Vec<Listener>>> {
        self.listeners
            .write()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}
