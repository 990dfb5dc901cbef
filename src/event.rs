//! Mirror change events and the per-engine listener registry.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Node became known to the mirror
    Add,
    /// Node payload or version changed
    Update,
    /// Node left the mirror
    Delete,
}

impl fmt::Display for EventType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            EventType::Add => "add",
            EventType::Update => "update",
            EventType::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Immutable change record emitted by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Event {
    pub event_type: EventType,
    pub path: String,
}

impl Event {
    pub fn add(path: impl Into<String>) -> Self {
        Self {
            event_type: EventType::Add,
            path: path.into(),
        }
    }

    pub fn update(path: impl Into<String>) -> Self {
        Self {
            event_type: EventType::Update,
            path: path.into(),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            event_type: EventType::Delete,
            path: path.into(),
        }
    }
}

/// Receives mirror events in the single global delivery order.
///
/// Callbacks run on the dispatch worker. A listener that blocks stalls all
/// further mirror convergence.
pub trait Listener: Send + Sync {
    fn process(
        &self,
        event: &Event,
    );

    /// Called once when the session expires and the mirror is invalidated
    fn session_expired(&self) {}
}

impl<F> Listener for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn process(
        &self,
        event: &Event,
    ) {
        self(event)
    }
}

/// Listener registry owned by one engine
#[derive(Default)]
pub(crate) struct EventBus {
    listeners: RwLock<Vec<Arc<dyn Listener>>>,
}

impl fmt::Debug for EventBus {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

impl EventBus {
    pub(crate) fn register(
        &self,
        listener: Arc<dyn Listener>,
    ) {
        self.listeners.write().push(listener);
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Fans `event` out to every listener, in registration order.
    pub(crate) fn publish(
        &self,
        event: Event,
    ) {
        // Snapshot so listeners may register further listeners
        let listeners = self.listeners.read().clone();
        trace!(event_type = %event.event_type, path = %event.path, listeners = listeners.len(), "Event published");
        for listener in listeners {
            listener.process(&event);
        }
    }

    pub(crate) fn publish_session_expired(&self) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.session_expired();
        }
    }
}
