//! Lifecycle notifications for observers of the resource registry.
//!
//! [`ResourceEvent`]s are broadcast through a [`LifecycleNotifier`] backed by
//! `tokio::sync::broadcast`. Unlike lifecycle hooks these cannot veto
//! anything; they are delivered after the fact.

use tokio::sync::broadcast;

/// Events emitted by the manager as resources come and go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceEvent {
    /// A resource was registered with the manager.
    Added {
        /// The resource name.
        resource: String,
    },
    /// A resource finished starting.
    Started {
        /// The resource name.
        resource: String,
    },
    /// A start attempt failed and the resource was rolled back.
    StartFailed {
        /// The resource name.
        resource: String,
        /// Stable error kind (see [`Error::kind`](crate::Error::kind)).
        kind: &'static str,
        /// Human-readable error description.
        error: String,
    },
    /// A resource finished stopping.
    Stopped {
        /// The resource name.
        resource: String,
    },
    /// A resource was removed from the manager.
    Removed {
        /// The resource name.
        resource: String,
    },
}

impl ResourceEvent {
    /// The resource this event concerns.
    #[must_use]
    pub fn resource(&self) -> &str {
        match self {
            Self::Added { resource }
            | Self::Started { resource }
            | Self::StartFailed { resource, .. }
            | Self::Stopped { resource }
            | Self::Removed { resource } => resource,
        }
    }
}

/// Broadcast sender for [`ResourceEvent`]s.
///
/// Emission is fire-and-forget: with no subscribers, or when a subscriber
/// falls behind by more than the buffer size, events are dropped for it.
pub struct LifecycleNotifier {
    sender: broadcast::Sender<ResourceEvent>,
}

impl LifecycleNotifier {
    /// Create a notifier with the given buffer size (must be non-zero).
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size.max(1));
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    pub fn emit(&self, event: ResourceEvent) {
        // No receivers is not an error.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ResourceEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LifecycleNotifier {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl std::fmt::Debug for LifecycleNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleNotifier")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
