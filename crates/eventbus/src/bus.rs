//! Named events carrying an opaque byte payload.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::HandlerResult;
use crate::event::{Dispatch, Event, EventContext, SubscriptionHandle};

/// Arguments delivered to handlers of a named event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventArgs {
    /// Event name.
    pub name: String,
    /// Opaque serialized payload.
    pub payload: Bytes,
    /// Who raised the event (a resource name, or empty for the host).
    pub source: String,
}

impl EventArgs {
    /// Build event arguments.
    pub fn new(name: impl Into<String>, payload: impl Into<Bytes>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
            source: source.into(),
        }
    }
}

/// Handle returned by [`EventBus::connect`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BusSubscription {
    name: String,
    handle: SubscriptionHandle,
}

impl BusSubscription {
    /// Name of the event the handler is connected to.
    #[must_use]
    pub fn event_name(&self) -> &str {
        &self.name
    }
}

/// Publish/subscribe over named events.
///
/// Each name owns an independent [`Event<EventArgs>`], so ordering and
/// cancellation rules are exactly those of [`Event`].
pub struct EventBus {
    events: RwLock<HashMap<String, Arc<Event<EventArgs>>>>,
    last_canceled: AtomicBool,
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            last_canceled: AtomicBool::new(false),
        }
    }

    fn event(&self, name: &str) -> Option<Arc<Event<EventArgs>>> {
        self.events.read().get(name).cloned()
    }

    /// Connect a handler to the event `name` at `priority`.
    pub fn connect<F>(&self, name: &str, priority: i64, handler: F) -> BusSubscription
    where
        F: Fn(&EventArgs, &mut EventContext<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        let event = match self.event(name) {
            Some(event) => event,
            None => Arc::clone(
                self.events
                    .write()
                    .entry(name.to_owned())
                    .or_insert_with(|| Arc::new(Event::new(name))),
            ),
        };

        BusSubscription {
            name: name.to_owned(),
            handle: event.connect(priority, handler),
        }
    }

    /// Disconnect a handler. Safe to call from inside a running handler.
    pub fn disconnect(&self, subscription: &BusSubscription) -> bool {
        self.event(&subscription.name)
            .is_some_and(|event| event.disconnect(subscription.handle))
    }

    /// Trigger `name` with `payload` raised by the host.
    pub fn trigger(&self, name: &str, payload: impl Into<Bytes>) -> Dispatch {
        self.dispatch(&EventArgs::new(name, payload, ""))
    }

    /// Trigger `name` with `payload` raised by `source`.
    pub fn trigger_from(&self, source: &str, name: &str, payload: impl Into<Bytes>) -> Dispatch {
        self.dispatch(&EventArgs::new(name, payload, source))
    }

    /// Deliver prepared event arguments.
    pub fn dispatch(&self, args: &EventArgs) -> Dispatch {
        let dispatch = match self.event(&args.name) {
            Some(event) => event.trigger(args),
            None => Dispatch::default(),
        };
        self.record(&dispatch);
        dispatch
    }

    /// Record a dispatch that was vetoed before reaching any handler.
    pub fn record_vetoed(&self) -> Dispatch {
        let dispatch = Dispatch::canceled_before_dispatch();
        self.record(&dispatch);
        dispatch
    }

    fn record(&self, dispatch: &Dispatch) {
        self.last_canceled
            .store(dispatch.is_canceled(), Ordering::Release);
    }

    /// Whether the most recently completed dispatch on this bus was canceled.
    ///
    /// Only meaningful when dispatches are not running concurrently on
    /// several threads.
    #[must_use]
    pub fn was_last_event_canceled(&self) -> bool {
        self.last_canceled.load(Ordering::Acquire)
    }

    /// Number of handlers connected to `name`.
    #[must_use]
    pub fn handler_count(&self, name: &str) -> usize {
        self.event(name).map_or(0, |event| event.handler_count())
    }

    /// Names that currently have at least one handler.
    #[must_use]
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .events
            .read()
            .iter()
            .filter(|(_, event)| event.handler_count() > 0)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("events", &self.event_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn trigger_without_handlers_is_not_canceled() {
        let bus = EventBus::new();
        let dispatch = bus.trigger("nobody", Bytes::new());
        assert!(!dispatch.is_canceled());
        assert_eq!(dispatch.invoked(), 0);
        assert!(!bus.was_last_event_canceled());
    }

    #[test]
    fn payload_and_source_reach_handler() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(None));
        let seen_c = Arc::clone(&seen);
        bus.connect("chat:message", 0, move |args, _| {
            *seen_c.lock() = Some(args.clone());
            Ok(())
        });

        bus.trigger_from("chat", "chat:message", Bytes::from_static(b"hello"));

        let args = seen.lock().clone().unwrap();
        assert_eq!(args.source, "chat");
        assert_eq!(&args.payload[..], b"hello");
    }

    #[test]
    fn events_are_isolated_by_name() {
        let bus = EventBus::new();
        bus.connect("a", 0, |_, ctx| {
            ctx.cancel();
            Ok(())
        });
        bus.connect("b", 0, |_, _| Ok(()));

        assert!(bus.trigger("a", Bytes::new()).is_canceled());
        assert!(bus.was_last_event_canceled());
        assert!(!bus.trigger("b", Bytes::new()).is_canceled());
        assert!(!bus.was_last_event_canceled());
    }

    #[test]
    fn disconnect_by_subscription() {
        let bus = EventBus::new();
        let sub = bus.connect("x", 0, |_, _| Ok(()));
        assert_eq!(sub.event_name(), "x");
        assert_eq!(bus.handler_count("x"), 1);
        assert!(bus.disconnect(&sub));
        assert_eq!(bus.handler_count("x"), 0);
        assert!(bus.event_names().is_empty());
    }

    #[test]
    fn vetoed_dispatch_is_recorded() {
        let bus = EventBus::new();
        let dispatch = bus.record_vetoed();
        assert!(dispatch.is_canceled());
        assert!(bus.was_last_event_canceled());
    }
}
