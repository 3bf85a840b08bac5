//! Single typed event with priority-ordered handlers.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{BoxError, HandlerError, HandlerResult};

type HandlerFn<A> = dyn Fn(&A, &mut EventContext<'_>) -> HandlerResult + Send + Sync;

// ---------------------------------------------------------------------------
// SubscriptionHandle
// ---------------------------------------------------------------------------

/// Opaque handle identifying a connected handler on one [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    /// Raw numeric id, unique per event.
    #[must_use]
    pub fn id(self) -> u64 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// EventContext
// ---------------------------------------------------------------------------

/// Per-dispatch state handed to each handler.
///
/// Every `trigger` call creates its own context, so a nested dispatch has an
/// independent cancellation flag.
pub struct EventContext<'a> {
    event: &'a str,
    priority: i64,
    canceled: bool,
    reason: Option<BoxError>,
}

impl<'a> EventContext<'a> {
    fn new(event: &'a str) -> Self {
        Self {
            event,
            priority: 0,
            canceled: false,
            reason: None,
        }
    }

    /// Name of the event being dispatched.
    #[must_use]
    pub fn event_name(&self) -> &str {
        self.event
    }

    /// Priority of the handler currently executing.
    #[must_use]
    pub fn priority(&self) -> i64 {
        self.priority
    }

    /// Cancel the dispatch. No later-priority handler will run.
    pub fn cancel(&mut self) {
        self.canceled = true;
    }

    /// Cancel the dispatch and attach a reason the caller of `trigger` can
    /// inspect (and downcast) through [`Dispatch::take_reason`].
    pub fn cancel_with(&mut self, reason: impl Into<BoxError>) {
        self.canceled = true;
        self.reason = Some(reason.into());
    }

    /// Whether a handler has canceled this dispatch.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.canceled
    }
}

impl fmt::Debug for EventContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventContext")
            .field("event", &self.event)
            .field("priority", &self.priority)
            .field("canceled", &self.canceled)
            .field("reason", &self.reason.as_ref().map(ToString::to_string))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Outcome of a single `trigger` call.
#[derive(Debug, Default)]
pub struct Dispatch {
    canceled: bool,
    reason: Option<BoxError>,
    errors: Vec<HandlerError>,
    invoked: usize,
}

impl Dispatch {
    pub(crate) fn canceled_before_dispatch() -> Self {
        Self {
            canceled: true,
            ..Self::default()
        }
    }

    /// Whether a handler canceled the dispatch.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.canceled
    }

    /// The cancellation reason, if the canceling handler supplied one.
    #[must_use]
    pub fn reason(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.reason.as_deref()
    }

    /// Take ownership of the cancellation reason.
    pub fn take_reason(&mut self) -> Option<BoxError> {
        self.reason.take()
    }

    /// Errors returned by handlers during this dispatch, in execution order.
    #[must_use]
    pub fn errors(&self) -> &[HandlerError] {
        &self.errors
    }

    /// Number of handlers that were invoked.
    #[must_use]
    pub fn invoked(&self) -> usize {
        self.invoked
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

struct Slot<A: ?Sized> {
    id: u64,
    priority: i64,
    alive: Arc<AtomicBool>,
    handler: Arc<HandlerFn<A>>,
}

impl<A: ?Sized> Clone for Slot<A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            priority: self.priority,
            alive: Arc::clone(&self.alive),
            handler: Arc::clone(&self.handler),
        }
    }
}

/// A single signal with priority-ordered handlers receiving `&A`.
///
/// The handler list is guarded by a short-lived lock that is never held while
/// a handler runs, so handlers may freely connect, disconnect or trigger
/// (including this same event) without deadlocking.
pub struct Event<A: ?Sized> {
    name: String,
    slots: Mutex<Vec<Slot<A>>>,
    next_id: AtomicU64,
    last_canceled: AtomicBool,
}

impl<A: ?Sized> Event<A> {
    /// Create an event with no handlers. The name is used in diagnostics.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slots: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            last_canceled: AtomicBool::new(false),
        }
    }

    /// Event name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Connect a handler at `priority`.
    ///
    /// Handlers with equal priority run in the order they were connected.
    pub fn connect<F>(&self, priority: i64, handler: F) -> SubscriptionHandle
    where
        F: Fn(&A, &mut EventContext<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Slot {
            id,
            priority,
            alive: Arc::new(AtomicBool::new(true)),
            handler: Arc::new(handler),
        };

        let mut slots = self.slots.lock();
        let pos = slots.partition_point(|s| s.priority <= priority);
        slots.insert(pos, slot);

        SubscriptionHandle(id)
    }

    /// Disconnect a handler. Returns `false` if it was not connected.
    ///
    /// Safe to call from inside a running handler: an in-flight dispatch
    /// skips the handler if it has not run yet.
    pub fn disconnect(&self, handle: SubscriptionHandle) -> bool {
        let mut slots = self.slots.lock();
        let Some(pos) = slots.iter().position(|s| s.id == handle.0) else {
            return false;
        };
        let slot = slots.remove(pos);
        slot.alive.store(false, Ordering::Release);
        true
    }

    /// Remove every handler.
    pub fn clear(&self) {
        let mut slots = self.slots.lock();
        for slot in slots.drain(..) {
            slot.alive.store(false, Ordering::Release);
        }
    }

    /// Number of connected handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.slots.lock().len()
    }

    /// Invoke the connected handlers in priority order.
    pub fn trigger(&self, args: &A) -> Dispatch {
        // Snapshot under the lock, then release before running handlers.
        let snapshot: Vec<Slot<A>> = self.slots.lock().clone();

        let mut ctx = EventContext::new(&self.name);
        let mut dispatch = Dispatch::default();

        for slot in &snapshot {
            if !slot.alive.load(Ordering::Acquire) {
                continue;
            }

            ctx.priority = slot.priority;
            dispatch.invoked += 1;

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (slot.handler)(args, &mut ctx)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::warn!(
                        event = %self.name,
                        priority = slot.priority,
                        error = %err,
                        "event handler failed"
                    );
                    dispatch.errors.push(err);
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(
                        event = %self.name,
                        priority = slot.priority,
                        panic = %message,
                        "event handler panicked"
                    );
                    dispatch.errors.push(HandlerError::new(format!("handler panicked: {message}")));
                }
            }

            if ctx.canceled {
                tracing::debug!(
                    event = %self.name,
                    priority = slot.priority,
                    "event canceled by handler"
                );
                break;
            }
        }

        dispatch.canceled = ctx.canceled;
        dispatch.reason = ctx.reason.take();
        self.last_canceled
            .store(dispatch.canceled, Ordering::Release);

        dispatch
    }

    /// Whether the most recently completed `trigger` on this event was
    /// canceled.
    #[must_use]
    pub fn was_last_canceled(&self) -> bool {
        self.last_canceled.load(Ordering::Acquire)
    }
}

impl<A: ?Sized> fmt::Debug for Event<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("handler_count", &self.handler_count())
            .finish()
    }
}
