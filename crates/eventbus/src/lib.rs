//! # Citadel EventBus
//!
//! Ordered, cancelable notification delivery.
//!
//! Two shapes are provided:
//!
//! - [`Event<A>`]: a single signal with a typed argument. Resource lifecycle
//!   hooks (`OnStart`, `OnStop`, ...) are `Event<Resource>` values owned by
//!   the resource they describe.
//! - [`EventBus`]: a set of named events carrying an opaque [`Bytes`]
//!   payload, used for resource-to-resource broadcast.
//!
//! ## Dispatch rules
//!
//! - Handlers run in ascending priority (more negative = earlier); ties run
//!   in registration order.
//! - A handler that calls [`EventContext::cancel`] stops the dispatch: no
//!   later handler runs and the returned [`Dispatch`] reports `canceled`.
//! - A handler returning `Err(HandlerError)` is logged and recorded in the
//!   [`Dispatch`]; the remaining handlers still run. A panicking handler is
//!   caught and recorded the same way.
//! - `trigger` may be called from inside a handler. Every call gets its own
//!   [`EventContext`], so a nested cancellation never leaks outward.
//! - Handlers may connect or disconnect handlers while a dispatch is running.
//!   Dispatch iterates a snapshot; a handler disconnected before its turn is
//!   skipped.
//!
//! [`Bytes`]: bytes::Bytes

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bus;
mod error;
mod event;
pub mod priority;

pub use bus::{BusSubscription, EventArgs, EventBus};
pub use error::{BoxError, HandlerError, HandlerResult};
pub use event::{Dispatch, Event, EventContext, SubscriptionHandle};
