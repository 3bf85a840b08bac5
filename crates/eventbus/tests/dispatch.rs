//! Dispatch ordering, cancellation and re-entrancy.

use std::sync::Arc;

use bytes::Bytes;
use citadel_eventbus::{Event, EventBus, HandlerError, SubscriptionHandle, priority};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use rstest::rstest;

type Log = Arc<Mutex<Vec<String>>>;

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn push(log: &Log, entry: impl Into<String>) {
    log.lock().push(entry.into());
}

#[test]
fn handlers_run_in_priority_then_registration_order() {
    let bus = EventBus::new();
    let order = log();

    for (tag, prio) in [("H1", -10), ("H2", 0), ("H3", -10)] {
        let order = Arc::clone(&order);
        bus.connect("ordered", prio, move |_, _| {
            push(&order, tag);
            Ok(())
        });
    }

    bus.trigger("ordered", Bytes::new());
    assert_eq!(*order.lock(), vec!["H1", "H3", "H2"]);
}

#[test]
fn cancel_short_circuits_later_handlers() {
    let bus = EventBus::new();
    let order = log();

    let o = Arc::clone(&order);
    bus.connect("veto", -1, move |_, ctx| {
        push(&o, "canceler");
        ctx.cancel();
        Ok(())
    });
    let o = Arc::clone(&order);
    bus.connect("veto", 1, move |_, _| {
        push(&o, "late");
        Ok(())
    });

    let dispatch = bus.trigger("veto", Bytes::new());
    assert!(dispatch.is_canceled());
    assert_eq!(dispatch.invoked(), 1);
    assert_eq!(*order.lock(), vec!["canceler"]);
    assert!(bus.was_last_event_canceled());
}

#[test]
fn failing_handler_does_not_stop_dispatch() {
    let event: Event<u32> = Event::new("failing");
    let order = log();

    event.connect(0, |_, _| Err(HandlerError::new("boom")));
    let o = Arc::clone(&order);
    event.connect(1, move |value, _| {
        push(&o, format!("got {value}"));
        Ok(())
    });

    let dispatch = event.trigger(&7);
    assert!(!dispatch.is_canceled());
    assert_eq!(dispatch.invoked(), 2);
    assert_eq!(dispatch.errors().len(), 1);
    assert_eq!(dispatch.errors()[0].message(), "boom");
    assert_eq!(*order.lock(), vec!["got 7"]);
}

#[test]
fn panicking_handler_is_recorded_and_dispatch_continues() {
    let event: Event<u32> = Event::new("panicking");
    let order = log();

    event.connect(0, |value, _| panic!("handler exploded on {value}"));
    let o = Arc::clone(&order);
    event.connect(1, move |value, _| {
        push(&o, format!("got {value}"));
        Ok(())
    });

    let dispatch = event.trigger(&3);
    assert!(!dispatch.is_canceled());
    assert_eq!(dispatch.invoked(), 2);
    assert_eq!(dispatch.errors().len(), 1);
    assert_eq!(dispatch.errors()[0].message(), "handler panicked: handler exploded on 3");
    assert_eq!(*order.lock(), vec!["got 3"]);
}

#[test]
fn nested_trigger_has_independent_cancellation() {
    let outer: Arc<Event<()>> = Arc::new(Event::new("outer"));
    let inner: Arc<Event<()>> = Arc::new(Event::new("inner"));
    let order = log();

    inner.connect(0, |_, ctx| {
        ctx.cancel();
        Ok(())
    });

    let inner_c = Arc::clone(&inner);
    let o = Arc::clone(&order);
    outer.connect(0, move |_, ctx| {
        let nested = inner_c.trigger(&());
        push(&o, format!("inner canceled: {}", nested.is_canceled()));
        push(&o, format!("outer canceled: {}", ctx.is_canceled()));
        Ok(())
    });
    let o = Arc::clone(&order);
    outer.connect(1, move |_, _| {
        push(&o, "outer second");
        Ok(())
    });

    let dispatch = outer.trigger(&());
    assert!(!dispatch.is_canceled());
    assert!(inner.was_last_canceled());
    assert!(!outer.was_last_canceled());
    assert_eq!(
        *order.lock(),
        vec!["inner canceled: true", "outer canceled: false", "outer second"]
    );
}

#[test]
fn handler_may_trigger_the_same_event() {
    let event: Arc<Event<u32>> = Arc::new(Event::new("countdown"));
    let order = log();

    let weak = Arc::downgrade(&event);
    let o = Arc::clone(&order);
    event.connect(0, move |n, _| {
        push(&o, n.to_string());
        if *n > 0
            && let Some(event) = weak.upgrade()
        {
            event.trigger(&(n - 1));
        }
        Ok(())
    });

    event.trigger(&3);
    assert_eq!(*order.lock(), vec!["3", "2", "1", "0"]);
}

#[test]
fn disconnect_from_inside_handler_skips_pending_handler() {
    let event: Arc<Event<()>> = Arc::new(Event::new("self-edit"));
    let order = log();
    let victim: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));

    let event_c = Arc::downgrade(&event);
    let victim_c = Arc::clone(&victim);
    let o = Arc::clone(&order);
    event.connect(0, move |_, _| {
        push(&o, "first");
        if let (Some(event), Some(handle)) = (event_c.upgrade(), *victim_c.lock()) {
            event.disconnect(handle);
        }
        Ok(())
    });

    let o = Arc::clone(&order);
    let handle = event.connect(1, move |_, _| {
        push(&o, "victim");
        Ok(())
    });
    *victim.lock() = Some(handle);

    let o = Arc::clone(&order);
    event.connect(2, move |_, _| {
        push(&o, "last");
        Ok(())
    });

    let dispatch = event.trigger(&());
    assert_eq!(dispatch.invoked(), 2);
    assert_eq!(*order.lock(), vec!["first", "last"]);
    assert_eq!(event.handler_count(), 2);
}

#[test]
fn connect_from_inside_handler_takes_effect_next_dispatch() {
    let event: Arc<Event<()>> = Arc::new(Event::new("grow"));
    let count = Arc::new(Mutex::new(0_u32));

    let weak = Arc::downgrade(&event);
    let c = Arc::clone(&count);
    event.connect(0, move |_, _| {
        *c.lock() += 1;
        if let Some(event) = weak.upgrade() {
            event.connect(1, |_, _| Ok(()));
        }
        Ok(())
    });

    assert_eq!(event.trigger(&()).invoked(), 1);
    assert_eq!(event.trigger(&()).invoked(), 2);
    assert_eq!(*count.lock(), 2);
}

#[rstest]
#[case(priority::FIRST, priority::DEFAULT)]
#[case(priority::DEFAULT, priority::LAST)]
#[case(-1, 1)]
fn lower_priority_runs_first(#[case] early: i64, #[case] late: i64) {
    let event: Event<()> = Event::new("pair");
    let order = log();

    let o = Arc::clone(&order);
    event.connect(late, move |_, _| {
        push(&o, "late");
        Ok(())
    });
    let o = Arc::clone(&order);
    event.connect(early, move |_, _| {
        push(&o, "early");
        Ok(())
    });

    event.trigger(&());
    assert_eq!(*order.lock(), vec!["early", "late"]);
}
