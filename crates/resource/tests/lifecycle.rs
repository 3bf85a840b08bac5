//! Start/stop ordering, rollback and cycle detection across resources.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use citadel_resource::{Error, Manifest, Resource, ResourceManager, ResourceState};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use rstest::rstest;

fn add(manager: &ResourceManager, name: &str, dependencies: &[&str]) -> Arc<Resource> {
    citadel_log::init_test();
    let resource = manager.create_resource(name).unwrap();
    let manifest = Manifest::parse(dependencies.iter().map(|d| ("dependency", *d)));
    resource.load_from(format!("/srv/{name}"), manifest).unwrap();
    resource
}

#[test]
fn start_twice_dispatches_once() {
    let manager = ResourceManager::new();
    let chat = add(&manager, "chat", &[]);

    let starts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&starts);
    chat.on_start().connect(0, move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    chat.start().unwrap();
    chat.start().unwrap();

    assert_eq!(chat.state(), ResourceState::Started);
    assert_eq!(starts.load(Ordering::SeqCst), 1);
}

#[test]
fn dependency_starts_before_dependent_handlers() {
    let manager = ResourceManager::new();
    let base = add(&manager, "base", &[]);
    let app = add(&manager, "app", &["base"]);

    let sequence = Arc::new(AtomicUsize::new(0));
    let base_done = Arc::new(AtomicUsize::new(usize::MAX));
    let app_ran = Arc::new(AtomicUsize::new(usize::MAX));

    let (seq, slot) = (Arc::clone(&sequence), Arc::clone(&base_done));
    base.on_start().connect(0, move |_, _| {
        slot.store(seq.fetch_add(1, Ordering::SeqCst), Ordering::SeqCst);
        Ok(())
    });
    let (seq, slot) = (Arc::clone(&sequence), Arc::clone(&app_ran));
    app.on_start().connect(0, move |_, _| {
        slot.store(seq.fetch_add(1, Ordering::SeqCst), Ordering::SeqCst);
        Ok(())
    });

    app.start().unwrap();

    assert_eq!(base.state(), ResourceState::Started);
    assert_eq!(app.state(), ResourceState::Started);
    assert!(base_done.load(Ordering::SeqCst) < app_ran.load(Ordering::SeqCst));
}

#[test]
fn missing_dependency_rolls_back() {
    let manager = ResourceManager::new();
    let app = add(&manager, "app", &["ghost"]);

    let ran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ran);
    app.on_start().connect(0, move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let err = app.start().unwrap_err();
    assert!(
        matches!(err, Error::MissingDependency { ref resource, ref dependency } if resource == "app" && dependency == "ghost"),
        "{err}"
    );
    assert_eq!(app.state(), ResourceState::Stopped);
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[rstest]
#[case("a")]
#[case("b")]
fn two_resource_cycle_is_detected(#[case] first: &str) {
    let manager = ResourceManager::new();
    let a = add(&manager, "a", &["b"]);
    let b = add(&manager, "b", &["a"]);

    let err = manager.get_resource(first).unwrap().start().unwrap_err();
    let Error::CyclicDependency { cycle, .. } = &err else {
        panic!("expected a cycle, got {err}");
    };
    assert!(cycle.starts_with(first) && cycle.ends_with(first), "{cycle}");

    assert_eq!(a.state(), ResourceState::Stopped);
    assert_eq!(b.state(), ResourceState::Stopped);
}

#[test]
fn self_dependency_is_a_cycle() {
    let manager = ResourceManager::new();
    let narcissus = add(&manager, "narcissus", &["narcissus"]);

    let err = narcissus.start().unwrap_err();
    assert!(matches!(err, Error::CyclicDependency { ref cycle, .. } if cycle == "narcissus -> narcissus"));
}

#[test]
fn three_resource_cycle_renders_path() {
    let manager = ResourceManager::new();
    add(&manager, "a", &["b"]);
    add(&manager, "b", &["c"]);
    add(&manager, "c", &["a"]);

    let err = manager.start_resource("a").unwrap_err();
    assert!(matches!(err, Error::CyclicDependency { ref cycle, .. } if cycle == "a -> b -> c -> a"));
    for resource in manager.resources() {
        assert_eq!(resource.state(), ResourceState::Stopped, "{}", resource.name());
    }
}

#[test]
fn cycle_through_a_start_handler_is_detected() {
    let manager = ResourceManager::new();
    let a = add(&manager, "a", &[]);
    let b = add(&manager, "b", &["a"]);

    let nested = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&nested);
    let weak = Arc::downgrade(&manager);
    a.on_start().connect(0, move |_, _| {
        let manager = weak.upgrade().unwrap();
        *slot.lock() = manager.start_resource("b").err();
        Ok(())
    });

    a.start().unwrap();

    let err = nested.lock().take().unwrap();
    assert!(
        matches!(err, Error::CyclicDependency { ref cycle, .. } if cycle == "a -> b -> a"),
        "{err}"
    );
    assert_eq!(a.state(), ResourceState::Started);
    assert_eq!(b.state(), ResourceState::Stopped);
}

#[test]
fn failing_dependency_is_wrapped() {
    let manager = ResourceManager::new();
    let base = add(&manager, "base", &[]);
    let app = add(&manager, "app", &["base"]);

    base.on_start().connect(0, |_, ctx| {
        ctx.cancel();
        Ok(())
    });

    let err = app.start().unwrap_err();
    assert_eq!(err.kind(), "dependency_start_failed");
    assert_eq!(err.dependency(), Some("base"));
    assert_eq!(app.state(), ResourceState::Stopped);
    assert_eq!(base.state(), ResourceState::Stopped);
}

#[test]
fn diamond_starts_shared_dependency_once() {
    let manager = ResourceManager::new();
    let base = add(&manager, "base", &[]);
    add(&manager, "left", &["base"]);
    add(&manager, "right", &["base"]);
    let top = add(&manager, "top", &["left", "right"]);

    let starts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&starts);
    base.on_start().connect(0, move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    top.start().unwrap();
    assert_eq!(starts.load(Ordering::SeqCst), 1);
    assert!(manager.resources().iter().all(|r| r.state() == ResourceState::Started));
}

#[test]
fn stop_hooks_run_in_order() {
    let manager = ResourceManager::new();
    let chat = add(&manager, "chat", &[]);
    let log = Arc::new(Mutex::new(Vec::new()));

    for (event, label) in [(chat.on_deactivate(), "deactivate"), (chat.on_stop(), "stop")] {
        let log = Arc::clone(&log);
        event.connect(0, move |_, _| {
            log.lock().push(label);
            Ok(())
        });
    }

    chat.start().unwrap();
    chat.stop().unwrap();
    assert_eq!(*log.lock(), vec!["deactivate", "stop"]);
    assert!(matches!(chat.stop(), Err(Error::InvalidState { .. })));
}

#[test]
fn panicking_handlers_do_not_wedge_the_resource() {
    let manager = ResourceManager::new();
    let chat = add(&manager, "chat", &[]);

    chat.on_start().connect(0, |_, _| panic!("start script crashed"));
    chat.on_stop().connect(0, |_, _| panic!("stop script crashed"));

    chat.start().unwrap();
    assert_eq!(chat.state(), ResourceState::Started);

    chat.stop().unwrap();
    assert_eq!(chat.state(), ResourceState::Stopped);

    chat.start().unwrap();
    chat.stop().unwrap();
    manager.remove_resource(&chat).unwrap();
    assert!(manager.get_resource("chat").is_none());
}

#[test]
fn legacy_dependency_key_is_resolved() {
    let manager = ResourceManager::new();
    let base = add(&manager, "base", &[]);
    let old = manager.create_resource("old").unwrap();
    old.load_from("", Manifest::parse([("dependencie", "base")])).unwrap();

    old.start().unwrap();
    assert_eq!(base.state(), ResourceState::Started);
}
