//! Resource manager: registry, mounters, tick loop and resource events.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use citadel_eventbus::{Dispatch, Event, EventArgs, EventBus, HandlerError, priority};
use parking_lot::{Mutex, ReentrantMutex};
use tokio::sync::broadcast;

use crate::component::ComponentRegistry;
use crate::config::ManagerConfig;
use crate::constraint::ConstraintRegistry;
use crate::dependency;
use crate::error::{Error, Result};
use crate::events::{LifecycleNotifier, ResourceEvent};
use crate::exports::{ExportFn, ExportRegistry};
use crate::mounter::{ResourceFactory, ResourceMounter, ResourceUri};
use crate::resource::{Resource, ResourceState};

/// Custom event fired with the resource name as payload after a start.
pub const RESOURCE_START_EVENT: &str = "onResourceStart";
/// Custom event fired with the resource name as payload after a stop.
pub const RESOURCE_STOP_EVENT: &str = "onResourceStop";

// ---------------------------------------------------------------------------
// ResourceCommand
// ---------------------------------------------------------------------------

/// Start/stop requests delivered by an external transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceCommand {
    /// Start the named resource on the next tick.
    Start(String),
    /// Stop the named resource immediately.
    Stop(String),
}

// ---------------------------------------------------------------------------
// ResourceManager
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Registry {
    resources: HashMap<String, Arc<Resource>>,
    mounters: Vec<Arc<dyn ResourceMounter>>,
}

/// Owns every registered resource and the mounters that produce them.
///
/// The registry sits behind a re-entrant lock: a resource start triggers
/// the dependency resolver, which looks up and starts other resources on
/// the same thread while an outer manager operation may still hold the lock.
/// `RefCell` borrows of the registry are never held across handler calls.
///
/// `start`, `stop` and `tick` are expected to run on a single manager thread;
/// only [`add_resource`](Self::add_resource) suspends.
pub struct ResourceManager {
    registry: ReentrantMutex<RefCell<Registry>>,
    factory: ResourceFactory,
    constraints: ConstraintRegistry,
    exports: ExportRegistry,
    events: EventBus,
    on_trigger_event: Event<EventArgs>,
    queued_events: Mutex<VecDeque<EventArgs>>,
    pending_starts: Mutex<VecDeque<String>>,
    start_order: Mutex<Vec<String>>,
    notifier: LifecycleNotifier,
    components: ComponentRegistry,
    config: ManagerConfig,
}

impl ResourceManager {
    /// Create a manager with the default configuration.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::build(ManagerConfig::default())
    }

    /// Create a manager with a validated configuration.
    pub fn with_config(config: ManagerConfig) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: ManagerConfig) -> Arc<Self> {
        Arc::new_cyclic(|this| {
            let constraints = ConstraintRegistry::new();
            constraints.set_enforcing(config.enforce_constraints);

            let manager = Self {
                registry: ReentrantMutex::new(RefCell::new(Registry::default())),
                factory: ResourceFactory::new(),
                constraints,
                exports: ExportRegistry::new(),
                events: EventBus::new(),
                on_trigger_event: Event::new("OnTriggerEvent"),
                queued_events: Mutex::new(VecDeque::new()),
                pending_starts: Mutex::new(VecDeque::new()),
                start_order: Mutex::new(Vec::new()),
                notifier: LifecycleNotifier::new(config.event_buffer),
                components: ComponentRegistry::new(),
                config,
            };
            manager.install_instance_hooks(this.clone());
            manager
        })
    }

    /// Every constructed resource gets the dependency resolver and the
    /// lifecycle bookkeeping hooks.
    fn install_instance_hooks(&self, this: Weak<Self>) {
        self.factory
            .on_initialize_instance()
            .connect(priority::FIRST, move |resource, _| {
                dependency::attach(resource, this.clone());

                let manager = this.clone();
                resource.on_activate().connect(priority::LAST, move |res, _| {
                    if let Some(manager) = manager.upgrade() {
                        manager.record_started(res);
                    }
                    Ok(())
                });

                let manager = this.clone();
                resource.on_stop().connect(priority::LAST, move |res, _| {
                    if let Some(manager) = manager.upgrade() {
                        manager.record_stopped(res);
                    }
                    Ok(())
                });
                Ok(())
            });
    }

    fn record_started(&self, resource: &Resource) {
        let name = resource.name();
        {
            let mut order = self.start_order.lock();
            order.retain(|n| n != name);
            order.push(name.to_owned());
        }
        self.notifier.emit(ResourceEvent::Started {
            resource: name.to_owned(),
        });
        if self.config.emit_lifecycle_events {
            self.dispatch_event(&EventArgs::new(RESOURCE_START_EVENT, name.to_owned(), name));
        }
    }

    fn record_stopped(&self, resource: &Resource) {
        let name = resource.name();
        self.start_order.lock().retain(|n| n != name);

        let dropped = self.exports.clear_resource(name);
        if dropped > 0 {
            tracing::debug!(resource = %name, dropped, "dropped exports of stopped resource");
        }

        self.notifier.emit(ResourceEvent::Stopped {
            resource: name.to_owned(),
        });
        if self.config.emit_lifecycle_events {
            self.dispatch_event(&EventArgs::new(RESOURCE_STOP_EVENT, name.to_owned(), name));
        }
    }

    // -- mounters ------------------------------------------------------------

    /// Append a mounter. Earlier mounters win when several claim a scheme.
    pub fn add_mounter(&self, mounter: Arc<dyn ResourceMounter>) {
        let guard = self.registry.lock();
        guard.borrow_mut().mounters.push(mounter);
    }

    /// The first mounter that handles the scheme of `uri`.
    #[must_use]
    pub fn get_mounter_for_uri(&self, uri: &str) -> Option<Arc<dyn ResourceMounter>> {
        let uri = ResourceUri::parse(uri).ok()?;
        self.mounter_for(&uri)
    }

    fn mounter_for(&self, uri: &ResourceUri) -> Option<Arc<dyn ResourceMounter>> {
        let guard = self.registry.lock();
        let registry = guard.borrow();
        registry
            .mounters
            .iter()
            .find(|mounter| mounter.handles_scheme(uri.scheme()))
            .cloned()
    }

    // -- registry ------------------------------------------------------------

    /// Mount the resource at `uri` and register it. The resource is not
    /// started.
    pub async fn add_resource(&self, uri: &str) -> Result<Arc<Resource>> {
        let uri = ResourceUri::parse(uri)?;
        let mounter = self
            .mounter_for(&uri)
            .ok_or_else(|| Error::UnresolvableScheme {
                uri: uri.as_str().to_owned(),
                scheme: uri.scheme().to_owned(),
            })?;

        let resource = mounter
            .load_resource(&self.factory, &uri)
            .await
            .inspect_err(|e| {
                tracing::warn!(uri = %uri, kind = e.kind(), error = %e, "failed to mount resource");
            })?;

        if resource.state() != ResourceState::Stopped {
            return Err(Error::mounter_failed(
                uri.as_str(),
                format!("mounter returned '{}' while it is {}", resource.name(), resource.state()),
            ));
        }

        self.register(&resource)?;
        tracing::info!(resource = %resource.name(), uri = %uri, "added resource");
        Ok(resource)
    }

    /// Construct an in-process resource (e.g. a bootstrap resource) and
    /// register it. The resource is `Uninitialized` until the caller loads it.
    pub fn create_resource(&self, name: &str) -> Result<Arc<Resource>> {
        let guard = self.registry.lock();
        if guard.borrow().resources.contains_key(name) {
            return Err(Error::DuplicateName { name: name.to_owned() });
        }

        let resource = self.factory.create(name);
        self.register(&resource)?;
        drop(guard);

        tracing::info!(resource = %name, "created resource");
        Ok(resource)
    }

    fn register(&self, resource: &Arc<Resource>) -> Result<()> {
        {
            let guard = self.registry.lock();
            let mut registry = guard.borrow_mut();
            if registry.resources.contains_key(resource.name()) {
                return Err(Error::DuplicateName {
                    name: resource.name().to_owned(),
                });
            }
            registry
                .resources
                .insert(resource.name().to_owned(), Arc::clone(resource));
        }

        self.notifier.emit(ResourceEvent::Added {
            resource: resource.name().to_owned(),
        });
        Ok(())
    }

    /// Look up a resource by name.
    #[must_use]
    pub fn get_resource(&self, name: &str) -> Option<Arc<Resource>> {
        self.registry.lock().borrow().resources.get(name).cloned()
    }

    /// Unregister a stopped (or never loaded) resource.
    pub fn remove_resource(&self, resource: &Arc<Resource>) -> Result<()> {
        let name = resource.name();
        {
            let guard = self.registry.lock();
            let state = resource.state();
            if !state.is_idle() {
                return Err(Error::Busy {
                    resource: name.to_owned(),
                    state,
                });
            }

            let mut registry = guard.borrow_mut();
            match registry.resources.get(name) {
                Some(registered) if Arc::ptr_eq(registered, resource) => {
                    registry.resources.remove(name);
                }
                _ => return Err(Error::NotFound { name: name.to_owned() }),
            }
        }

        self.forget(name);
        tracing::info!(resource = %name, "removed resource");
        Ok(())
    }

    fn forget(&self, name: &str) {
        self.exports.clear_resource(name);
        self.pending_starts.lock().retain(|n| n != name);
        self.start_order.lock().retain(|n| n != name);
        self.notifier.emit(ResourceEvent::Removed {
            resource: name.to_owned(),
        });
    }

    /// Snapshot of all registered resources, ordered by name.
    #[must_use]
    pub fn resources(&self) -> Vec<Arc<Resource>> {
        let mut snapshot: Vec<Arc<Resource>> = {
            let guard = self.registry.lock();
            let registry = guard.borrow();
            registry.resources.values().cloned().collect()
        };
        snapshot.sort_by(|a, b| a.name().cmp(b.name()));
        snapshot
    }

    /// Number of registered resources.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.registry.lock().borrow().resources.len()
    }

    /// Call `f` for every resource in a snapshot of the registry.
    ///
    /// `f` may add or remove resources; changes are not visible to the
    /// current iteration.
    pub fn for_all_resources<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<Resource>),
    {
        for resource in self.resources() {
            f(&resource);
        }
    }

    // -- lifecycle -----------------------------------------------------------

    /// Start the named resource.
    pub fn start_resource(&self, name: &str) -> Result<()> {
        let resource = self
            .get_resource(name)
            .ok_or_else(|| Error::NotFound { name: name.to_owned() })?;

        resource.start().inspect_err(|e| {
            self.notifier.emit(ResourceEvent::StartFailed {
                resource: name.to_owned(),
                kind: e.kind(),
                error: e.to_string(),
            });
        })
    }

    /// Stop the named resource.
    pub fn stop_resource(&self, name: &str) -> Result<()> {
        let resource = self
            .get_resource(name)
            .ok_or_else(|| Error::NotFound { name: name.to_owned() })?;
        resource.stop()
    }

    /// Apply a transport command. `Stop` runs now; `Start` waits for the
    /// next [`tick`](Self::tick). Failures are logged.
    pub fn submit(&self, command: ResourceCommand) {
        match command {
            ResourceCommand::Stop(name) => {
                if let Err(e) = self.stop_resource(&name) {
                    tracing::warn!(resource = %name, kind = e.kind(), error = %e, "stop command failed");
                }
            }
            ResourceCommand::Start(name) => {
                tracing::debug!(resource = %name, "queued start command");
                self.pending_starts.lock().push_back(name);
            }
        }
    }

    /// Stop every started resource, then unregister everything.
    ///
    /// Resources stop in reverse start order; any other started resource
    /// stops afterwards in name order.
    pub fn reset_resources(&self) {
        let guard = self.registry.lock();

        let mut order: Vec<String> = self.start_order.lock().iter().rev().cloned().collect();
        for resource in self.resources() {
            if !order.iter().any(|n| n == resource.name()) {
                order.push(resource.name().to_owned());
            }
        }

        for name in &order {
            let Some(resource) = self.get_resource(name) else {
                continue;
            };
            if resource.state() != ResourceState::Started {
                continue;
            }
            if let Err(e) = resource.stop() {
                tracing::error!(resource = %name, kind = e.kind(), error = %e, "failed to stop resource during reset");
            }
        }

        let removed: Vec<String> = {
            let mut registry = guard.borrow_mut();
            let mut names: Vec<String> = registry.resources.drain().map(|(name, _)| name).collect();
            names.sort();
            names
        };
        for name in &removed {
            self.forget(name);
        }
        self.pending_starts.lock().clear();
        self.start_order.lock().clear();

        tracing::info!(removed = removed.len(), "reset resources");
    }

    /// Per-frame work: run queued starts, deliver queued events, then tick
    /// every resource.
    pub fn tick(&self) {
        let starts: Vec<String> = self.pending_starts.lock().drain(..).collect();
        for name in starts {
            if let Err(e) = self.start_resource(&name) {
                tracing::warn!(
                    resource = %name,
                    kind = e.kind(),
                    dependency = e.dependency().unwrap_or(""),
                    error = %e,
                    "queued start failed"
                );
            }
        }

        let events: Vec<EventArgs> = self.queued_events.lock().drain(..).collect();
        for args in &events {
            self.dispatch_event(args);
        }

        self.for_all_resources(|resource| resource.tick());
    }

    /// Subscribe to [`ResourceEvent`]s.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ResourceEvent> {
        self.notifier.subscribe()
    }

    // -- custom events -------------------------------------------------------

    /// Deliver a custom event to its handlers now.
    ///
    /// `on_trigger_event` handlers run first; canceling there drops the event.
    pub fn trigger_event(&self, name: &str, payload: impl Into<Bytes>, source: &str) -> Dispatch {
        self.dispatch_event(&EventArgs::new(name, payload, source))
    }

    fn dispatch_event(&self, args: &EventArgs) -> Dispatch {
        let veto = self.on_trigger_event.trigger(args);
        if veto.is_canceled() {
            tracing::debug!(event = %args.name, source = %args.source, "custom event vetoed");
            return self.events.record_vetoed();
        }
        self.events.dispatch(args)
    }

    /// Defer a custom event to the next tick. Returns `false` if the queue
    /// is full and the event was dropped.
    pub fn queue_event(&self, name: &str, payload: impl Into<Bytes>, source: &str) -> bool {
        let mut queue = self.queued_events.lock();
        if queue.len() >= self.config.max_queued_events {
            tracing::warn!(
                event = %name,
                source = %source,
                limit = self.config.max_queued_events,
                "event queue full; dropping event"
            );
            return false;
        }
        queue.push_back(EventArgs::new(name, payload, source));
        true
    }

    /// Whether the most recent custom event dispatch was canceled.
    #[must_use]
    pub fn was_last_event_canceled(&self) -> bool {
        self.events.was_last_event_canceled()
    }

    /// Named custom events. Connect handlers here.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Veto hook run before every custom event dispatch.
    #[must_use]
    pub fn on_trigger_event(&self) -> &Event<EventArgs> {
        &self.on_trigger_event
    }

    // -- exports -------------------------------------------------------------

    /// Provide the implementation of an export declared by `resource`.
    pub fn register_export<F>(&self, resource: &str, export: &str, function: F) -> Result<()>
    where
        F: Fn(&Bytes) -> std::result::Result<Bytes, HandlerError> + Send + Sync + 'static,
    {
        let target = self
            .get_resource(resource)
            .ok_or_else(|| Error::NotFound { name: resource.to_owned() })?;
        if !target.manifest().declares_export(export) {
            return Err(Error::ExportNotDeclared {
                resource: resource.to_owned(),
                export: export.to_owned(),
            });
        }

        let function: ExportFn = Arc::new(function);
        if self.exports.insert(resource, export, function) {
            tracing::debug!(resource, export, "replaced export implementation");
        }
        Ok(())
    }

    /// Call an export of a started resource.
    pub fn call_export(&self, resource: &str, export: &str, args: &Bytes) -> Result<Bytes> {
        let target = self
            .get_resource(resource)
            .ok_or_else(|| Error::NotFound { name: resource.to_owned() })?;
        if !target.manifest().declares_export(export) {
            return Err(Error::ExportNotDeclared {
                resource: resource.to_owned(),
                export: export.to_owned(),
            });
        }

        let unavailable = |reason: String| Error::ExportUnavailable {
            resource: resource.to_owned(),
            export: export.to_owned(),
            reason,
        };
        let state = target.state();
        if state != ResourceState::Started {
            return Err(unavailable(format!("resource is {state}")));
        }
        let function = self
            .exports
            .get(resource, export)
            .ok_or_else(|| unavailable("no implementation registered".to_owned()))?;

        function(args).map_err(|source| Error::Handler {
            resource: resource.to_owned(),
            event: export.to_owned(),
            source,
        })
    }

    /// Number of export implementations registered for `resource`.
    #[must_use]
    pub fn export_count(&self, resource: &str) -> usize {
        self.exports.count(resource)
    }

    // -- accessors -----------------------------------------------------------

    /// Hooks run once for every resource this manager constructs, before
    /// it is loaded.
    #[must_use]
    pub fn on_initialize_instance(&self) -> &Event<Resource> {
        self.factory.on_initialize_instance()
    }

    /// The factory handed to mounters.
    #[must_use]
    pub fn factory(&self) -> &ResourceFactory {
        &self.factory
    }

    /// Constraints checked by `/key...` dependency entries.
    #[must_use]
    pub fn constraints(&self) -> &ConstraintRegistry {
        &self.constraints
    }

    /// Manager-level component side-table.
    #[must_use]
    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// Attach a manager-level component.
    pub fn set_component<T: Any + Send + Sync>(&self, component: T) -> Option<Arc<T>> {
        self.components.set(component)
    }

    /// Look up a manager-level component.
    #[must_use]
    pub fn component<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.components.get::<T>()
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }
}

impl fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (resources, mounters) = {
            let guard = self.registry.lock();
            let registry = guard.borrow();
            (registry.resources.len(), registry.mounters.len())
        };
        f.debug_struct("ResourceManager")
            .field("resources", &resources)
            .field("mounters", &mounters)
            .field("constraints", &self.constraints.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;

    fn loaded(manager: &ResourceManager, name: &str, manifest: Manifest) -> Arc<Resource> {
        let resource = manager.create_resource(name).unwrap();
        resource.load_from("", manifest).unwrap();
        resource
    }

    #[test]
    fn create_resource_rejects_duplicates() {
        let manager = ResourceManager::new();
        manager.create_resource("system").unwrap();
        let err = manager.create_resource("system").unwrap_err();
        assert!(matches!(err, Error::DuplicateName { .. }));
        assert_eq!(manager.resource_count(), 1);
    }

    #[test]
    fn registry_key_matches_name() {
        let manager = ResourceManager::new();
        loaded(&manager, "b", Manifest::default());
        loaded(&manager, "a", Manifest::default());
        let names: Vec<String> = manager.resources().iter().map(|r| r.name().to_owned()).collect();
        assert_eq!(names, ["a", "b"]);
        assert!(manager.get_resource("a").is_some_and(|r| r.name() == "a"));
    }

    #[test]
    fn remove_requires_stopped() {
        let manager = ResourceManager::new();
        let chat = loaded(&manager, "chat", Manifest::default());
        chat.start().unwrap();

        let err = manager.remove_resource(&chat).unwrap_err();
        assert!(matches!(err, Error::Busy { state: ResourceState::Started, .. }));

        chat.stop().unwrap();
        manager.remove_resource(&chat).unwrap();
        assert!(manager.get_resource("chat").is_none());
    }

    #[test]
    fn remove_of_foreign_instance_is_not_found() {
        let manager = ResourceManager::new();
        loaded(&manager, "chat", Manifest::default());
        let impostor = Arc::new(Resource::new("chat"));
        let err = manager.remove_resource(&impostor).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn for_all_resources_may_remove_during_iteration() {
        let manager = ResourceManager::new();
        for name in ["a", "b", "c"] {
            loaded(&manager, name, Manifest::default());
        }

        let mut visited = Vec::new();
        manager.for_all_resources(|resource| {
            visited.push(resource.name().to_owned());
            manager.remove_resource(resource).unwrap();
        });

        assert_eq!(visited, ["a", "b", "c"]);
        assert_eq!(manager.resource_count(), 0);
    }

    #[test]
    fn handler_may_query_manager_while_starting() {
        let manager = ResourceManager::new();
        let base = loaded(&manager, "base", Manifest::default());
        let app = loaded(&manager, "app", Manifest::parse([("dependency", "base")]));

        let weak = Arc::downgrade(&manager);
        app.on_start().connect(0, move |_, _| {
            let manager = weak.upgrade().unwrap();
            assert_eq!(manager.resources().len(), 2);
            assert_eq!(manager.get_resource("base").unwrap().state(), ResourceState::Started);
            Ok(())
        });

        app.start().unwrap();
        assert_eq!(base.state(), ResourceState::Started);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ManagerConfig {
            event_buffer: 0,
            ..ManagerConfig::default()
        };
        assert!(matches!(
            ResourceManager::with_config(config),
            Err(Error::Configuration { .. })
        ));
    }

    #[test]
    fn manager_components() {
        struct Clock(u32);
        let manager = ResourceManager::new();
        manager.set_component(Clock(3));
        assert_eq!(manager.component::<Clock>().unwrap().0, 3);
        assert!(manager.component::<String>().is_none());
    }
}
