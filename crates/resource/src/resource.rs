//! A single loadable resource and its lifecycle state machine.
//!
//! ```text
//! Uninitialized --load_from--> Stopped
//! Stopped       --start-->     Starting --OnStart ok-->       Started
//!                                       --OnStart canceled--> Stopped
//! Started       --stop-->      Stopping --OnDeactivate, OnStop--> Stopped
//! ```
//!
//! `OnStart` handlers run in ascending priority. The dependency resolver is
//! connected at [`priority::FIRST`](citadel_eventbus::priority::FIRST), so
//! every declared dependency is started before any other start logic runs.
//! A handler vetoes the start by canceling the dispatch; the resource then
//! returns to `Stopped`. Handlers that already ran are not rolled back, so
//! each `OnStart` handler must be safe to have run even if the start is
//! later aborted.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, LazyLock, OnceLock};

use citadel_eventbus::{Dispatch, Event};
use parking_lot::Mutex;

use crate::component::ComponentRegistry;
use crate::dependency::StartingGuard;
use crate::error::{Error, Result};
use crate::manifest::Manifest;

static EMPTY_MANIFEST: LazyLock<Manifest> = LazyLock::new(Manifest::default);

/// Lifecycle state of a [`Resource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    /// Constructed, manifest not loaded yet.
    #[default]
    Uninitialized,
    /// Loaded and idle.
    Stopped,
    /// `OnStart` handlers are running.
    Starting,
    /// Running.
    Started,
    /// `OnDeactivate` / `OnStop` handlers are running.
    Stopping,
}

impl ResourceState {
    /// Whether the resource is neither running nor in transition.
    #[must_use]
    pub fn is_idle(self) -> bool {
        matches!(self, Self::Uninitialized | Self::Stopped)
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

struct Loaded {
    root_path: String,
    manifest: Manifest,
}

/// An independently loadable, named unit of content.
///
/// Resources are shared as `Arc<Resource>`. Start, stop and tick are meant
/// to be driven from the manager thread; no lock is held while lifecycle
/// handlers run, so handlers may start, stop or look up other resources.
pub struct Resource {
    name: String,
    loaded: OnceLock<Loaded>,
    state: Mutex<ResourceState>,
    components: ComponentRegistry,
    on_start: Event<Resource>,
    on_activate: Event<Resource>,
    on_deactivate: Event<Resource>,
    on_stop: Event<Resource>,
    on_tick: Event<Resource>,
}

impl Resource {
    /// Construct an uninitialized resource.
    ///
    /// Prefer [`ResourceFactory::create`](crate::mounter::ResourceFactory::create),
    /// which also runs the manager's initialization hooks.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            loaded: OnceLock::new(),
            state: Mutex::new(ResourceState::Uninitialized),
            components: ComponentRegistry::new(),
            on_start: Event::new("OnStart"),
            on_activate: Event::new("OnActivate"),
            on_deactivate: Event::new("OnDeactivate"),
            on_stop: Event::new("OnStop"),
            on_tick: Event::new("OnTick"),
        }
    }

    /// Unique resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Where the resource content was loaded from (empty before loading).
    #[must_use]
    pub fn root_path(&self) -> &str {
        self.loaded.get().map_or("", |l| l.root_path.as_str())
    }

    /// The resource manifest (empty before loading).
    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        self.loaded.get().map_or(&EMPTY_MANIFEST, |l| &l.manifest)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ResourceState {
        *self.state.lock()
    }

    /// Attach the loaded manifest and move to `Stopped`.
    pub fn load_from(&self, root_path: impl Into<String>, manifest: Manifest) -> Result<()> {
        let mut state = self.state.lock();
        if *state != ResourceState::Uninitialized {
            return Err(self.invalid_state(*state, "load"));
        }

        let loaded = Loaded {
            root_path: root_path.into(),
            manifest,
        };
        if self.loaded.set(loaded).is_err() {
            return Err(self.invalid_state(*state, "load"));
        }
        *state = ResourceState::Stopped;

        tracing::debug!(
            resource = %self.name,
            root_path = %self.root_path(),
            entries = self.manifest().len(),
            "resource loaded"
        );
        Ok(())
    }

    /// Start the resource.
    ///
    /// Returns `Ok` without dispatching anything if the resource is already
    /// started. Fails with [`Error::InvalidState`] while starting or
    /// stopping, or before it has been loaded.
    pub fn start(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            match *state {
                ResourceState::Started => return Ok(()),
                ResourceState::Stopped => *state = ResourceState::Starting,
                other => return Err(self.invalid_state(other, "start")),
            }
        }

        tracing::debug!(resource = %self.name, "starting resource");
        let mut dispatch = {
            let _starting = StartingGuard::enter(&self.name);
            self.on_start.trigger(self)
        };

        if dispatch.is_canceled() {
            *self.state.lock() = ResourceState::Stopped;
            let err = self.start_failure(&mut dispatch);
            tracing::warn!(
                resource = %self.name,
                kind = err.kind(),
                dependency = err.dependency().unwrap_or(""),
                error = %err,
                "resource failed to start"
            );
            return Err(err);
        }

        *self.state.lock() = ResourceState::Started;
        self.on_activate.trigger(self);

        tracing::info!(resource = %self.name, "started resource");
        Ok(())
    }

    fn start_failure(&self, dispatch: &mut Dispatch) -> Error {
        let Some(reason) = dispatch.take_reason() else {
            return Error::StartCanceled {
                resource: self.name.clone(),
                reason: "canceled by an OnStart handler".to_owned(),
            };
        };
        match reason.downcast::<Error>() {
            Ok(err) => *err,
            Err(other) => Error::StartCanceled {
                resource: self.name.clone(),
                reason: other.to_string(),
            },
        }
    }

    /// Stop a started resource.
    ///
    /// `OnDeactivate` then `OnStop` run to completion; cancellation and
    /// handler failures are logged but never block shutdown.
    pub fn stop(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != ResourceState::Started {
                return Err(self.invalid_state(*state, "stop"));
            }
            *state = ResourceState::Stopping;
        }

        tracing::debug!(resource = %self.name, "stopping resource");
        for event in [&self.on_deactivate, &self.on_stop] {
            let dispatch = event.trigger(self);
            if dispatch.is_canceled() {
                tracing::warn!(
                    resource = %self.name,
                    event = event.name(),
                    "stop handlers cannot cancel shutdown; continuing"
                );
            }
        }

        *self.state.lock() = ResourceState::Stopped;
        tracing::info!(resource = %self.name, "stopped resource");
        Ok(())
    }

    /// Periodic bookkeeping; safe in any state.
    pub fn tick(&self) {
        self.on_tick.trigger(self);
    }

    fn invalid_state(&self, state: ResourceState, operation: &'static str) -> Error {
        Error::InvalidState {
            resource: self.name.clone(),
            state,
            operation,
        }
    }

    /// Handlers run when the resource starts. Cancel to veto the start.
    #[must_use]
    pub fn on_start(&self) -> &Event<Resource> {
        &self.on_start
    }

    /// Handlers run after the resource has become `Started`.
    #[must_use]
    pub fn on_activate(&self) -> &Event<Resource> {
        &self.on_activate
    }

    /// Handlers run first when the resource stops.
    #[must_use]
    pub fn on_deactivate(&self) -> &Event<Resource> {
        &self.on_deactivate
    }

    /// Handlers run after `OnDeactivate` when the resource stops.
    #[must_use]
    pub fn on_stop(&self) -> &Event<Resource> {
        &self.on_stop
    }

    /// Handlers run on every manager tick.
    #[must_use]
    pub fn on_tick(&self) -> &Event<Resource> {
        &self.on_tick
    }

    /// Per-resource component side-table.
    #[must_use]
    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// Attach a component, replacing any previous one of the same type.
    pub fn set_component<T: Any + Send + Sync>(&self, component: T) -> Option<Arc<T>> {
        self.components.set(component)
    }

    /// Look up an attached component.
    #[must_use]
    pub fn component<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.components.get::<T>()
    }

    /// Whether a component of type `T` is attached.
    #[must_use]
    pub fn has_component<T: Any + Send + Sync>(&self) -> bool {
        self.components.contains::<T>()
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("root_path", &self.root_path())
            .finish_non_exhaustive()
    }
}
