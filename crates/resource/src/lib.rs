//! # Citadel Resource Runtime
//!
//! Discovers, loads, starts and stops independently packaged resources.
//!
//! - [`ResourceManager`] owns the registry and the [`ResourceMounter`]s that
//!   turn URIs into loaded [`Resource`]s.
//! - Each [`Resource`] runs a small state machine whose transitions fire
//!   prioritized, cancelable lifecycle events.
//! - Declared dependencies are started by a resolver connected at the
//!   earliest `OnStart` priority; cycles, missing dependencies and failed
//!   [constraints](ConstraintRegistry) abort the start and roll it back.
//! - Resources talk to each other through named custom events and
//!   declared exports.
//!
//! ```no_run
//! # async fn run() -> citadel_resource::Result<()> {
//! use std::sync::Arc;
//! use citadel_resource::{FileMounter, ResourceManager};
//!
//! let manager = ResourceManager::new();
//! manager.add_mounter(Arc::new(FileMounter::new()));
//!
//! manager.add_resource("file:///srv/resources#base").await?;
//! manager.add_resource("file:///srv/resources#app").await?;
//! manager.start_resource("app")?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod component;
pub mod config;
pub mod constraint;
pub mod dependency;
pub mod error;
pub mod events;
mod exports;
pub mod manager;
pub mod manifest;
pub mod mounter;
pub mod resource;

pub use component::ComponentRegistry;
pub use config::ManagerConfig;
pub use constraint::{ConstraintMatch, ConstraintPredicate, ConstraintRegistry, ConstraintValue};
pub use error::{Error, Result};
pub use events::{LifecycleNotifier, ResourceEvent};
pub use exports::ExportFn;
pub use manager::{RESOURCE_START_EVENT, RESOURCE_STOP_EVENT, ResourceCommand, ResourceManager};
pub use manifest::Manifest;
pub use mounter::{
    FileMounter, MemoryMounter, ResourceFactory, ResourceMounter, ResourceMounterExt, ResourceUri,
    SimpleMounter, SimpleMounterAdapter,
};
pub use resource::{Resource, ResourceState};

pub use citadel_eventbus::{Dispatch, EventArgs, EventContext, HandlerError, priority};
