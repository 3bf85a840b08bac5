//! URI-scheme resolvers that turn a URI into a loaded [`Resource`].
//!
//! A mounter receives a [`ResourceFactory`] so that every resource it builds
//! goes through the manager's initialization hooks before `load_from`.

mod file;
mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use citadel_eventbus::Event;
use url::Url;

use crate::error::{Error, Result};
use crate::resource::Resource;

pub use file::{FileMounter, MANIFEST_FILE};
pub use memory::MemoryMounter;

/// Message used when a [`SimpleMounter`] yields no resource.
pub const NULL_RESOURCE_MESSAGE: &str = "Null resource return value";

/// A parsed resource URI: `scheme:path[#name]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceUri {
    url: Url,
}

impl ResourceUri {
    /// Parse a URI string.
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).map_err(|e| Error::InvalidUri {
            uri: raw.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(Self { url })
    }

    /// The URI scheme, lowercase.
    #[must_use]
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// The path component.
    #[must_use]
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// The fragment, if present and non-empty.
    #[must_use]
    pub fn fragment(&self) -> Option<&str> {
        self.url.fragment().filter(|f| !f.is_empty())
    }

    /// Resource name: the fragment, or else the last non-empty path segment.
    #[must_use]
    pub fn resource_name(&self) -> Option<&str> {
        self.fragment().or_else(|| {
            self.url
                .path()
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .filter(|segment| !segment.is_empty())
        })
    }

    /// The underlying URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The URI as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl fmt::Display for ResourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Constructs resources and fires `OnInitializeInstance` for each of them.
#[derive(Clone)]
pub struct ResourceFactory {
    on_initialize: Arc<Event<Resource>>,
}

impl ResourceFactory {
    /// Create a factory with no initialization hooks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            on_initialize: Arc::new(Event::new("OnInitializeInstance")),
        }
    }

    /// Hooks run once per constructed resource, before it is loaded.
    #[must_use]
    pub fn on_initialize_instance(&self) -> &Event<Resource> {
        &self.on_initialize
    }

    /// Construct an `Uninitialized` resource and run the initialization hooks.
    pub fn create(&self, name: impl Into<String>) -> Arc<Resource> {
        let resource = Arc::new(Resource::new(name));
        let dispatch = self.on_initialize.trigger(&resource);
        if dispatch.is_canceled() {
            tracing::warn!(
                resource = %resource.name(),
                "OnInitializeInstance cannot be canceled; ignoring"
            );
        }
        resource
    }
}

impl Default for ResourceFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResourceFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceFactory")
            .field("hooks", &self.on_initialize.handler_count())
            .finish()
    }
}

/// Resolves URIs of the schemes it handles into loaded resources.
#[async_trait]
pub trait ResourceMounter: Send + Sync {
    /// Whether this mounter resolves URIs with `scheme`.
    fn handles_scheme(&self, scheme: &str) -> bool;

    /// Construct and load the resource at `uri`.
    ///
    /// The returned resource is `Stopped`; it is never started here.
    async fn load_resource(&self, factory: &ResourceFactory, uri: &ResourceUri) -> Result<Arc<Resource>>;
}

/// Legacy nullable form of [`ResourceMounter::load_resource`].
#[async_trait]
pub trait ResourceMounterExt: ResourceMounter {
    /// Load the resource, mapping any error to `None` (the error is logged).
    async fn load_resource_or_none(&self, factory: &ResourceFactory, uri: &ResourceUri) -> Option<Arc<Resource>> {
        match self.load_resource(factory, uri).await {
            Ok(resource) => Some(resource),
            Err(e) => {
                tracing::warn!(uri = %uri, kind = e.kind(), error = %e, "mounter failed");
                None
            }
        }
    }
}

impl<T: ResourceMounter + ?Sized> ResourceMounterExt for T {}

/// A mounter that only reports success or nothing.
///
/// Wrap it in [`SimpleMounterAdapter`] to use it where a
/// [`ResourceMounter`] is expected.
#[async_trait]
pub trait SimpleMounter: Send + Sync {
    /// Whether this mounter resolves URIs with `scheme`.
    fn handles_scheme(&self, scheme: &str) -> bool;

    /// Construct and load the resource at `uri`, or `None` on failure.
    async fn load(&self, factory: &ResourceFactory, uri: &ResourceUri) -> Option<Arc<Resource>>;
}

/// Adapts a [`SimpleMounter`] to [`ResourceMounter`].
///
/// A `None` result becomes [`Error::MounterFailed`] with
/// [`NULL_RESOURCE_MESSAGE`].
#[derive(Debug, Clone)]
pub struct SimpleMounterAdapter<M> {
    inner: M,
}

impl<M> SimpleMounterAdapter<M> {
    /// Wrap `inner`.
    pub fn new(inner: M) -> Self {
        Self { inner }
    }

    /// The wrapped mounter.
    pub fn inner(&self) -> &M {
        &self.inner
    }
}

#[async_trait]
impl<M: SimpleMounter> ResourceMounter for SimpleMounterAdapter<M> {
    fn handles_scheme(&self, scheme: &str) -> bool {
        self.inner.handles_scheme(scheme)
    }

    async fn load_resource(&self, factory: &ResourceFactory, uri: &ResourceUri) -> Result<Arc<Resource>> {
        self.inner
            .load(factory, uri)
            .await
            .ok_or_else(|| Error::mounter_failed(uri.as_str(), NULL_RESOURCE_MESSAGE))
    }
}
