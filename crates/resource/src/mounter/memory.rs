use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{ResourceFactory, ResourceMounter, ResourceUri};
use crate::error::{Error, Result};
use crate::manifest::Manifest;
use crate::resource::Resource;

/// Mounts resources from manifests held in memory.
///
/// `mem:chat` (or `mem:#chat`) resolves to the manifest inserted under
/// `chat`. Useful for bootstrapping built-in resources and in tests.
#[derive(Debug)]
pub struct MemoryMounter {
    scheme: String,
    manifests: RwLock<HashMap<String, Manifest>>,
}

impl MemoryMounter {
    /// Create a mounter for the `mem` scheme.
    #[must_use]
    pub fn new() -> Self {
        Self::with_scheme("mem")
    }

    /// Create a mounter for a custom scheme.
    pub fn with_scheme(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into().to_ascii_lowercase(),
            manifests: RwLock::new(HashMap::new()),
        }
    }

    /// Make `manifest` resolvable under `name`, replacing any previous one.
    pub fn insert(&self, name: impl Into<String>, manifest: Manifest) -> &Self {
        self.manifests.write().insert(name.into(), manifest);
        self
    }

    /// The URI that resolves to `name` through this mounter.
    #[must_use]
    pub fn uri_for(&self, name: &str) -> String {
        format!("{}:{name}", self.scheme)
    }
}

impl Default for MemoryMounter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceMounter for MemoryMounter {
    fn handles_scheme(&self, scheme: &str) -> bool {
        self.scheme == scheme
    }

    async fn load_resource(&self, factory: &ResourceFactory, uri: &ResourceUri) -> Result<Arc<Resource>> {
        let name = uri
            .resource_name()
            .ok_or_else(|| Error::mounter_failed(uri.as_str(), "no resource name"))?;
        let manifest = self
            .manifests
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::mounter_failed(uri.as_str(), format!("no manifest for '{name}'")))?;

        let resource = factory.create(name);
        resource.load_from(uri.as_str(), manifest)?;
        Ok(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_inserted_manifests() {
        let mounter = MemoryMounter::new();
        mounter.insert("chat", Manifest::parse([("export", "say")]));

        let uri = ResourceUri::parse(&mounter.uri_for("chat")).unwrap();
        let resource = mounter.load_resource(&ResourceFactory::new(), &uri).await.unwrap();
        assert_eq!(resource.name(), "chat");
        assert!(resource.manifest().declares_export("say"));
    }

    #[tokio::test]
    async fn unknown_name_fails() {
        let mounter = MemoryMounter::with_scheme("Builtin");
        assert!(mounter.handles_scheme("builtin"));

        let uri = ResourceUri::parse("builtin:ghost").unwrap();
        let err = mounter.load_resource(&ResourceFactory::new(), &uri).await.unwrap_err();
        assert!(matches!(err, Error::MounterFailed { .. }));
    }
}
