use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use super::{ResourceFactory, ResourceMounter, ResourceUri};
use crate::error::{Error, Result};
use crate::manifest::Manifest;
use crate::resource::Resource;

/// Manifest file name inside a resource directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// A resource name must stay inside the mount directory: exactly one plain
/// path component, no root, no `..`.
fn is_single_segment(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(segment)), None) if segment == name
    )
}

/// Mounts resources from directories on the local filesystem.
///
/// `file:///srv/resources#chat` loads `/srv/resources/chat/manifest.json`;
/// without a fragment, `file:///srv/resources/chat` loads
/// `/srv/resources/chat/manifest.json` and names the resource `chat`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileMounter;

impl FileMounter {
    /// Create a file mounter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn resource_root(uri: &ResourceUri) -> Result<(String, PathBuf)> {
        let dir = uri.url().to_file_path().map_err(|()| Error::InvalidUri {
            uri: uri.as_str().to_owned(),
            reason: "not a local file path".to_owned(),
        })?;
        let name = uri.resource_name().ok_or_else(|| Error::InvalidUri {
            uri: uri.as_str().to_owned(),
            reason: "no resource name in path or fragment".to_owned(),
        })?;
        if !is_single_segment(name) {
            return Err(Error::InvalidUri {
                uri: uri.as_str().to_owned(),
                reason: format!("resource name '{name}' must be a single directory name"),
            });
        }

        let root = match uri.fragment() {
            Some(fragment) => dir.join(fragment),
            None => dir,
        };
        Ok((name.to_owned(), root))
    }

    async fn read_manifest(uri: &ResourceUri, root: &Path) -> Result<Manifest> {
        let path = root.join(MANIFEST_FILE);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::MounterFailed {
                uri: uri.as_str().to_owned(),
                reason: format!("cannot read {}", path.display()),
                source: Some(Box::new(e)),
            })?;

        Manifest::from_json(&raw).map_err(|e| Error::MounterFailed {
            uri: uri.as_str().to_owned(),
            reason: format!("malformed {}", path.display()),
            source: Some(Box::new(e)),
        })
    }
}

#[async_trait]
impl ResourceMounter for FileMounter {
    fn handles_scheme(&self, scheme: &str) -> bool {
        scheme == "file"
    }

    async fn load_resource(&self, factory: &ResourceFactory, uri: &ResourceUri) -> Result<Arc<Resource>> {
        let (name, root) = Self::resource_root(uri)?;
        let manifest = Self::read_manifest(uri, &root).await?;

        tracing::debug!(resource = %name, root = %root.display(), "mounting resource from disk");
        let resource = factory.create(name);
        resource.load_from(root.to_string_lossy(), manifest)?;
        Ok(resource)
    }
}
