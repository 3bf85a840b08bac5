//! Callable exports: functions a resource makes available to others.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use citadel_eventbus::HandlerError;
use parking_lot::RwLock;

/// An export implementation: opaque argument bytes in, result bytes out.
pub type ExportFn = Arc<dyn Fn(&Bytes) -> Result<Bytes, HandlerError> + Send + Sync>;

/// Export implementations keyed by resource, then export name.
#[derive(Default)]
pub(crate) struct ExportRegistry {
    exports: RwLock<HashMap<String, HashMap<String, ExportFn>>>,
}

impl ExportRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if an earlier implementation was replaced.
    pub(crate) fn insert(&self, resource: &str, export: &str, function: ExportFn) -> bool {
        self.exports
            .write()
            .entry(resource.to_owned())
            .or_default()
            .insert(export.to_owned(), function)
            .is_some()
    }

    pub(crate) fn get(&self, resource: &str, export: &str) -> Option<ExportFn> {
        self.exports.read().get(resource)?.get(export).cloned()
    }

    /// Drop every export of `resource`, returning how many were removed.
    pub(crate) fn clear_resource(&self, resource: &str) -> usize {
        self.exports
            .write()
            .remove(resource)
            .map_or(0, |exports| exports.len())
    }

    pub(crate) fn count(&self, resource: &str) -> usize {
        self.exports.read().get(resource).map_or(0, HashMap::len)
    }
}

impl fmt::Debug for ExportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportRegistry")
            .field("resources", &self.exports.read().len())
            .finish()
    }
}
