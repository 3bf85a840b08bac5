//! Reload logic for runtime filter changes

use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, Registry, layer::Layer};

use crate::error::{LogError, LogResult};

/// Handle for changing the log filter of a running logger
#[derive(Clone)]
pub struct ReloadHandle {
    filter: tracing_subscriber::reload::Handle<EnvFilter, Registry>,
    current_filter: Arc<ArcSwap<String>>,
}

impl ReloadHandle {
    /// Replace the active filter directive
    pub fn reload(&self, filter: &str) -> LogResult<()> {
        let new_filter =
            EnvFilter::try_new(filter).map_err(|e| LogError::Filter(format!("{filter}: {e}")))?;
        self.filter
            .reload(new_filter)
            .map_err(|e| LogError::Config(format!("Failed to reload filter: {e}")))?;
        self.current_filter.store(Arc::new(filter.to_string()));
        Ok(())
    }

    /// The active filter directive
    #[must_use]
    pub fn current_filter(&self) -> Arc<String> {
        self.current_filter.load_full()
    }
}

impl std::fmt::Debug for ReloadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadHandle")
            .field("current_filter", &self.current_filter())
            .finish()
    }
}

/// Boxed filter layer installed below the formatting layer.
pub(super) type FilterLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Create a filter layer, wrapped in a reloadable layer when requested
pub(super) fn create_filter_layer(
    filter: EnvFilter,
    level: &str,
    reloadable: bool,
) -> (FilterLayer, Option<ReloadHandle>) {
    if reloadable {
        let (layer, handle) = tracing_subscriber::reload::Layer::new(filter);
        let reload_handle = ReloadHandle {
            filter: handle,
            current_filter: Arc::new(ArcSwap::from_pointee(level.to_string())),
        };
        (Box::new(layer), Some(reload_handle))
    } else {
        (Box::new(filter), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_updates_current_filter() {
        let (_layer, handle) = create_filter_layer(EnvFilter::new("info"), "info", true);
        let handle = handle.unwrap();

        handle.reload("debug,citadel_resource=trace").unwrap();
        assert_eq!(*handle.current_filter(), "debug,citadel_resource=trace");
    }

    #[test]
    fn invalid_reload_keeps_previous_filter() {
        let (_layer, handle) = create_filter_layer(EnvFilter::new("info"), "info", true);
        let handle = handle.unwrap();

        let err = handle.reload("citadel=loud").unwrap_err();
        assert!(matches!(err, LogError::Filter(_)));
        assert_eq!(*handle.current_filter(), "info");
    }

    #[test]
    fn static_filter_has_no_handle() {
        let (_layer, handle) = create_filter_layer(EnvFilter::new("warn"), "warn", false);
        assert!(handle.is_none());
    }
}
