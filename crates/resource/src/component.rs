//! Typed side-table for collaborator state attached to a resource or manager.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

type AnyComponent = Arc<dyn Any + Send + Sync>;

/// Heterogeneous map keyed by component type.
///
/// At most one component of each type is stored. Components are owned by the
/// registry and dropped with it; lookups hand out shared `Arc` clones, so
/// components that need mutation carry their own interior mutability.
#[derive(Default)]
pub struct ComponentRegistry {
    components: RwLock<HashMap<TypeId, AnyComponent>>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `component`, returning the previous component of the same type.
    pub fn set<T: Any + Send + Sync>(&self, component: T) -> Option<Arc<T>> {
        self.set_arc(Arc::new(component))
    }

    /// Attach an already shared component.
    pub fn set_arc<T: Any + Send + Sync>(&self, component: Arc<T>) -> Option<Arc<T>> {
        self.components
            .write()
            .insert(TypeId::of::<T>(), component)
            .and_then(|previous| previous.downcast::<T>().ok())
    }

    /// Look up the component of type `T`.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let component = self.components.read().get(&TypeId::of::<T>()).cloned()?;
        component.downcast::<T>().ok()
    }

    /// Look up the component of type `T`, attaching `init()` first if absent.
    pub fn get_or_insert_with<T, F>(&self, init: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        if let Some(existing) = self.get::<T>() {
            return existing;
        }

        // `init` runs under the write lock and must not touch this registry.
        let mut components = self.components.write();
        if let Some(raced) = components
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|component| component.downcast::<T>().ok())
        {
            return raced;
        }
        let component = Arc::new(init());
        components.insert(TypeId::of::<T>(), Arc::clone(&component) as AnyComponent);
        component
    }

    /// Whether a component of type `T` is attached.
    #[must_use]
    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.components.read().contains_key(&TypeId::of::<T>())
    }

    /// Detach and return the component of type `T`.
    pub fn remove<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.components
            .write()
            .remove(&TypeId::of::<T>())
            .and_then(|component| component.downcast::<T>().ok())
    }

    /// Number of attached components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.read().len()
    }

    /// Whether no components are attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.read().is_empty()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    struct UiPage(String);

    #[derive(Default)]
    struct Timers {
        ticks: AtomicU32,
    }

    #[test]
    fn components_are_keyed_by_type() {
        let registry = ComponentRegistry::new();
        assert!(registry.set(UiPage("index.html".into())).is_none());
        registry.set(Timers::default());

        assert_eq!(registry.len(), 2);
        assert_eq!(*registry.get::<UiPage>().unwrap(), UiPage("index.html".into()));
        assert!(registry.get::<String>().is_none());
    }

    #[test]
    fn set_returns_previous() {
        let registry = ComponentRegistry::new();
        registry.set(UiPage("a".into()));
        let previous = registry.set(UiPage("b".into())).unwrap();
        assert_eq!(previous.0, "a");
        assert_eq!(registry.get::<UiPage>().unwrap().0, "b");
    }

    #[test]
    fn get_or_insert_initializes_once() {
        let registry = ComponentRegistry::new();
        let timers = registry.get_or_insert_with(Timers::default);
        timers.ticks.fetch_add(1, Ordering::SeqCst);

        let again = registry.get_or_insert_with::<Timers, _>(|| panic!("must not re-initialize"));
        assert_eq!(again.ticks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_detaches() {
        let registry = ComponentRegistry::new();
        registry.set(UiPage("x".into()));
        assert!(registry.contains::<UiPage>());
        assert!(registry.remove::<UiPage>().is_some());
        assert!(!registry.contains::<UiPage>());
        assert!(registry.is_empty());
    }
}
