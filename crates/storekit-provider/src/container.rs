//! Composition-time service container.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Shared singletons handed to [`DatabaseProvider::provider_services`].
///
/// One value per type. The caller fills the container while composing the
/// application; providers read from it when they build their bundle.
/// Nothing resolves services from it later.
///
/// [`DatabaseProvider::provider_services`]: crate::DatabaseProvider::provider_services
#[derive(Default, Clone)]
pub struct ServiceContainer {
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ServiceContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a value, replacing any earlier value of the same type.
    pub fn with<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.insert(Arc::new(value));
        self
    }

    /// Register a shared value, replacing any earlier value of the same type.
    pub fn insert<T: Any + Send + Sync>(&mut self, value: Arc<T>) {
        self.services.insert(TypeId::of::<T>(), value);
    }

    /// The registered value of type `T`, if any.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let value = Arc::clone(self.services.get(&TypeId::of::<T>())?);
        value.downcast::<T>().ok()
    }

    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContainer")
            .field("len", &self.services.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Clock(u64);

    #[test]
    fn test_get_by_type() {
        let container = ServiceContainer::new().with(Clock(42)).with("name");
        assert_eq!(container.get::<Clock>().as_deref(), Some(&Clock(42)));
        assert_eq!(container.get::<&str>().as_deref(), Some(&"name"));
        assert!(container.get::<u32>().is_none());
        assert_eq!(container.len(), 2);
    }

    #[test]
    fn test_insert_replaces_and_shares() {
        let shared = Arc::new(Clock(1));
        let mut container = ServiceContainer::new().with(Clock(0));
        container.insert(Arc::clone(&shared));

        let got = container.get::<Clock>().unwrap();
        assert!(Arc::ptr_eq(&got, &shared));
        assert!(container.contains::<Clock>());
        assert_eq!(container.len(), 1);
    }
}
