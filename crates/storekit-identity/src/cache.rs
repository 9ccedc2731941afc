//! Per-property generator cache.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use storekit_core::Result;

use crate::generator::ErasedIdentityGenerator;

/// Identifies a generated key property: the entity type name plus the
/// property name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyKey {
    entity: String,
    property: String,
}

impl PropertyKey {
    pub fn new(entity: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            property: property.into(),
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn property(&self) -> &str {
        &self.property
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.entity, self.property)
    }
}

/// Memoizes one generator per property.
///
/// Generators such as hi-lo keep state (the current block) that must be
/// shared by every unit of work using the same provider, so the cache lives
/// in the provider's service bundle rather than in a unit of work.
#[derive(Default)]
pub struct ValueGeneratorCache {
    generators: RwLock<HashMap<PropertyKey, Arc<dyn ErasedIdentityGenerator>>>,
}

impl ValueGeneratorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached generator for `key`, if any.
    pub fn get(&self, key: &PropertyKey) -> Option<Arc<dyn ErasedIdentityGenerator>> {
        self.generators
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Return the cached generator for `key`, creating it with `factory` on
    /// first use.
    ///
    /// The factory runs without the cache lock held, so it may look up other
    /// keys in this cache or reserve a key block. Callers racing on the same
    /// missing key may each run the factory; the first insert wins and the
    /// others get that instance. If the factory fails nothing is cached.
    pub fn get_or_add<F>(
        &self,
        key: &PropertyKey,
        factory: F,
    ) -> Result<Arc<dyn ErasedIdentityGenerator>>
    where
        F: FnOnce(&PropertyKey) -> Result<Arc<dyn ErasedIdentityGenerator>>,
    {
        if let Some(existing) = self.get(key) {
            return Ok(existing);
        }

        let generator = factory(key)?;
        let mut generators = self
            .generators
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match generators.entry(key.clone()) {
            Entry::Occupied(existing) => Ok(Arc::clone(existing.get())),
            Entry::Vacant(slot) => {
                tracing::debug!(
                    property = %key,
                    value_type = generator.value_type_name(),
                    "Caching value generator"
                );
                Ok(Arc::clone(slot.insert(generator)))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.generators
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached generator.
    pub fn clear(&self) {
        self.generators
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl fmt::Debug for ValueGeneratorCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueGeneratorCache")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::temporary::TemporaryIdentityGenerator;
    use storekit_core::{Error, GenerationError, GenerationErrorKind};

    fn temporary(_: &PropertyKey) -> Result<Arc<dyn ErasedIdentityGenerator>> {
        Ok(Arc::new(TemporaryIdentityGenerator::<i64>::new()))
    }

    #[test]
    fn test_same_key_same_instance() {
        let cache = ValueGeneratorCache::new();
        let key = PropertyKey::new("Hero", "id");

        let first = cache.get_or_add(&key, temporary).unwrap();
        let second = cache
            .get_or_add(&key, |_| panic!("factory must not run twice"))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_keys() {
        let cache = ValueGeneratorCache::new();
        let hero = cache
            .get_or_add(&PropertyKey::new("Hero", "id"), temporary)
            .unwrap();
        let team = cache
            .get_or_add(&PropertyKey::new("Team", "id"), temporary)
            .unwrap();
        assert!(!Arc::ptr_eq(&hero, &team));
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_failed_factory_caches_nothing() {
        let cache = ValueGeneratorCache::new();
        let key = PropertyKey::new("Hero", "id");
        let result = cache.get_or_add(&key, |k| {
            Err(Error::Generation(GenerationError::new(
                GenerationErrorKind::Source,
                format!("no sequence for {k}"),
            )))
        });
        assert!(result.is_err());
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn test_factory_may_use_the_cache() {
        let cache = ValueGeneratorCache::new();
        let shared = PropertyKey::new("Shared", "seq");
        let order = PropertyKey::new("Order", "id");

        let generator = cache
            .get_or_add(&order, |_| cache.get_or_add(&shared, temporary))
            .unwrap();
        let sequence = cache.get(&shared).expect("nested key cached");
        assert!(Arc::ptr_eq(&generator, &sequence));
        assert!(Arc::ptr_eq(&cache.get(&order).unwrap(), &sequence));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_first_insert_wins() {
        let cache = ValueGeneratorCache::new();
        let key = PropertyKey::new("Hero", "id");

        let mut first = None;
        let winner = cache
            .get_or_add(&key, |k| {
                // A concurrent caller fills the key while this factory runs.
                first = Some(cache.get_or_add(k, temporary)?);
                temporary(k)
            })
            .unwrap();
        assert!(Arc::ptr_eq(&winner, &first.unwrap()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_property_key_display() {
        assert_eq!(PropertyKey::new("Hero", "id").to_string(), "Hero.id");
    }
}
