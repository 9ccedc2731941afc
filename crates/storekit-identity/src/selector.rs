//! Choosing a generator for a property.

use std::fmt;
use std::sync::Arc;

use storekit_core::Result;

use crate::cache::{PropertyKey, ValueGeneratorCache};
use crate::generator::ErasedIdentityGenerator;

/// Maps a generated key property to the generator that fills it.
///
/// Every provider bundle carries one. Implementations decide per property,
/// e.g. a sequence-backed hi-lo generator for integer keys and a temporary
/// generator for everything the database fills in on insert.
pub trait ValueGeneratorSelector: Send + Sync {
    fn select(&self, key: &PropertyKey) -> Result<Arc<dyn ErasedIdentityGenerator>>;
}

/// A [`ValueGeneratorSelector`] that builds generators with a factory and
/// memoizes them in a [`ValueGeneratorCache`].
pub struct CachingValueGeneratorSelector<F> {
    cache: Arc<ValueGeneratorCache>,
    factory: F,
}

impl<F> CachingValueGeneratorSelector<F>
where
    F: Fn(&PropertyKey) -> Result<Arc<dyn ErasedIdentityGenerator>> + Send + Sync,
{
    pub fn new(cache: Arc<ValueGeneratorCache>, factory: F) -> Self {
        Self { cache, factory }
    }

    pub fn cache(&self) -> &Arc<ValueGeneratorCache> {
        &self.cache
    }
}

impl<F> ValueGeneratorSelector for CachingValueGeneratorSelector<F>
where
    F: Fn(&PropertyKey) -> Result<Arc<dyn ErasedIdentityGenerator>> + Send + Sync,
{
    fn select(&self, key: &PropertyKey) -> Result<Arc<dyn ErasedIdentityGenerator>> {
        self.cache.get_or_add(key, |key| (self.factory)(key))
    }
}

impl<F> fmt::Debug for CachingValueGeneratorSelector<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingValueGeneratorSelector")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
