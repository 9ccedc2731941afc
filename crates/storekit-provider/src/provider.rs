//! Provider descriptors.

use std::sync::Arc;

use storekit_core::ContextOptions;

use crate::container::ServiceContainer;
use crate::services::ProviderServices;

/// Describes one installable database provider.
///
/// Descriptors are stateless as far as selection is concerned: the selector
/// asks [`is_configured`](Self::is_configured) and
/// [`is_available`](Self::is_available) afresh on every attempt and only
/// builds the bundle of the provider it picks.
///
/// # Example
///
/// ```ignore
/// struct SqliteProvider {
///     services: Arc<ProviderServices>,
/// }
///
/// impl DatabaseProvider for SqliteProvider {
///     fn name(&self) -> &str {
///         "SQLite"
///     }
///
///     fn is_configured(&self, options: &ContextOptions) -> bool {
///         options.find_extension::<SqliteOptions>().is_some()
///             || options.names_provider(self.name())
///     }
///
///     fn provider_services(&self, _container: &ServiceContainer) -> Arc<ProviderServices> {
///         Arc::clone(&self.services)
///     }
/// }
/// ```
pub trait DatabaseProvider: Send + Sync {
    /// Unique, human-readable name used in diagnostics.
    fn name(&self) -> &str;

    /// Whether the caller's options select this provider.
    fn is_configured(&self, options: &ContextOptions) -> bool;

    /// Whether this provider can be used without being configured.
    ///
    /// Providers that cannot tell keep the default, which reports them as
    /// unavailable.
    fn is_available(&self) -> bool {
        false
    }

    /// The provider's service bundle.
    fn provider_services(&self, container: &ServiceContainer) -> Arc<ProviderServices>;
}
