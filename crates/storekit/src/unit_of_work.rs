//! Unit of work: one selected provider plus one connection.
//!
//! A [`UnitOfWork`] is assembled explicitly. The builder collects the
//! context options, the service container and the registered providers, runs
//! provider selection once, and asks the chosen bundle's connection factory
//! for a connection. Nothing is resolved from ambient state afterwards.
//!
//! # Example
//!
//! ```rust,ignore
//! use storekit::prelude::*;
//!
//! let mut uow = UnitOfWork::builder()
//!     .options(ContextOptions::new().with_provider("SQLite"))
//!     .providers(registered_providers())
//!     .build()?;
//!
//! let tx = uow.connection_mut().begin_transaction()?;
//! tx.commit()?;
//! uow.close()?;
//! ```

use std::sync::Arc;

use asupersync::{Cx, Outcome};
use storekit_core::{ContextOptions, Error, Result};
use storekit_identity::{BoxedValue, PropertyKey, downcast_value};
use storekit_provider::{
    DatabaseProvider, ProviderSelector, ProviderServices, ServiceContainer, ServiceProviderSource,
};
use storekit_relational::{AnyDbConnection, RelationalConnection};

/// One logical session against the selected provider.
pub struct UnitOfWork {
    services: Arc<ProviderServices>,
    connection: RelationalConnection<AnyDbConnection>,
}

impl UnitOfWork {
    /// Assemble a unit of work from an already selected bundle and a
    /// connection it produced.
    pub fn new(
        services: Arc<ProviderServices>,
        connection: RelationalConnection<AnyDbConnection>,
    ) -> Self {
        Self {
            services,
            connection,
        }
    }

    /// Create a unit of work builder.
    #[must_use]
    pub fn builder() -> UnitOfWorkBuilder {
        UnitOfWorkBuilder::new()
    }

    /// The selected provider's service bundle.
    pub fn services(&self) -> &Arc<ProviderServices> {
        &self.services
    }

    pub fn provider_name(&self) -> &str {
        self.services.provider_name()
    }

    pub fn connection(&self) -> &RelationalConnection<AnyDbConnection> {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut RelationalConnection<AnyDbConnection> {
        &mut self.connection
    }

    /// Consume the unit of work and keep only its connection.
    pub fn into_connection(self) -> RelationalConnection<AnyDbConnection> {
        self.connection
    }

    /// Generate the next value for a key property.
    ///
    /// The generator comes from the bundle's value generator selector, so
    /// stateful generators (hi-lo blocks) are shared with every other unit of
    /// work on the same provider.
    pub async fn next_identity(&self, cx: &Cx, key: &PropertyKey) -> Outcome<BoxedValue, Error> {
        let generator = match self.services.value_generator_selector().select(key) {
            Ok(generator) => generator,
            Err(e) => return Outcome::Err(e),
        };
        tracing::trace!(
            property = %key,
            value_type = generator.value_type_name(),
            "Generating key value"
        );
        generator.next_value_async(cx).await
    }

    /// Generate the next value for a key property as a concrete type.
    pub async fn next_identity_as<T: 'static>(
        &self,
        cx: &Cx,
        key: &PropertyKey,
    ) -> Outcome<T, Error> {
        match self.next_identity(cx, key).await {
            Outcome::Ok(value) => match downcast_value::<T>(value) {
                Ok(value) => Outcome::Ok(value),
                Err(e) => Outcome::Err(e),
            },
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Close the connection. Any active transaction is abandoned to the
    /// server.
    pub fn close(&mut self) -> Result<()> {
        self.connection.close()
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("provider", &self.services.provider_name())
            .field("connection", &self.connection)
            .finish()
    }
}

/// Builder for [`UnitOfWork`].
///
/// Defaults: empty options, empty container, no providers registered and an
/// explicit source.
pub struct UnitOfWorkBuilder {
    options: ContextOptions,
    container: ServiceContainer,
    providers: Option<Vec<Arc<dyn DatabaseProvider>>>,
    source: ServiceProviderSource,
}

impl UnitOfWorkBuilder {
    /// Create a new unit of work builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            options: ContextOptions::new(),
            container: ServiceContainer::new(),
            providers: None,
            source: ServiceProviderSource::Explicit,
        }
    }

    #[must_use]
    pub fn options(mut self, options: ContextOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn container(mut self, container: ServiceContainer) -> Self {
        self.container = container;
        self
    }

    /// Register the provider set, replacing any registered before.
    #[must_use]
    pub fn providers(mut self, providers: Vec<Arc<dyn DatabaseProvider>>) -> Self {
        self.providers = Some(providers);
        self
    }

    /// Register one more provider.
    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn DatabaseProvider>) -> Self {
        self.providers.get_or_insert_with(Vec::new).push(provider);
        self
    }

    /// How the providers were registered. Defaults to explicit.
    #[must_use]
    pub fn source(mut self, source: ServiceProviderSource) -> Self {
        self.source = source;
        self
    }

    /// Select the provider and create the connection.
    ///
    /// The connection is returned closed; it opens on first use.
    #[tracing::instrument(level = "debug", skip(self), fields(source = ?self.source))]
    pub fn build(self) -> Result<UnitOfWork> {
        let selector =
            ProviderSelector::new(&self.container, &self.options, self.providers.as_deref());
        let services = selector.select_services(self.source)?;
        let connection = services
            .connection_factory()
            .create_connection(&self.options)?;

        tracing::info!(
            provider = services.provider_name(),
            command_timeout = ?connection.command_timeout(),
            "Unit of work ready"
        );
        Ok(UnitOfWork::new(services, connection))
    }
}

impl Default for UnitOfWorkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UnitOfWorkBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let providers: Option<Vec<&str>> = self
            .providers
            .as_ref()
            .map(|providers| providers.iter().map(|p| p.name()).collect());
        f.debug_struct("UnitOfWorkBuilder")
            .field("options", &self.options)
            .field("container", &self.container)
            .field("providers", &providers)
            .field("source", &self.source)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storekit_core::ProviderErrorKind;

    #[test]
    fn test_builder_defaults() {
        let builder = UnitOfWork::builder();
        assert_eq!(builder.source, ServiceProviderSource::Explicit);
        assert!(builder.providers.is_none());
    }

    #[test]
    fn test_build_without_providers() {
        let err = UnitOfWork::builder().build().unwrap_err();
        assert_eq!(err.provider_kind(), Some(ProviderErrorKind::NoProviderServices));

        let err = UnitOfWork::builder()
            .source(ServiceProviderSource::Implicit)
            .build()
            .unwrap_err();
        assert_eq!(err.provider_kind(), Some(ProviderErrorKind::NoProviderConfigured));
    }

    #[test]
    fn test_empty_provider_list_matches_none() {
        let err = UnitOfWork::builder()
            .providers(Vec::new())
            .build()
            .unwrap_err();
        assert_eq!(err.provider_kind(), Some(ProviderErrorKind::NoProviderServices));
    }
}
