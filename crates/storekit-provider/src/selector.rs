//! Provider selection.

use std::fmt;
use std::sync::Arc;

use storekit_core::{ContextOptions, ProviderError, Result, format_provider_names};

use crate::container::ServiceContainer;
use crate::provider::DatabaseProvider;
use crate::services::ProviderServices;

/// How the registered providers reached the selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceProviderSource {
    /// The caller registered providers directly.
    Explicit,
    /// Providers came from the ambient default registration.
    Implicit,
}

/// Picks exactly one provider from a registered set.
///
/// The selector borrows everything it looks at and owns nothing, so it is
/// cheap to create per unit of work.
pub struct ProviderSelector<'a> {
    options: &'a ContextOptions,
    container: &'a ServiceContainer,
    providers: Option<&'a [Arc<dyn DatabaseProvider>]>,
}

impl<'a> ProviderSelector<'a> {
    /// Create a selector. `providers` is `None` when nothing was registered
    /// at all, which is treated exactly like an empty slice.
    pub fn new(
        container: &'a ServiceContainer,
        options: &'a ContextOptions,
        providers: Option<&'a [Arc<dyn DatabaseProvider>]>,
    ) -> Self {
        Self {
            options,
            container,
            providers,
        }
    }

    /// Select a provider and return its service bundle.
    pub fn select_services(&self, source: ServiceProviderSource) -> Result<Arc<ProviderServices>> {
        let provider = self.select_provider(source)?;
        Ok(provider.provider_services(self.container))
    }

    /// Select a provider without building its bundle.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn select_provider(
        &self,
        source: ServiceProviderSource,
    ) -> Result<Arc<dyn DatabaseProvider>> {
        let providers = match self.providers {
            Some(providers) if !providers.is_empty() => providers,
            _ => {
                tracing::debug!("No database providers registered");
                return Err(match source {
                    ServiceProviderSource::Explicit => ProviderError::no_provider_services(),
                    ServiceProviderSource::Implicit => ProviderError::no_provider_configured(),
                }
                .into());
            }
        };

        let configured: Vec<&Arc<dyn DatabaseProvider>> = providers
            .iter()
            .filter(|provider| {
                let configured = provider.is_configured(self.options);
                tracing::debug!(provider = provider.name(), configured, "Checked provider");
                configured
            })
            .collect();

        match configured.as_slice() {
            [only] => {
                tracing::info!(provider = only.name(), "Selected configured database provider");
                return Ok(Arc::clone(only));
            }
            [] => {}
            many => {
                let names = provider_names(many);
                tracing::warn!(
                    providers = %format_provider_names(&names),
                    "Multiple database providers configured"
                );
                return Err(ProviderError::multiple_configured(names).into());
            }
        }

        let available: Vec<&Arc<dyn DatabaseProvider>> = providers
            .iter()
            .filter(|provider| {
                let available = provider.is_available();
                tracing::debug!(provider = provider.name(), available, "Checked provider");
                available
            })
            .collect();

        match (available.as_slice(), source) {
            ([only], ServiceProviderSource::Explicit) => {
                tracing::info!(provider = only.name(), "Selected available database provider");
                Ok(Arc::clone(only))
            }
            (many, _) if many.len() > 1 => {
                let names = provider_names(many);
                tracing::warn!(
                    providers = %format_provider_names(&names),
                    "Multiple database providers available"
                );
                Err(ProviderError::multiple_available(names).into())
            }
            _ => Err(ProviderError::no_provider_configured().into()),
        }
    }
}

fn provider_names(providers: &[&Arc<dyn DatabaseProvider>]) -> Vec<String> {
    providers.iter().map(|p| p.name().to_string()).collect()
}

impl fmt::Debug for ProviderSelector<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Option<Vec<&str>> = self
            .providers
            .map(|providers| providers.iter().map(|p| p.name()).collect());
        f.debug_struct("ProviderSelector")
            .field("providers", &names)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
