//! Provider service bundles.
//!
//! A [`ProviderServices`] bundle is everything a unit of work needs from one
//! provider. The collaborators are traits; this crate only fixes the shape of
//! the bundle and the connection-facing contracts. Model building, query
//! compilation and change tracking live behind these traits in the engine
//! that consumes the bundle.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use storekit_core::{ConfigError, ContextOptions, Result};
use storekit_identity::{
    CachingValueGeneratorSelector, ErasedIdentityGenerator, PropertyKey,
    TemporaryIdentityGenerator, ValueGeneratorCache, ValueGeneratorSelector,
};
use storekit_relational::{AnyDbConnection, Command, RelationalConnection};

/// Runs data operations against the provider's database.
pub trait Database: Send + Sync {
    /// Execute commands in order on `connection`, returning the total number
    /// of affected rows. Stops at the first failure.
    fn execute_batch(
        &self,
        connection: &mut RelationalConnection<AnyDbConnection>,
        commands: &[Command],
    ) -> Result<u64> {
        let mut affected = 0;
        for command in commands {
            affected += connection.execute(command)?;
        }
        Ok(affected)
    }
}

/// Creates and drops the physical database.
pub trait DatabaseCreator: Send + Sync {
    /// Create the database if it does not exist. Returns whether it was
    /// created.
    fn ensure_created(&self, connection: &mut RelationalConnection<AnyDbConnection>)
    -> Result<bool>;

    /// Drop the database if it exists. Returns whether it was dropped.
    fn ensure_deleted(&self, connection: &mut RelationalConnection<AnyDbConnection>)
    -> Result<bool>;
}

/// Produces connections for a unit of work.
pub trait ConnectionFactory: Send + Sync {
    /// Create a closed connection configured from `options`.
    fn create_connection(
        &self,
        options: &ContextOptions,
    ) -> Result<RelationalConnection<AnyDbConnection>>;
}

/// Named model-building conventions, in the order they apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConventionSet {
    conventions: Vec<String>,
}

impl ConventionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a convention. Adding a name twice keeps the first position.
    pub fn add(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.contains(&name) {
            self.conventions.push(name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.conventions.iter().any(|c| c == name)
    }

    pub fn names(&self) -> &[String] {
        &self.conventions
    }
}

/// Contributes the provider's model-building conventions.
pub trait ConventionSetBuilder: Send + Sync {
    fn add_conventions(&self, conventions: &mut ConventionSet);
}

/// Supplies the model for a context. The model itself belongs to the engine
/// and is opaque here.
pub trait ModelSource: Send + Sync {
    fn model(&self, conventions: &ConventionSet) -> Result<Arc<dyn Any + Send + Sync>>;
}

/// Checks a model against the provider's restrictions.
pub trait ModelValidator: Send + Sync {
    fn validate(&self, model: &(dyn Any + Send + Sync)) -> Result<()>;
}

/// Creates the per-query state the engine threads through query execution.
pub trait QueryContextFactory: Send + Sync {
    fn create_query_context(&self) -> Box<dyn Any + Send>;
}

/// The services one provider supplies.
///
/// Built once per provider and shared (`Arc<ProviderServices>`) by every
/// unit of work that selects it; the bundle holds no per-call state.
pub struct ProviderServices {
    provider_name: String,
    database: Arc<dyn Database>,
    creator: Arc<dyn DatabaseCreator>,
    connection_factory: Arc<dyn ConnectionFactory>,
    value_generator_selector: Arc<dyn ValueGeneratorSelector>,
    value_generator_cache: Arc<ValueGeneratorCache>,
    convention_set_builder: Arc<dyn ConventionSetBuilder>,
    model_source: Arc<dyn ModelSource>,
    model_validator: Arc<dyn ModelValidator>,
    query_context_factory: Arc<dyn QueryContextFactory>,
}

impl ProviderServices {
    pub fn builder(provider_name: impl Into<String>) -> ProviderServicesBuilder {
        ProviderServicesBuilder::new(provider_name)
    }

    /// Name of the provider that supplied this bundle.
    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub fn database(&self) -> &Arc<dyn Database> {
        &self.database
    }

    pub fn creator(&self) -> &Arc<dyn DatabaseCreator> {
        &self.creator
    }

    pub fn connection_factory(&self) -> &Arc<dyn ConnectionFactory> {
        &self.connection_factory
    }

    pub fn value_generator_selector(&self) -> &Arc<dyn ValueGeneratorSelector> {
        &self.value_generator_selector
    }

    pub fn value_generator_cache(&self) -> &Arc<ValueGeneratorCache> {
        &self.value_generator_cache
    }

    pub fn convention_set_builder(&self) -> &Arc<dyn ConventionSetBuilder> {
        &self.convention_set_builder
    }

    pub fn model_source(&self) -> &Arc<dyn ModelSource> {
        &self.model_source
    }

    pub fn model_validator(&self) -> &Arc<dyn ModelValidator> {
        &self.model_validator
    }

    pub fn query_context_factory(&self) -> &Arc<dyn QueryContextFactory> {
        &self.query_context_factory
    }

    /// Build and validate the model: conventions, then the model source,
    /// then the validator.
    pub fn build_model(&self) -> Result<Arc<dyn Any + Send + Sync>> {
        let mut conventions = ConventionSet::new();
        self.convention_set_builder.add_conventions(&mut conventions);
        let model = self.model_source.model(&conventions)?;
        self.model_validator.validate(model.as_ref())?;
        Ok(model)
    }
}

impl fmt::Debug for ProviderServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderServices")
            .field("provider_name", &self.provider_name)
            .field("value_generator_cache", &self.value_generator_cache)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ProviderServices`].
///
/// The value generator cache defaults to an empty cache, and the value
/// generator selector to one that hands out `i64` temporary values through
/// that cache. Every other collaborator is required.
pub struct ProviderServicesBuilder {
    provider_name: String,
    database: Option<Arc<dyn Database>>,
    creator: Option<Arc<dyn DatabaseCreator>>,
    connection_factory: Option<Arc<dyn ConnectionFactory>>,
    value_generator_selector: Option<Arc<dyn ValueGeneratorSelector>>,
    value_generator_cache: Option<Arc<ValueGeneratorCache>>,
    convention_set_builder: Option<Arc<dyn ConventionSetBuilder>>,
    model_source: Option<Arc<dyn ModelSource>>,
    model_validator: Option<Arc<dyn ModelValidator>>,
    query_context_factory: Option<Arc<dyn QueryContextFactory>>,
}

impl ProviderServicesBuilder {
    pub fn new(provider_name: impl Into<String>) -> Self {
        Self {
            provider_name: provider_name.into(),
            database: None,
            creator: None,
            connection_factory: None,
            value_generator_selector: None,
            value_generator_cache: None,
            convention_set_builder: None,
            model_source: None,
            model_validator: None,
            query_context_factory: None,
        }
    }

    pub fn database(mut self, database: Arc<dyn Database>) -> Self {
        self.database = Some(database);
        self
    }

    pub fn creator(mut self, creator: Arc<dyn DatabaseCreator>) -> Self {
        self.creator = Some(creator);
        self
    }

    pub fn connection_factory(mut self, factory: Arc<dyn ConnectionFactory>) -> Self {
        self.connection_factory = Some(factory);
        self
    }

    pub fn value_generator_selector(mut self, selector: Arc<dyn ValueGeneratorSelector>) -> Self {
        self.value_generator_selector = Some(selector);
        self
    }

    pub fn value_generator_cache(mut self, cache: Arc<ValueGeneratorCache>) -> Self {
        self.value_generator_cache = Some(cache);
        self
    }

    pub fn convention_set_builder(mut self, builder: Arc<dyn ConventionSetBuilder>) -> Self {
        self.convention_set_builder = Some(builder);
        self
    }

    pub fn model_source(mut self, source: Arc<dyn ModelSource>) -> Self {
        self.model_source = Some(source);
        self
    }

    pub fn model_validator(mut self, validator: Arc<dyn ModelValidator>) -> Self {
        self.model_validator = Some(validator);
        self
    }

    pub fn query_context_factory(mut self, factory: Arc<dyn QueryContextFactory>) -> Self {
        self.query_context_factory = Some(factory);
        self
    }

    /// Finish the bundle. Fails with a configuration error naming every
    /// missing collaborator.
    pub fn build(self) -> Result<ProviderServices> {
        let mut missing = Vec::new();
        if self.database.is_none() {
            missing.push("database");
        }
        if self.creator.is_none() {
            missing.push("creator");
        }
        if self.connection_factory.is_none() {
            missing.push("connection factory");
        }
        if self.convention_set_builder.is_none() {
            missing.push("convention set builder");
        }
        if self.model_source.is_none() {
            missing.push("model source");
        }
        if self.model_validator.is_none() {
            missing.push("model validator");
        }
        if self.query_context_factory.is_none() {
            missing.push("query context factory");
        }

        let (
            Some(database),
            Some(creator),
            Some(connection_factory),
            Some(convention_set_builder),
            Some(model_source),
            Some(model_validator),
            Some(query_context_factory),
        ) = (
            self.database,
            self.creator,
            self.connection_factory,
            self.convention_set_builder,
            self.model_source,
            self.model_validator,
            self.query_context_factory,
        )
        else {
            return Err(ConfigError::new(format!(
                "provider '{}' is missing services: {}",
                self.provider_name,
                missing.join(", ")
            ))
            .into());
        };

        let value_generator_cache = self.value_generator_cache.unwrap_or_default();
        let value_generator_selector = self.value_generator_selector.unwrap_or_else(|| {
            Arc::new(CachingValueGeneratorSelector::new(
                Arc::clone(&value_generator_cache),
                temporary_generator,
            ))
        });

        Ok(ProviderServices {
            provider_name: self.provider_name,
            database,
            creator,
            connection_factory,
            value_generator_selector,
            value_generator_cache,
            convention_set_builder,
            model_source,
            model_validator,
            query_context_factory,
        })
    }
}

fn temporary_generator(_key: &PropertyKey) -> Result<Arc<dyn ErasedIdentityGenerator>> {
    Ok(Arc::new(TemporaryIdentityGenerator::<i64>::new()))
}
