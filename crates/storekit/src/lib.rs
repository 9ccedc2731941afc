//! storekit: provider negotiation and connection lifecycle for relational
//! data access.
//!
//! `storekit` is the **facade crate** for the workspace. It re-exports the
//! contracts of the member crates and adds [`UnitOfWork`], which ties them
//! together: select one provider from the registered set, take its service
//! bundle, and open a connection through the bundle's connection factory.
//!
//! # Quick Start
//!
//! ```ignore
//! use storekit::prelude::*;
//!
//! let options = ContextOptions::from_json(r#"{"provider": "sqlite"}"#)?;
//! let mut uow = UnitOfWork::builder()
//!     .options(options)
//!     .provider(Arc::new(SqliteProvider::default()))
//!     .build()?;
//!
//! let tx = uow.connection_mut().begin_transaction()?;
//! let id = uow.next_identity_as::<i64>(&cx, &PropertyKey::new("Hero", "id")).await;
//! tx.commit()?;
//! uow.close()?;
//! ```
//!
//! # Crate Map
//!
//! - `storekit-core`: errors, configuration, isolation levels
//! - `storekit-relational`: driver contracts, `RelationalConnection`
//! - `storekit-identity`: key generators and their cache
//! - `storekit-provider`: provider descriptors, bundles and selection

pub mod unit_of_work;

// Re-export all public types from sub-crates
pub use storekit_core::{
    BoxFuture, ConfigError, ConnectionError, ConnectionErrorKind, ContextOptions,
    ContextSettings, Cx, Error, GenerationError, GenerationErrorKind, IsolationLevel, Outcome,
    ProviderError, ProviderErrorKind, Result, TransactionError, TransactionErrorKind,
    format_provider_names,
};
pub use storekit_identity::{
    BlockSource, BoxedValue, CachingValueGeneratorSelector, ErasedIdentityGenerator,
    HiLoIdentityGenerator, IdentityGenerator, PropertyKey, TemporaryIdentityGenerator,
    TemporaryValue, ValueGeneratorCache, ValueGeneratorSelector, downcast_value,
};
pub use storekit_provider::{
    ConnectionFactory, ConventionSet, ConventionSetBuilder, Database, DatabaseCreator,
    DatabaseProvider, ModelSource, ModelValidator, ProviderSelector, ProviderServices,
    ProviderServicesBuilder, QueryContextFactory, ServiceContainer, ServiceProviderSource,
};
pub use storekit_relational::{
    AnyDbConnection, AnyDbTransaction, Command, DbConnection, DbTransaction,
    RelationalConnection, RelationalTransaction, TransactionStatus,
};
pub use unit_of_work::{UnitOfWork, UnitOfWorkBuilder};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use storekit::prelude::*;
/// ```
pub mod prelude {
    pub use crate::unit_of_work::{UnitOfWork, UnitOfWorkBuilder};
    pub use asupersync::{Cx, Outcome};
    pub use std::sync::Arc;
    pub use storekit_core::{ContextOptions, Error, IsolationLevel, Result};
    pub use storekit_identity::{IdentityGenerator, PropertyKey, downcast_value};
    pub use storekit_provider::{
        DatabaseProvider, ProviderServices, ServiceContainer, ServiceProviderSource,
    };
    pub use storekit_relational::{
        AnyDbConnection, DbConnection, DbTransaction, RelationalConnection,
        RelationalTransaction,
    };
}
