//! Database provider negotiation for storekit.
//!
//! A provider is a pluggable backend for one storage engine. Providers are
//! registered as a slice of [`DatabaseProvider`] descriptors; the
//! [`ProviderSelector`] inspects them against the caller's
//! [`ContextOptions`](storekit_core::ContextOptions) and returns exactly one
//! [`ProviderServices`] bundle, or a [`ProviderError`](storekit_core::ProviderError)
//! that says precisely why it could not.
//!
//! # Selection rules
//!
//! 1. No descriptors: `NoProviderServices` (explicit) or
//!    `NoProviderConfigured` (implicit).
//! 2. Exactly one configured descriptor wins, whatever the source.
//! 3. Several configured descriptors are always an error; there is no
//!    precedence.
//! 4. With none configured, a single available descriptor wins only when the
//!    caller registered providers explicitly. Several available descriptors
//!    are an error.
//!
//! Predicates are re-evaluated on every call; nothing is cached.

pub mod container;
pub mod provider;
pub mod selector;
pub mod services;

pub use container::ServiceContainer;
pub use provider::DatabaseProvider;
pub use selector::{ProviderSelector, ServiceProviderSource};
pub use services::{
    ConnectionFactory, ConventionSet, ConventionSetBuilder, Database, DatabaseCreator,
    ModelSource, ModelValidator, ProviderServices, ProviderServicesBuilder, QueryContextFactory,
};
pub use storekit_core::format_provider_names;
