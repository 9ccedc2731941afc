//! Core types for storekit.
//!
//! `storekit-core` is the **foundation layer**: it defines the error taxonomy,
//! the context configuration object and the small shared vocabulary every
//! other crate builds on.
//!
//! # Role In The Architecture
//!
//! - **Errors**: `Error` covers provider selection, connection, transaction
//!   state, value generation and configuration failures.
//! - **Configuration**: `ContextOptions` is handed to provider predicates;
//!   nothing in this workspace inspects it except the providers themselves.
//! - **Structured concurrency**: re-exports `Cx` and `Outcome` from asupersync
//!   so every async operation is cancel-correct.
//!
//! # Who Uses This Crate
//!
//! - `storekit-relational` wraps driver connections and reports `Error`.
//! - `storekit-identity` produces key values under a `Cx`.
//! - `storekit-provider` selects a provider from `ContextOptions`.
//! - `storekit` ties them together in a unit of work.

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

use std::future::Future;
use std::pin::Pin;

/// A boxed, sendable future, for async methods on object-safe traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub mod error;
pub mod isolation;
pub mod options;

pub use error::{
    ConfigError, ConnectionError, ConnectionErrorKind, Error, GenerationError,
    GenerationErrorKind, ProviderError, ProviderErrorKind, Result, TransactionError,
    TransactionErrorKind, format_provider_names,
};
pub use isolation::IsolationLevel;
pub use options::{ContextOptions, ContextSettings};
