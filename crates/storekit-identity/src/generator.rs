//! Identity generator contracts.
//!
//! A generator produces the next value for a surrogate key. Typed code uses
//! [`IdentityGenerator`]; code that only learns the key type at runtime (the
//! provider's value generator selector, the unit of work) holds an
//! `Arc<dyn ErasedIdentityGenerator>` and downcasts the produced value.
//!
//! Both forms are the same generator: every `IdentityGenerator` is an
//! `ErasedIdentityGenerator` through a blanket impl, and the erased call
//! produces exactly the value the typed call would have.

use std::any::{Any, type_name};
use std::future::Future;

use asupersync::{Cx, Outcome};
use storekit_core::{BoxFuture, Error, GenerationError, GenerationErrorKind, Result};

/// A generated value with its type erased.
pub type BoxedValue = Box<dyn Any + Send>;

/// Produces values for a generated key column.
pub trait IdentityGenerator: Send + Sync {
    /// The key type this generator produces.
    type Value: Send + 'static;

    /// Whether produced values are placeholders that the database replaces
    /// when the entity is saved.
    fn generates_temporary_values(&self) -> bool {
        false
    }

    /// Produce the next value, blocking if the generator needs to consult
    /// its key source.
    fn next(&self) -> Result<Self::Value>;

    /// Produce the next value asynchronously.
    ///
    /// The default checks `cx` once and then calls [`next`](Self::next);
    /// generators that perform I/O override it. Cancellation yields
    /// `Outcome::Cancelled` and never a partially generated value.
    fn next_async(&self, cx: &Cx) -> impl Future<Output = Outcome<Self::Value, Error>> + Send {
        async move {
            if let Some(reason) = cx.cancel_reason() {
                return Outcome::Cancelled(reason);
            }
            match self.next() {
                Ok(value) => Outcome::Ok(value),
                Err(e) => Outcome::Err(e),
            }
        }
    }
}

/// Object-safe form of [`IdentityGenerator`].
pub trait ErasedIdentityGenerator: Send + Sync {
    /// Name of the produced value type, for diagnostics.
    fn value_type_name(&self) -> &'static str;

    fn temporary_values(&self) -> bool;

    fn next_value(&self) -> Result<BoxedValue>;

    fn next_value_async<'a>(&'a self, cx: &'a Cx) -> BoxFuture<'a, Outcome<BoxedValue, Error>>;
}

impl<G: IdentityGenerator> ErasedIdentityGenerator for G {
    fn value_type_name(&self) -> &'static str {
        type_name::<G::Value>()
    }

    fn temporary_values(&self) -> bool {
        self.generates_temporary_values()
    }

    fn next_value(&self) -> Result<BoxedValue> {
        let value = self.next()?;
        Ok(Box::new(value))
    }

    fn next_value_async<'a>(&'a self, cx: &'a Cx) -> BoxFuture<'a, Outcome<BoxedValue, Error>> {
        Box::pin(async move {
            match self.next_async(cx).await {
                Outcome::Ok(value) => Outcome::Ok(Box::new(value) as BoxedValue),
                Outcome::Err(e) => Outcome::Err(e),
                Outcome::Cancelled(r) => Outcome::Cancelled(r),
                Outcome::Panicked(p) => Outcome::Panicked(p),
            }
        })
    }
}

/// Recover the concrete value produced by an erased generator.
pub fn downcast_value<T: Any>(value: BoxedValue) -> Result<T> {
    match value.downcast::<T>() {
        Ok(value) => Ok(*value),
        Err(_) => Err(GenerationError::new(
            GenerationErrorKind::TypeMismatch,
            format!("generated value is not a {}", type_name::<T>()),
        )
        .into()),
    }
}
