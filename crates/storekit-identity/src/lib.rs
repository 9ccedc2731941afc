//! Surrogate key value generation for storekit.
//!
//! `storekit-identity` produces the values stored in generated key columns.
//!
//! - `IdentityGenerator` is the typed contract; `ErasedIdentityGenerator` is
//!   its object-safe twin, implemented for every typed generator, so a
//!   provider can hand out generators for keys whose type the caller only
//!   learns at runtime.
//! - `TemporaryIdentityGenerator` hands out negative placeholders for
//!   entities that have not been saved yet.
//! - `HiLoIdentityGenerator` reserves blocks of keys from a `BlockSource`
//!   (typically a database sequence) and hands them out locally.
//! - `ValueGeneratorCache` and `ValueGeneratorSelector` pick and memoize the
//!   generator for each (entity, property) pair.

pub mod cache;
pub mod generator;
pub mod hilo;
pub mod selector;
pub mod temporary;

pub use cache::{PropertyKey, ValueGeneratorCache};
pub use generator::{BoxedValue, ErasedIdentityGenerator, IdentityGenerator, downcast_value};
pub use hilo::{BlockSource, HiLoIdentityGenerator};
pub use selector::{CachingValueGeneratorSelector, ValueGeneratorSelector};
pub use temporary::{TemporaryIdentityGenerator, TemporaryValue};
