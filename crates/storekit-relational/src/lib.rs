//! Relational connection and transaction lifecycle for storekit.
//!
//! `storekit-relational` sits between a provider's native driver and the
//! unit of work that uses it.
//!
//! # Role In The Architecture
//!
//! - **Driver contract**: `DbConnection` and `DbTransaction` are what a
//!   provider's driver implements.
//! - **Lifecycle**: `RelationalConnection` adds idempotent open/close, the
//!   one-active-transaction rule and command timeouts on top of a driver.
//! - **Erasure**: `AnyDbConnection` lets a runtime-selected provider hand out
//!   connections without the caller naming the driver type.
//!
//! All async operations take a `Cx` and return an `Outcome`, so cancellation
//! is reported distinctly from driver failure.

pub mod command;
pub mod connection;
pub mod driver;
pub mod erased;
pub mod transaction;

pub use command::Command;
pub use connection::RelationalConnection;
pub use driver::{DbConnection, DbTransaction};
pub use erased::{AnyDbConnection, AnyDbTransaction};
pub use transaction::{RelationalTransaction, TransactionStatus};
