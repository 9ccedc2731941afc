//! Driver contracts.
//!
//! These traits describe the physical connection and transaction handles a
//! provider's native driver exposes. [`RelationalConnection`] wraps them; it
//! never reimplements what they do.
//!
//! Every potentially-blocking operation comes in two forms: a synchronous one
//! returning [`Result`] and an asynchronous one taking a [`Cx`] and returning
//! an [`Outcome`]. Drivers should check `cx` before issuing I/O and, where the
//! wire protocol allows, while it is in flight.
//!
//! Transactions are owned values (`'static`) rather than borrows of the
//! connection. Drivers whose native transaction borrows the session typically
//! share the session behind an `Arc<Mutex<_>>`.
//!
//! [`RelationalConnection`]: crate::RelationalConnection

use std::future::Future;

use asupersync::{Cx, Outcome};
use storekit_core::{Error, IsolationLevel, Result};

use crate::command::Command;

/// A native database connection.
pub trait DbConnection: Send {
    /// The driver's transaction handle.
    type Transaction: DbTransaction;

    /// The connection string this connection was created with.
    fn connection_string(&self) -> &str;

    /// Whether the server allows several active result sets on one connection.
    fn supports_multiple_active_result_sets(&self) -> bool {
        false
    }

    /// Establish the physical connection.
    fn open(&mut self) -> Result<()>;

    /// Establish the physical connection asynchronously.
    fn open_async(&mut self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send;

    /// Release the physical connection. Any open transaction is abandoned to
    /// the server, which rolls it back.
    fn close(&mut self) -> Result<()>;

    /// Start a transaction on an open connection.
    fn begin(&mut self, isolation: IsolationLevel) -> Result<Self::Transaction>;

    /// Start a transaction on an open connection asynchronously.
    fn begin_async(
        &mut self,
        cx: &Cx,
        isolation: IsolationLevel,
    ) -> impl Future<Output = Outcome<Self::Transaction, Error>> + Send;

    /// Execute a command and return the number of affected rows.
    fn execute(&mut self, command: &Command) -> Result<u64>;

    /// Execute a command asynchronously.
    fn execute_async(
        &mut self,
        cx: &Cx,
        command: &Command,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;
}

/// A native database transaction.
pub trait DbTransaction: Send + 'static {
    /// The level the transaction was started with.
    fn isolation_level(&self) -> IsolationLevel;

    fn commit(self) -> Result<()>;

    fn commit_async(self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send;

    fn rollback(self) -> Result<()>;

    fn rollback_async(self, cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send;

    /// Create a savepoint. The name has already been validated.
    fn savepoint(&mut self, name: &str) -> Result<()>;

    fn savepoint_async(
        &mut self,
        cx: &Cx,
        name: &str,
    ) -> impl Future<Output = Outcome<(), Error>> + Send;

    /// Roll back to a savepoint.
    fn rollback_to(&mut self, name: &str) -> Result<()>;

    fn rollback_to_async(
        &mut self,
        cx: &Cx,
        name: &str,
    ) -> impl Future<Output = Outcome<(), Error>> + Send;

    /// Release a savepoint.
    fn release(&mut self, name: &str) -> Result<()>;

    fn release_async(
        &mut self,
        cx: &Cx,
        name: &str,
    ) -> impl Future<Output = Outcome<(), Error>> + Send;
}
