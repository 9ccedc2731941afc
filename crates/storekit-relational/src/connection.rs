//! Relational connection lifecycle.
//!
//! [`RelationalConnection`] owns a driver connection for the lifetime of one
//! unit of work. It adds exactly three things on top of the driver:
//!
//! - idempotent open/close bookkeeping (close is always safe),
//! - the one-active-transaction rule, checked before the driver is touched,
//! - the command timeout stamped onto commands it creates.
//!
//! Everything else, including every driver failure, passes through unchanged.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut conn = RelationalConnection::from_options(driver, &options);
//!
//! let tx = conn.begin_transaction()?; // opens lazily
//! let cmd = conn.create_command("UPDATE heroes SET age = age + 1");
//! conn.execute(&cmd)?;
//! tx.commit()?;
//!
//! conn.close()?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use asupersync::{Cx, Outcome};
use storekit_core::{ContextOptions, Error, IsolationLevel, Result, TransactionError};

use crate::command::Command;
use crate::driver::{DbConnection, DbTransaction};
use crate::transaction::{RelationalTransaction, TransactionSlot};

/// A driver connection plus its current transaction.
///
/// All operations take `&mut self`: a connection belongs to one unit of work
/// at a time and is not shared across concurrent callers.
pub struct RelationalConnection<D: DbConnection> {
    driver: D,
    connection_string: String,
    multiple_active_result_sets: bool,
    command_timeout: Option<Duration>,
    default_isolation: IsolationLevel,
    is_open: bool,
    transaction: Option<Arc<TransactionSlot<D::Transaction>>>,
}

impl<D: DbConnection> RelationalConnection<D> {
    /// Wrap a driver connection. The connection starts closed.
    pub fn new(driver: D) -> Self {
        let connection_string = driver.connection_string().to_string();
        let multiple_active_result_sets = driver.supports_multiple_active_result_sets();
        Self {
            driver,
            connection_string,
            multiple_active_result_sets,
            command_timeout: None,
            default_isolation: IsolationLevel::Unspecified,
            is_open: false,
            transaction: None,
        }
    }

    /// Wrap a driver connection, taking the command timeout and default
    /// isolation level from context options.
    pub fn from_options(driver: D, options: &ContextOptions) -> Self {
        let mut conn = Self::new(driver);
        conn.command_timeout = options.command_timeout();
        conn.default_isolation = options.default_isolation();
        conn
    }

    /// The connection string reported by the driver at construction.
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// Whether multiple active result sets are enabled. Fixed per instance.
    pub fn is_multiple_active_result_sets_enabled(&self) -> bool {
        self.multiple_active_result_sets
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout
    }

    /// Change the command timeout. Applies to commands created afterwards.
    pub fn set_command_timeout(&mut self, timeout: Option<Duration>) {
        self.command_timeout = timeout;
    }

    pub fn default_isolation(&self) -> IsolationLevel {
        self.default_isolation
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// The underlying driver connection.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Mutable access to the underlying driver connection.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Whether a transaction is currently active on this connection.
    pub fn in_transaction(&self) -> bool {
        self.transaction.as_ref().is_some_and(|slot| slot.is_active())
    }

    /// Isolation level of the active transaction, if any.
    pub fn transaction_isolation(&self) -> Option<IsolationLevel> {
        self.transaction
            .as_ref()
            .filter(|slot| slot.is_active())
            .map(|slot| slot.isolation())
    }

    // ========================================================================
    // Open / Close
    // ========================================================================

    /// Open the connection. No-op if already open.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn open(&mut self) -> Result<()> {
        if self.is_open {
            return Ok(());
        }
        self.driver.open()?;
        self.mark_opened();
        Ok(())
    }

    /// Open the connection asynchronously. No-op if already open.
    ///
    /// If `cx` is already cancelled the driver is not called and the
    /// connection stays closed.
    pub async fn open_async(&mut self, cx: &Cx) -> Outcome<(), Error> {
        if self.is_open {
            return Outcome::Ok(());
        }
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        match self.driver.open_async(cx).await {
            Outcome::Ok(()) => {
                self.mark_opened();
                Outcome::Ok(())
            }
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Close the connection.
    ///
    /// Always safe to call. An active transaction is abandoned (the server
    /// rolls it back) and its handle becomes unusable. The connection is
    /// considered closed even if the driver reports an error.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn close(&mut self) -> Result<()> {
        if let Some(slot) = self.transaction.take() {
            if slot.invalidate() {
                tracing::warn!(
                    "Closing connection with an active transaction; it will be rolled back"
                );
            }
        }
        if !self.is_open {
            return Ok(());
        }
        self.is_open = false;
        tracing::info!("Closing connection");
        self.driver.close()
    }

    fn mark_opened(&mut self) {
        self.is_open = true;
        tracing::info!(
            mars = self.multiple_active_result_sets,
            "Opened connection"
        );
    }

    /// Close again after a failed begin if this call did the opening, so the
    /// caller keeps the driver error and the connection its prior state.
    fn undo_lazy_open(&mut self, opened_here: bool) {
        if !opened_here {
            return;
        }
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "Failed to close connection after error");
        }
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Begin a transaction at the default isolation level.
    pub fn begin_transaction(&mut self) -> Result<RelationalTransaction<D::Transaction>> {
        self.begin_transaction_with(self.default_isolation)
    }

    /// Begin a transaction, opening the connection first if needed.
    ///
    /// Fails without touching the driver if a transaction is already active.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn begin_transaction_with(
        &mut self,
        isolation: IsolationLevel,
    ) -> Result<RelationalTransaction<D::Transaction>> {
        self.ensure_no_active_transaction()?;

        let opened_here = !self.is_open;
        self.open()?;

        match self.driver.begin(isolation) {
            Ok(tx) => Ok(self.attach(tx, false)),
            Err(e) => {
                self.undo_lazy_open(opened_here);
                Err(e)
            }
        }
    }

    /// Begin a transaction asynchronously at the default isolation level.
    pub async fn begin_transaction_async(
        &mut self,
        cx: &Cx,
    ) -> Outcome<RelationalTransaction<D::Transaction>, Error> {
        let isolation = self.default_isolation;
        self.begin_transaction_with_async(cx, isolation).await
    }

    /// Begin a transaction asynchronously, opening the connection if needed.
    ///
    /// Cancellation never leaves a half-started transaction: either the
    /// transaction is attached, or the connection is back in the state it was
    /// in before the call.
    pub async fn begin_transaction_with_async(
        &mut self,
        cx: &Cx,
        isolation: IsolationLevel,
    ) -> Outcome<RelationalTransaction<D::Transaction>, Error> {
        if let Err(e) = self.ensure_no_active_transaction() {
            return Outcome::Err(e);
        }

        let opened_here = !self.is_open;
        match self.open_async(cx).await {
            Outcome::Ok(()) => {}
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }

        if let Some(reason) = cx.cancel_reason() {
            self.undo_lazy_open(opened_here);
            return Outcome::Cancelled(reason);
        }

        match self.driver.begin_async(cx, isolation).await {
            Outcome::Ok(tx) => Outcome::Ok(self.attach(tx, false)),
            Outcome::Err(e) => {
                self.undo_lazy_open(opened_here);
                Outcome::Err(e)
            }
            Outcome::Cancelled(r) => {
                self.undo_lazy_open(opened_here);
                Outcome::Cancelled(r)
            }
            Outcome::Panicked(p) => {
                self.undo_lazy_open(opened_here);
                Outcome::Panicked(p)
            }
        }
    }

    /// Adopt a transaction started outside this connection.
    ///
    /// `Some(tx)` attaches `tx` as the current transaction and returns its
    /// handle. If another transaction is active, or the connection cannot be
    /// opened, `tx` is rolled back and the error returned. `None` detaches
    /// the current transaction from the connection without ending it.
    #[tracing::instrument(level = "debug", skip(self, external))]
    pub fn use_transaction(
        &mut self,
        external: Option<D::Transaction>,
    ) -> Result<Option<RelationalTransaction<D::Transaction>>> {
        match external {
            Some(tx) => {
                let ready = self
                    .ensure_no_active_transaction()
                    .and_then(|()| self.open());
                if let Err(e) = ready {
                    tracing::warn!(error = %e, "Rejected external transaction; rolling it back");
                    if let Err(rollback) = tx.rollback() {
                        tracing::warn!(error = %rollback, "Failed to roll back rejected transaction");
                    }
                    return Err(e);
                }
                Ok(Some(self.attach(tx, true)))
            }
            None => {
                if self.transaction.take().is_some() {
                    tracing::debug!("Detached current transaction from connection");
                }
                Ok(None)
            }
        }
    }

    fn ensure_no_active_transaction(&mut self) -> Result<()> {
        match &self.transaction {
            Some(slot) if slot.is_active() => Err(TransactionError::already_active().into()),
            Some(_) => {
                self.transaction = None;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn attach(
        &mut self,
        tx: D::Transaction,
        external: bool,
    ) -> RelationalTransaction<D::Transaction> {
        let slot = Arc::new(TransactionSlot::new(tx, external));
        tracing::info!(
            isolation = ?slot.isolation(),
            external,
            "Transaction started"
        );
        self.transaction = Some(Arc::clone(&slot));
        RelationalTransaction::new(slot)
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Create a command stamped with the current command timeout.
    pub fn create_command(&self, sql: impl Into<String>) -> Command {
        Command::new(sql).with_timeout(self.command_timeout)
    }

    /// Execute a command, opening the connection first if needed.
    pub fn execute(&mut self, command: &Command) -> Result<u64> {
        self.open()?;
        tracing::debug!(sql = command.sql(), timeout = ?command.timeout(), "Executing command");
        self.driver.execute(command)
    }

    /// Execute a command asynchronously, opening the connection if needed.
    pub async fn execute_async(&mut self, cx: &Cx, command: &Command) -> Outcome<u64, Error> {
        match self.open_async(cx).await {
            Outcome::Ok(()) => {}
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        tracing::debug!(sql = command.sql(), timeout = ?command.timeout(), "Executing command");
        self.driver.execute_async(cx, command).await
    }
}

impl<D: DbConnection> Drop for RelationalConnection<D> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "Failed to close connection on drop");
        }
    }
}

impl<D: DbConnection> std::fmt::Debug for RelationalConnection<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationalConnection")
            .field("connection_string", &self.connection_string)
            .field("is_open", &self.is_open)
            .field("in_transaction", &self.in_transaction())
            .field("command_timeout", &self.command_timeout)
            .field(
                "multiple_active_result_sets",
                &self.multiple_active_result_sets,
            )
            .finish_non_exhaustive()
    }
}
