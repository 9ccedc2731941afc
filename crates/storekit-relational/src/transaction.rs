//! Transaction handles.
//!
//! A [`RelationalTransaction`] and the [`RelationalConnection`] that started
//! it share one slot. The connection looks at the slot to enforce the
//! one-active-transaction rule and empties it on close; the handle drives the
//! driver transaction through it. Once the slot is finished, every further
//! operation on the handle fails with an invalid-operation error.
//!
//! [`RelationalConnection`]: crate::RelationalConnection

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use asupersync::{Cx, Outcome};
use regex::Regex;
use storekit_core::{Error, IsolationLevel, Result, TransactionError, TransactionErrorKind};

use crate::driver::DbTransaction;

/// Observable state of a transaction handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Started and not yet completed.
    Active,
    /// Committed successfully.
    Committed,
    /// Rolled back, explicitly or on drop.
    RolledBack,
    /// Commit or rollback failed or was cancelled mid-flight.
    Failed,
    /// The owning connection was closed while the transaction was active.
    Invalidated,
}

enum SlotState<T> {
    Active(T),
    /// The driver transaction is checked out by an in-flight operation.
    Busy,
    Done(TransactionStatus),
}

pub(crate) struct TransactionSlot<T> {
    state: Mutex<SlotState<T>>,
    isolation: IsolationLevel,
    external: bool,
}

impl<T: DbTransaction> TransactionSlot<T> {
    pub(crate) fn new(tx: T, external: bool) -> Self {
        let isolation = tx.isolation_level();
        Self {
            state: Mutex::new(SlotState::Active(tx)),
            isolation,
            external,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn status(&self) -> TransactionStatus {
        match &*self.lock() {
            SlotState::Active(_) | SlotState::Busy => TransactionStatus::Active,
            SlotState::Done(status) => *status,
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.status() == TransactionStatus::Active
    }

    pub(crate) fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Check the driver transaction out, leaving the slot busy.
    fn take(&self) -> Result<T> {
        let mut state = self.lock();
        match std::mem::replace(&mut *state, SlotState::Busy) {
            SlotState::Active(tx) => Ok(tx),
            SlotState::Busy => Err(TransactionError::busy().into()),
            SlotState::Done(status) => {
                *state = SlotState::Done(status);
                if status == TransactionStatus::Invalidated {
                    Err(TransactionError::connection_closed().into())
                } else {
                    Err(TransactionError::completed().into())
                }
            }
        }
    }

    /// Return a checked-out transaction. If the connection was closed in the
    /// meantime the slot stays invalidated and `tx` is dropped.
    fn restore(&self, tx: T) {
        let mut state = self.lock();
        if matches!(*state, SlotState::Busy) {
            *state = SlotState::Active(tx);
        }
    }

    fn finish(&self, status: TransactionStatus) {
        let mut state = self.lock();
        if matches!(*state, SlotState::Busy) {
            *state = SlotState::Done(status);
        }
    }

    /// Mark the slot invalidated, dropping the driver transaction if it is
    /// checked in. Returns whether a live transaction was abandoned.
    pub(crate) fn invalidate(&self) -> bool {
        let mut state = self.lock();
        if matches!(*state, SlotState::Done(_)) {
            return false;
        }
        *state = SlotState::Done(TransactionStatus::Invalidated);
        true
    }
}

/// Marks the slot failed if an async operation is dropped before it finishes.
struct BusyGuard<'a, T: DbTransaction> {
    slot: &'a TransactionSlot<T>,
    armed: bool,
}

impl<'a, T: DbTransaction> BusyGuard<'a, T> {
    fn new(slot: &'a TransactionSlot<T>) -> Self {
        Self { slot, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<T: DbTransaction> Drop for BusyGuard<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.slot.finish(TransactionStatus::Failed);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum SavepointOp {
    Create,
    RollbackTo,
    Release,
}

/// A transaction started by (or adopted into) a [`RelationalConnection`].
///
/// Dropping an active handle rolls the transaction back synchronously.
///
/// [`RelationalConnection`]: crate::RelationalConnection
pub struct RelationalTransaction<T: DbTransaction> {
    slot: Arc<TransactionSlot<T>>,
}

impl<T: DbTransaction> RelationalTransaction<T> {
    pub(crate) fn new(slot: Arc<TransactionSlot<T>>) -> Self {
        Self { slot }
    }

    pub fn status(&self) -> TransactionStatus {
        self.slot.status()
    }

    pub fn is_active(&self) -> bool {
        self.slot.is_active()
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.slot.isolation()
    }

    /// Whether the transaction was started outside this connection and
    /// adopted through `use_transaction`.
    pub fn is_external(&self) -> bool {
        self.slot.external
    }

    /// Commit the transaction.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn commit(self) -> Result<()> {
        let tx = self.slot.take()?;
        match tx.commit() {
            Ok(()) => {
                self.slot.finish(TransactionStatus::Committed);
                Ok(())
            }
            Err(e) => {
                self.slot.finish(TransactionStatus::Failed);
                Err(e)
            }
        }
    }

    /// Roll the transaction back.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn rollback(self) -> Result<()> {
        let tx = self.slot.take()?;
        match tx.rollback() {
            Ok(()) => {
                self.slot.finish(TransactionStatus::RolledBack);
                Ok(())
            }
            Err(e) => {
                self.slot.finish(TransactionStatus::Failed);
                Err(e)
            }
        }
    }

    /// Commit the transaction asynchronously.
    ///
    /// If `cx` is cancelled before the driver is called, the handle is dropped
    /// like any unfinished one and the transaction rolls back. Cancellation
    /// reported by the driver marks the transaction failed.
    pub async fn commit_async(self, cx: &Cx) -> Outcome<(), Error> {
        self.complete_async(cx, true).await
    }

    /// Roll the transaction back asynchronously.
    pub async fn rollback_async(self, cx: &Cx) -> Outcome<(), Error> {
        self.complete_async(cx, false).await
    }

    async fn complete_async(&self, cx: &Cx, commit: bool) -> Outcome<(), Error> {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let tx = match self.slot.take() {
            Ok(tx) => tx,
            Err(e) => return Outcome::Err(e),
        };

        let mut guard = BusyGuard::new(&self.slot);
        let (outcome, done) = if commit {
            (tx.commit_async(cx).await, TransactionStatus::Committed)
        } else {
            (tx.rollback_async(cx).await, TransactionStatus::RolledBack)
        };
        guard.disarm();

        match outcome {
            Outcome::Ok(()) => {
                self.slot.finish(done);
                Outcome::Ok(())
            }
            other => {
                self.slot.finish(TransactionStatus::Failed);
                other
            }
        }
    }

    /// Create a savepoint.
    pub fn savepoint(&mut self, name: &str) -> Result<()> {
        self.savepoint_op(SavepointOp::Create, name)
    }

    /// Roll back to a savepoint without ending the transaction.
    pub fn rollback_to(&mut self, name: &str) -> Result<()> {
        self.savepoint_op(SavepointOp::RollbackTo, name)
    }

    /// Release a savepoint.
    pub fn release(&mut self, name: &str) -> Result<()> {
        self.savepoint_op(SavepointOp::Release, name)
    }

    pub async fn savepoint_async(&mut self, cx: &Cx, name: &str) -> Outcome<(), Error> {
        self.savepoint_op_async(cx, SavepointOp::Create, name).await
    }

    pub async fn rollback_to_async(&mut self, cx: &Cx, name: &str) -> Outcome<(), Error> {
        self.savepoint_op_async(cx, SavepointOp::RollbackTo, name)
            .await
    }

    pub async fn release_async(&mut self, cx: &Cx, name: &str) -> Outcome<(), Error> {
        self.savepoint_op_async(cx, SavepointOp::Release, name).await
    }

    fn savepoint_op(&self, op: SavepointOp, name: &str) -> Result<()> {
        validate_savepoint_name(name)?;
        let mut tx = self.slot.take()?;
        let result = match op {
            SavepointOp::Create => tx.savepoint(name),
            SavepointOp::RollbackTo => tx.rollback_to(name),
            SavepointOp::Release => tx.release(name),
        };
        self.slot.restore(tx);
        result
    }

    async fn savepoint_op_async(&self, cx: &Cx, op: SavepointOp, name: &str) -> Outcome<(), Error> {
        if let Err(e) = validate_savepoint_name(name) {
            return Outcome::Err(e);
        }
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let mut tx = match self.slot.take() {
            Ok(tx) => tx,
            Err(e) => return Outcome::Err(e),
        };

        let mut guard = BusyGuard::new(&self.slot);
        let outcome = match op {
            SavepointOp::Create => tx.savepoint_async(cx, name).await,
            SavepointOp::RollbackTo => tx.rollback_to_async(cx, name).await,
            SavepointOp::Release => tx.release_async(cx, name).await,
        };
        guard.disarm();
        self.slot.restore(tx);
        outcome
    }
}

impl<T: DbTransaction> Drop for RelationalTransaction<T> {
    fn drop(&mut self) {
        let Ok(tx) = self.slot.take() else {
            return;
        };
        tracing::debug!("Rolling back transaction dropped without commit or rollback");
        match tx.rollback() {
            Ok(()) => self.slot.finish(TransactionStatus::RolledBack),
            Err(e) => {
                tracing::warn!(error = %e, "Rollback of dropped transaction failed");
                self.slot.finish(TransactionStatus::Failed);
            }
        }
    }
}

impl<T: DbTransaction> std::fmt::Debug for RelationalTransaction<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationalTransaction")
            .field("status", &self.status())
            .field("isolation", &self.isolation_level())
            .field("external", &self.is_external())
            .finish()
    }
}

const SAVEPOINT_NAME_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]{0,62}$";

/// Validate a savepoint name before it is interpolated into SQL.
fn validate_savepoint_name(name: &str) -> Result<()> {
    static PATTERN: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(SAVEPOINT_NAME_PATTERN))
        .as_ref()
        .map_err(|e| {
            TransactionError::new(
                TransactionErrorKind::InvalidSavepoint,
                format!("savepoint name pattern failed to compile: {e}"),
            )
        })?;
    if pattern.is_match(name) {
        Ok(())
    } else {
        Err(TransactionError::new(
            TransactionErrorKind::InvalidSavepoint,
            format!(
                "Invalid savepoint name '{name}': use 1-63 letters, digits or underscores, \
                 not starting with a digit"
            ),
        )
        .into())
    }
}
