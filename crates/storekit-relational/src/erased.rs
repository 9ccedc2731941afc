//! Type-erased driver handles.
//!
//! Providers are selected at runtime, so the connection a provider hands out
//! cannot be named statically by the caller. [`AnyDbConnection`] and
//! [`AnyDbTransaction`] box any driver behind an object-safe shim and
//! implement [`DbConnection`] / [`DbTransaction`] themselves, so
//! `RelationalConnection<AnyDbConnection>` behaves exactly like a connection
//! over the concrete driver.

use asupersync::{Cx, Outcome};
use storekit_core::{BoxFuture, Error, IsolationLevel, Result};

use crate::command::Command;
use crate::driver::{DbConnection, DbTransaction};

trait DynDbConnection: Send {
    fn dyn_connection_string(&self) -> &str;
    fn dyn_supports_mars(&self) -> bool;
    fn dyn_open(&mut self) -> Result<()>;
    fn dyn_open_async<'a>(&'a mut self, cx: &'a Cx) -> BoxFuture<'a, Outcome<(), Error>>;
    fn dyn_close(&mut self) -> Result<()>;
    fn dyn_begin(&mut self, isolation: IsolationLevel) -> Result<AnyDbTransaction>;
    fn dyn_begin_async<'a>(
        &'a mut self,
        cx: &'a Cx,
        isolation: IsolationLevel,
    ) -> BoxFuture<'a, Outcome<AnyDbTransaction, Error>>;
    fn dyn_execute(&mut self, command: &Command) -> Result<u64>;
    fn dyn_execute_async<'a>(
        &'a mut self,
        cx: &'a Cx,
        command: &'a Command,
    ) -> BoxFuture<'a, Outcome<u64, Error>>;
}

impl<D: DbConnection> DynDbConnection for D {
    fn dyn_connection_string(&self) -> &str {
        DbConnection::connection_string(self)
    }

    fn dyn_supports_mars(&self) -> bool {
        DbConnection::supports_multiple_active_result_sets(self)
    }

    fn dyn_open(&mut self) -> Result<()> {
        DbConnection::open(self)
    }

    fn dyn_open_async<'a>(&'a mut self, cx: &'a Cx) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(DbConnection::open_async(self, cx))
    }

    fn dyn_close(&mut self) -> Result<()> {
        DbConnection::close(self)
    }

    fn dyn_begin(&mut self, isolation: IsolationLevel) -> Result<AnyDbTransaction> {
        DbConnection::begin(self, isolation).map(AnyDbTransaction::new)
    }

    fn dyn_begin_async<'a>(
        &'a mut self,
        cx: &'a Cx,
        isolation: IsolationLevel,
    ) -> BoxFuture<'a, Outcome<AnyDbTransaction, Error>> {
        Box::pin(async move {
            match DbConnection::begin_async(self, cx, isolation).await {
                Outcome::Ok(tx) => Outcome::Ok(AnyDbTransaction::new(tx)),
                Outcome::Err(e) => Outcome::Err(e),
                Outcome::Cancelled(r) => Outcome::Cancelled(r),
                Outcome::Panicked(p) => Outcome::Panicked(p),
            }
        })
    }

    fn dyn_execute(&mut self, command: &Command) -> Result<u64> {
        DbConnection::execute(self, command)
    }

    fn dyn_execute_async<'a>(
        &'a mut self,
        cx: &'a Cx,
        command: &'a Command,
    ) -> BoxFuture<'a, Outcome<u64, Error>> {
        Box::pin(DbConnection::execute_async(self, cx, command))
    }
}

/// A driver connection of any provider.
pub struct AnyDbConnection(Box<dyn DynDbConnection>);

impl AnyDbConnection {
    pub fn new<D: DbConnection + 'static>(driver: D) -> Self {
        Self(Box::new(driver))
    }
}

impl DbConnection for AnyDbConnection {
    type Transaction = AnyDbTransaction;

    fn connection_string(&self) -> &str {
        self.0.dyn_connection_string()
    }

    fn supports_multiple_active_result_sets(&self) -> bool {
        self.0.dyn_supports_mars()
    }

    fn open(&mut self) -> Result<()> {
        self.0.dyn_open()
    }

    async fn open_async(&mut self, cx: &Cx) -> Outcome<(), Error> {
        self.0.dyn_open_async(cx).await
    }

    fn close(&mut self) -> Result<()> {
        self.0.dyn_close()
    }

    fn begin(&mut self, isolation: IsolationLevel) -> Result<AnyDbTransaction> {
        self.0.dyn_begin(isolation)
    }

    async fn begin_async(
        &mut self,
        cx: &Cx,
        isolation: IsolationLevel,
    ) -> Outcome<AnyDbTransaction, Error> {
        self.0.dyn_begin_async(cx, isolation).await
    }

    fn execute(&mut self, command: &Command) -> Result<u64> {
        self.0.dyn_execute(command)
    }

    async fn execute_async(&mut self, cx: &Cx, command: &Command) -> Outcome<u64, Error> {
        self.0.dyn_execute_async(cx, command).await
    }
}

impl std::fmt::Debug for AnyDbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyDbConnection")
            .field("connection_string", &self.0.dyn_connection_string())
            .finish_non_exhaustive()
    }
}

trait DynDbTransaction: Send {
    fn dyn_isolation_level(&self) -> IsolationLevel;
    fn dyn_commit(self: Box<Self>) -> Result<()>;
    fn dyn_commit_async<'a>(self: Box<Self>, cx: &'a Cx) -> BoxFuture<'a, Outcome<(), Error>>;
    fn dyn_rollback(self: Box<Self>) -> Result<()>;
    fn dyn_rollback_async<'a>(self: Box<Self>, cx: &'a Cx)
    -> BoxFuture<'a, Outcome<(), Error>>;
    fn dyn_savepoint(&mut self, name: &str) -> Result<()>;
    fn dyn_savepoint_async<'a>(
        &'a mut self,
        cx: &'a Cx,
        name: &'a str,
    ) -> BoxFuture<'a, Outcome<(), Error>>;
    fn dyn_rollback_to(&mut self, name: &str) -> Result<()>;
    fn dyn_rollback_to_async<'a>(
        &'a mut self,
        cx: &'a Cx,
        name: &'a str,
    ) -> BoxFuture<'a, Outcome<(), Error>>;
    fn dyn_release(&mut self, name: &str) -> Result<()>;
    fn dyn_release_async<'a>(
        &'a mut self,
        cx: &'a Cx,
        name: &'a str,
    ) -> BoxFuture<'a, Outcome<(), Error>>;
}

impl<T: DbTransaction> DynDbTransaction for T {
    fn dyn_isolation_level(&self) -> IsolationLevel {
        DbTransaction::isolation_level(self)
    }

    fn dyn_commit(self: Box<Self>) -> Result<()> {
        DbTransaction::commit(*self)
    }

    fn dyn_commit_async<'a>(self: Box<Self>, cx: &'a Cx) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(DbTransaction::commit_async(*self, cx))
    }

    fn dyn_rollback(self: Box<Self>) -> Result<()> {
        DbTransaction::rollback(*self)
    }

    fn dyn_rollback_async<'a>(
        self: Box<Self>,
        cx: &'a Cx,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(DbTransaction::rollback_async(*self, cx))
    }

    fn dyn_savepoint(&mut self, name: &str) -> Result<()> {
        DbTransaction::savepoint(self, name)
    }

    fn dyn_savepoint_async<'a>(
        &'a mut self,
        cx: &'a Cx,
        name: &'a str,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(DbTransaction::savepoint_async(self, cx, name))
    }

    fn dyn_rollback_to(&mut self, name: &str) -> Result<()> {
        DbTransaction::rollback_to(self, name)
    }

    fn dyn_rollback_to_async<'a>(
        &'a mut self,
        cx: &'a Cx,
        name: &'a str,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(DbTransaction::rollback_to_async(self, cx, name))
    }

    fn dyn_release(&mut self, name: &str) -> Result<()> {
        DbTransaction::release(self, name)
    }

    fn dyn_release_async<'a>(
        &'a mut self,
        cx: &'a Cx,
        name: &'a str,
    ) -> BoxFuture<'a, Outcome<(), Error>> {
        Box::pin(DbTransaction::release_async(self, cx, name))
    }
}

/// A driver transaction of any provider.
pub struct AnyDbTransaction(Box<dyn DynDbTransaction>);

impl AnyDbTransaction {
    pub fn new<T: DbTransaction>(tx: T) -> Self {
        Self(Box::new(tx))
    }
}

impl DbTransaction for AnyDbTransaction {
    fn isolation_level(&self) -> IsolationLevel {
        self.0.dyn_isolation_level()
    }

    fn commit(self) -> Result<()> {
        self.0.dyn_commit()
    }

    async fn commit_async(self, cx: &Cx) -> Outcome<(), Error> {
        self.0.dyn_commit_async(cx).await
    }

    fn rollback(self) -> Result<()> {
        self.0.dyn_rollback()
    }

    async fn rollback_async(self, cx: &Cx) -> Outcome<(), Error> {
        self.0.dyn_rollback_async(cx).await
    }

    fn savepoint(&mut self, name: &str) -> Result<()> {
        self.0.dyn_savepoint(name)
    }

    async fn savepoint_async(&mut self, cx: &Cx, name: &str) -> Outcome<(), Error> {
        self.0.dyn_savepoint_async(cx, name).await
    }

    fn rollback_to(&mut self, name: &str) -> Result<()> {
        self.0.dyn_rollback_to(name)
    }

    async fn rollback_to_async(&mut self, cx: &Cx, name: &str) -> Outcome<(), Error> {
        self.0.dyn_rollback_to_async(cx, name).await
    }

    fn release(&mut self, name: &str) -> Result<()> {
        self.0.dyn_release(name)
    }

    async fn release_async(&mut self, cx: &Cx, name: &str) -> Outcome<(), Error> {
        self.0.dyn_release_async(cx, name).await
    }
}

impl std::fmt::Debug for AnyDbTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyDbTransaction")
            .field("isolation", &self.0.dyn_isolation_level())
            .finish_non_exhaustive()
    }
}
