//! Commands issued through a relational connection.

use std::time::Duration;

/// A SQL command bound to a timeout.
///
/// Commands created by [`RelationalConnection::create_command`] capture the
/// connection's command timeout at creation time; changing the timeout later
/// only affects commands created afterwards.
///
/// [`RelationalConnection::create_command`]: crate::RelationalConnection::create_command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    sql: String,
    timeout: Option<Duration>,
}

impl Command {
    /// Create a command with no timeout (driver default).
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            timeout: None,
        }
    }

    /// Override the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}
