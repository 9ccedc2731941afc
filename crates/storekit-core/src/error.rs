//! Error types for storekit.
//!
//! Every fallible synchronous operation returns [`Result`]; asynchronous
//! operations return `Outcome<T, Error>` so cancellation stays distinct from
//! failure.

use std::error::Error as StdError;
use std::fmt;

/// The main error type for all storekit operations.
#[derive(Debug)]
pub enum Error {
    /// Provider selection failed (configuration error, never transient).
    Provider(ProviderError),
    /// Establishing or using the physical connection failed.
    Connection(ConnectionError),
    /// A transaction precondition or state transition failed.
    Transaction(TransactionError),
    /// A key value could not be generated.
    Generation(GenerationError),
    /// Configuration could not be loaded or is invalid.
    Config(ConfigError),
    /// A driver reports this when a command's timeout elapses.
    Timeout,
    /// Anything a driver or collaborator wants to report verbatim.
    Custom(String),
}

impl Error {
    /// Create a custom error with a message.
    pub fn custom(message: impl Into<String>) -> Self {
        Error::Custom(message.into())
    }

    /// Whether this error is an invalid-operation failure raised before the
    /// driver was touched (transaction state preconditions).
    pub fn is_invalid_operation(&self) -> bool {
        matches!(
            self,
            Error::Transaction(TransactionError {
                kind: TransactionErrorKind::AlreadyActive
                    | TransactionErrorKind::Completed
                    | TransactionErrorKind::ConnectionClosed
                    | TransactionErrorKind::Busy,
                ..
            })
        )
    }

    /// The provider selection kind, if this is a selection failure.
    pub fn provider_kind(&self) -> Option<ProviderErrorKind> {
        match self {
            Error::Provider(e) => Some(e.kind),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Provider(e) => write!(f, "{}", e),
            Error::Connection(e) => write!(f, "connection error: {}", e),
            Error::Transaction(e) => write!(f, "invalid operation: {}", e),
            Error::Generation(e) => write!(f, "value generation error: {}", e),
            Error::Config(e) => write!(f, "configuration error: {}", e),
            Error::Timeout => write!(f, "operation timed out"),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Connection(e) => e
                .source
                .as_ref()
                .map(|s| s.as_ref() as &(dyn StdError + 'static)),
            Error::Config(e) => e
                .source
                .as_ref()
                .map(|s| s.as_ref() as &(dyn StdError + 'static)),
            _ => None,
        }
    }
}

impl From<ProviderError> for Error {
    fn from(err: ProviderError) -> Self {
        Error::Provider(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<TransactionError> for Error {
    fn from(err: TransactionError) -> Self {
        Error::Transaction(err)
    }
}

impl From<GenerationError> for Error {
    fn from(err: GenerationError) -> Self {
        Error::Generation(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

/// Result alias used throughout storekit.
pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// Provider selection
// ============================================================================

/// Why provider selection failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
    /// Explicit source and no provider was registered at all.
    NoProviderServices,
    /// No provider is configured and none could be inferred.
    NoProviderConfigured,
    /// More than one provider reports itself configured.
    MultipleProvidersConfigured,
    /// None configured, but more than one reports itself available.
    MultipleProvidersAvailable,
}

/// A provider selection failure.
///
/// `providers` holds the names involved in the failure, in registration
/// order. It is empty for the "none" kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub providers: Vec<String>,
}

impl ProviderError {
    pub fn no_provider_services() -> Self {
        Self {
            kind: ProviderErrorKind::NoProviderServices,
            providers: Vec::new(),
        }
    }

    pub fn no_provider_configured() -> Self {
        Self {
            kind: ProviderErrorKind::NoProviderConfigured,
            providers: Vec::new(),
        }
    }

    pub fn multiple_configured(providers: Vec<String>) -> Self {
        Self {
            kind: ProviderErrorKind::MultipleProvidersConfigured,
            providers,
        }
    }

    pub fn multiple_available(providers: Vec<String>) -> Self {
        Self {
            kind: ProviderErrorKind::MultipleProvidersAvailable,
            providers,
        }
    }

    /// Render the user-facing diagnostic.
    pub fn message(&self) -> String {
        match self.kind {
            ProviderErrorKind::NoProviderServices => {
                "No database provider services have been registered. Register at least one \
                 database provider before creating a unit of work."
                    .to_string()
            }
            ProviderErrorKind::NoProviderConfigured => {
                "No database provider has been configured and none could be inferred. Name a \
                 database provider in the context options."
                    .to_string()
            }
            ProviderErrorKind::MultipleProvidersConfigured => format!(
                "The database providers {}are configured. A context can only be configured to \
                 use a single database provider.",
                format_provider_names(&self.providers)
            ),
            ProviderErrorKind::MultipleProvidersAvailable => format!(
                "The database providers {}are available. A context can only be configured to \
                 use a single database provider. Name a database provider in the context options.",
                format_provider_names(&self.providers)
            ),
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl StdError for ProviderError {}

/// Format provider names for diagnostics: each single-quoted and followed by
/// one space, in the given order (`'A' 'B' `).
pub fn format_provider_names<S: AsRef<str>>(names: &[S]) -> String {
    let mut out = String::new();
    for name in names {
        out.push('\'');
        out.push_str(name.as_ref());
        out.push_str("' ");
    }
    out
}

// ============================================================================
// Connection
// ============================================================================

/// Category of a connection failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Could not establish the connection.
    Connect,
    /// Server refused the connection.
    Refused,
    /// Credentials were rejected.
    Authentication,
    /// Connection dropped while in use.
    Disconnected,
    /// Operation requires an open connection.
    NotOpen,
}

/// A connection failure reported by a driver.
#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn StdError + Send + Sync>>,
}

impl ConnectionError {
    pub fn new(kind: ConnectionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

// ============================================================================
// Transaction
// ============================================================================

/// Category of a transaction state failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// A transaction is already active on the connection.
    AlreadyActive,
    /// The transaction was already committed or rolled back.
    Completed,
    /// The owning connection was closed while the transaction was active.
    ConnectionClosed,
    /// Another operation on the same transaction is still in flight.
    Busy,
    /// A savepoint name failed validation.
    InvalidSavepoint,
}

/// A transaction state failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
}

impl TransactionError {
    pub fn new(kind: TransactionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn already_active() -> Self {
        Self::new(
            TransactionErrorKind::AlreadyActive,
            "The connection is already in a transaction and cannot participate in another \
             transaction.",
        )
    }

    pub fn completed() -> Self {
        Self::new(
            TransactionErrorKind::Completed,
            "This transaction has completed; it is no longer usable.",
        )
    }

    pub fn busy() -> Self {
        Self::new(
            TransactionErrorKind::Busy,
            "Another operation is in progress on this transaction.",
        )
    }

    pub fn connection_closed() -> Self {
        Self::new(
            TransactionErrorKind::ConnectionClosed,
            "The connection owning this transaction has been closed; it is no longer usable.",
        )
    }
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

// ============================================================================
// Value generation
// ============================================================================

/// Category of a value generation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationErrorKind {
    /// The generator ran out of representable values.
    Exhausted,
    /// The backing key source failed.
    Source,
    /// An erased value did not have the requested type.
    TypeMismatch,
}

/// A value generation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationError {
    pub kind: GenerationErrorKind,
    pub message: String,
}

impl GenerationError {
    pub fn new(kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration could not be loaded.
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn StdError + Send + Sync>>,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError {
            message: format!("invalid context settings: {}", err),
            source: Some(Box::new(err)),
        }
    }
}
