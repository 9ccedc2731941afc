//! Context configuration.
//!
//! [`ContextOptions`] is the provider-agnostic configuration object a context
//! hands to every registered provider's `is_configured` predicate. The
//! selector never looks inside it.
//!
//! Options carry two things:
//!
//! - plain [`ContextSettings`] (provider name, connection string, timeouts)
//!   that can be loaded from JSON, and
//! - typed extensions, one per provider, so a provider can recognise its own
//!   configuration block without the core knowing its type.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::isolation::IsolationLevel;

/// Serializable context settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    /// Name of the provider the caller wants (matched by providers, not here).
    pub provider: Option<String>,
    /// Connection string handed to the provider's connection factory.
    pub connection_string: Option<String>,
    /// Command timeout in seconds applied to newly created connections.
    pub command_timeout_secs: Option<u64>,
    /// Isolation level used by `begin_transaction()` without an explicit level.
    pub default_isolation: IsolationLevel,
}

/// Options for one context, passed to provider predicates.
#[derive(Clone, Default)]
pub struct ContextOptions {
    settings: ContextSettings,
    command_timeout: Option<Duration>,
    extensions: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ContextOptions {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create options from plain settings.
    pub fn from_settings(settings: ContextSettings) -> Self {
        Self {
            command_timeout: settings.command_timeout_secs.map(Duration::from_secs),
            settings,
            extensions: HashMap::new(),
        }
    }

    /// Load settings from a JSON document.
    ///
    /// Unknown keys are rejected so typos in provider names or timeouts
    /// surface as configuration errors.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json).map_err(ConfigError::from)?;
        if let Some(obj) = value.as_object() {
            for key in obj.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    return Err(
                        ConfigError::new(format!("unknown context setting '{}'", key)).into(),
                    );
                }
            }
        }
        let settings: ContextSettings = serde_json::from_value(value).map_err(ConfigError::from)?;
        tracing::debug!(
            provider = settings.provider.as_deref().unwrap_or("<none>"),
            "Loaded context settings"
        );
        Ok(Self::from_settings(settings))
    }

    /// Name the provider to use.
    pub fn with_provider(mut self, name: impl Into<String>) -> Self {
        self.settings.provider = Some(name.into());
        self
    }

    /// Set the connection string.
    pub fn with_connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.settings.connection_string = Some(connection_string.into());
        self
    }

    /// Set the command timeout.
    ///
    /// The exact duration reaches connections. The serializable settings
    /// record it rounded up to whole seconds, never down to zero.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        let secs = timeout
            .as_secs()
            .saturating_add(u64::from(timeout.subsec_nanos() > 0));
        self.settings.command_timeout_secs = Some(secs);
        self.command_timeout = Some(timeout);
        self
    }

    /// Set the default isolation level.
    pub fn with_default_isolation(mut self, level: IsolationLevel) -> Self {
        self.settings.default_isolation = level;
        self
    }

    /// Attach a typed extension, replacing any previous one of the same type.
    pub fn with_extension<T: Any + Send + Sync>(mut self, extension: T) -> Self {
        self.extensions
            .insert(TypeId::of::<T>(), Arc::new(extension));
        self
    }

    /// Find a typed extension.
    pub fn find_extension<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|ext| ext.downcast_ref::<T>())
    }

    /// The plain settings.
    pub fn settings(&self) -> &ContextSettings {
        &self.settings
    }

    /// The named provider, if any.
    pub fn provider(&self) -> Option<&str> {
        self.settings.provider.as_deref()
    }

    /// Whether the options name `provider` (ASCII case-insensitive).
    pub fn names_provider(&self, provider: &str) -> bool {
        self.provider()
            .is_some_and(|name| name.eq_ignore_ascii_case(provider))
    }

    pub fn connection_string(&self) -> Option<&str> {
        self.settings.connection_string.as_deref()
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout
    }

    pub fn default_isolation(&self) -> IsolationLevel {
        self.settings.default_isolation
    }
}

const KNOWN_KEYS: &[&str] = &[
    "provider",
    "connection_string",
    "command_timeout_secs",
    "default_isolation",
];

impl std::fmt::Debug for ContextOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextOptions")
            .field("settings", &self.settings)
            .field("command_timeout", &self.command_timeout)
            .field("extensions", &self.extensions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[derive(Debug, PartialEq)]
    struct SqliteOptions {
        path: String,
    }

    #[test]
    fn test_builder_setters() {
        let options = ContextOptions::new()
            .with_provider("Sqlite")
            .with_connection_string("file::memory:")
            .with_command_timeout(Duration::from_secs(30))
            .with_default_isolation(IsolationLevel::Serializable);

        assert_eq!(options.provider(), Some("Sqlite"));
        assert!(options.names_provider("sqlite"));
        assert!(!options.names_provider("Postgres"));
        assert_eq!(options.connection_string(), Some("file::memory:"));
        assert_eq!(options.command_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(options.default_isolation(), IsolationLevel::Serializable);
    }

    #[test]
    fn test_sub_second_timeout_is_kept() {
        let options = ContextOptions::new().with_command_timeout(Duration::from_millis(500));
        assert_eq!(options.command_timeout(), Some(Duration::from_millis(500)));
        assert_eq!(options.settings().command_timeout_secs, Some(1));

        let options = ContextOptions::new().with_command_timeout(Duration::from_millis(2001));
        assert_eq!(options.settings().command_timeout_secs, Some(3));
    }

    #[test]
    fn test_extensions_are_typed() {
        let options = ContextOptions::new().with_extension(SqliteOptions {
            path: "app.db".to_string(),
        });
        assert_eq!(
            options.find_extension::<SqliteOptions>(),
            Some(&SqliteOptions {
                path: "app.db".to_string()
            })
        );
        assert!(options.find_extension::<String>().is_none());
    }

    #[test]
    fn test_from_json() {
        let options = ContextOptions::from_json(
            r#"{"provider": "Postgres", "command_timeout_secs": 15, "default_isolation": "read_committed"}"#,
        )
        .unwrap();
        assert_eq!(options.provider(), Some("Postgres"));
        assert_eq!(options.command_timeout(), Some(Duration::from_secs(15)));
        assert_eq!(options.default_isolation(), IsolationLevel::ReadCommitted);
        assert_eq!(options.connection_string(), None);
    }

    #[test]
    fn test_from_json_rejects_unknown_keys() {
        let err = ContextOptions::from_json(r#"{"providr": "Postgres"}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("providr"));
    }

    #[test]
    fn test_from_json_rejects_malformed() {
        let err = ContextOptions::from_json("{not json").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
