//! # Error Types
//!
//! Restore errors fall into two kinds. **Fatal** errors describe a request that
//! can never succeed as written (malformed spec, cyclic lineage, restore time
//! outside the continuous window, missing source pod). They are surfaced as the
//! restore request's failure message and never retried. Everything else is
//! **transient**: the external scheduler re-invokes the engine and already
//! persisted progress is picked up again.

use crate::config::ConfigurationError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RestoreError {
    /// Non-retriable failure; becomes the restore request's failure message.
    #[error("{0}")]
    Fatal(String),
    #[error("{kind} \"{name}\" not found")]
    NotFound { kind: String, name: String },
    #[error("{kind} \"{name}\" already exists")]
    AlreadyExists { kind: String, name: String },
    #[error("Control plane error: {0}")]
    ControlPlane(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl RestoreError {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn already_exists(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Whether retrying can never fix this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_) | Self::Configuration(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Promote a not-found lookup into a fatal error, leaving other errors untouched.
    pub fn fatal_if_not_found(self) -> Self {
        match self {
            Self::NotFound { .. } => Self::Fatal(self.to_string()),
            other => other,
        }
    }
}

impl From<serde_json::Error> for RestoreError {
    fn from(error: serde_json::Error) -> Self {
        RestoreError::Serialization(format!("JSON serialization error: {error}"))
    }
}

impl From<serde_yaml::Error> for RestoreError {
    fn from(error: serde_yaml::Error) -> Self {
        RestoreError::Serialization(format!("YAML serialization error: {error}"))
    }
}

impl From<ConfigurationError> for RestoreError {
    fn from(error: ConfigurationError) -> Self {
        RestoreError::Configuration(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RestoreError>;

/// Ignore a not-found error, mapping it to `Ok(())`.
pub fn ignore_not_found(result: Result<()>) -> Result<()> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

/// Ignore an already-exists error, mapping it to `Ok(())`.
pub fn ignore_already_exists(result: Result<()>) -> Result<()> {
    match result {
        Err(e) if e.is_already_exists() => Ok(()),
        other => other,
    }
}
