//! Unified error types for the data layer.
//!
//! Every resource call surfaces one of a small set of distinguishable failures so
//! callers can render an empty state for [`Error::NotFound`] instead of an alarm,
//! and prompt for a login on [`Error::Unauthenticated`]. The type is `Clone` because
//! a single de-duplicated fetch hands its outcome to every waiting consumer.

use thiserror::Error;

/// Errors produced by the client handle, resource APIs, cache, and realtime bridge.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// No valid session; raised before any network call is attempted.
    #[error("Not authenticated: {reason}")]
    Unauthenticated {
        /// Why the session was rejected or missing
        reason: String,
    },

    /// The row does not exist or is not owned by the caller.
    #[error("{resource} not found: {id}")]
    NotFound {
        /// Table the lookup ran against
        resource: String,
        /// Identifier that matched nothing
        id: String,
    },

    /// The platform (or the client) rejected the payload shape or constraints.
    #[error("Validation failed: {message}")]
    Validation {
        /// Platform or client supplied reason
        message: String,
    },

    /// Network failure, platform unavailability, or an unreadable response.
    #[error("Transport error: {message}")]
    Transport {
        /// Underlying failure description
        message: String,
    },

    /// Missing or invalid configuration, reported at first use.
    #[error("Configuration error: {message}")]
    Config {
        /// What is missing or malformed
        message: String,
    },

    /// Direct database failure while provisioning the schema.
    #[error("Database error: {message}")]
    Database {
        /// Underlying database error text
        message: String,
    },
}

/// Coarse classification of an [`Error`], convenient for matching in consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [`Error::Unauthenticated`]
    Unauthenticated,
    /// See [`Error::NotFound`]
    NotFound,
    /// See [`Error::Validation`]
    Validation,
    /// See [`Error::Transport`]
    Transport,
    /// See [`Error::Config`]
    Config,
    /// See [`Error::Database`]
    Database,
}

impl Error {
    /// Returns the classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthenticated { .. } => ErrorKind::Unauthenticated,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Config { .. } => ErrorKind::Config,
            Self::Database { .. } => ErrorKind::Database,
        }
    }

    pub(crate) fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::Unauthenticated {
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(resource: &str, id: impl ToString) -> Self {
        Self::NotFound {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<sea_orm::DbErr> for Error {
    fn from(value: sea_orm::DbErr) -> Self {
        Self::Database {
            message: value.to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Self::transport(value.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::transport(format!("realtime socket: {value}"))
    }
}

impl From<std::env::VarError> for Error {
    fn from(value: std::env::VarError) -> Self {
        Self::config(value.to_string())
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_distinguishes_every_variant() {
        assert_eq!(
            Error::unauthenticated("no session").kind(),
            ErrorKind::Unauthenticated
        );
        assert_eq!(Error::not_found("stocks", 1).kind(), ErrorKind::NotFound);
        assert_eq!(Error::validation("bad").kind(), ErrorKind::Validation);
        assert_eq!(Error::transport("down").kind(), ErrorKind::Transport);
        assert_eq!(Error::config("missing").kind(), ErrorKind::Config);
    }

    #[test]
    fn test_not_found_message_names_resource_and_id() {
        let err = Error::not_found("goals", "abc");
        assert_eq!(err.to_string(), "goals not found: abc");
    }

    #[test]
    fn test_env_var_error_is_config() {
        let err: Error = std::env::VarError::NotPresent.into();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
