//! Error types shared by the store, the services and the dispatcher.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by every layer of the core.
#[derive(Debug, Error)]
pub enum AppError {
    /// The store was used before `initialize()` or after `close()`.
    #[error("database not initialized; call initialize() first")]
    NotInitialized,

    /// A transaction (or a plain handle borrow) was requested while the
    /// current thread already holds an open transaction.
    #[error("nested transactions are not supported")]
    NestedTransaction,

    /// Underlying SQLite read/write fault.
    #[error("storage error during {operation} on `{table}`: {source}")]
    Storage {
        operation: &'static str,
        table: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// Re-parenting would make a collection its own ancestor.
    #[error("cannot move collection {id} under {new_parent_id}: it would create a cycle")]
    Cycle { id: i64, new_parent_id: i64 },

    /// No registered protocol client accepts the URL scheme.
    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    /// Network-level failure (DNS, refused connection, timeout).
    #[error("request failed: {0}")]
    Transport(String),

    /// The operation requires an entity that does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("invalid URL `{0}`")]
    InvalidUrl(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("failed to access `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience alias for results with [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;

/// Stable, serializable discriminant of [`AppError`] for callers across the
/// command boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    NotInitialized,
    NestedTransaction,
    Storage,
    Cycle,
    UnsupportedProtocol,
    Transport,
    NotFound,
    InvalidUrl,
    InvalidRequest,
    Io,
    Config,
}

impl AppError {
    pub(crate) fn storage(
        operation: &'static str,
        table: &'static str,
        source: rusqlite::Error,
    ) -> Self {
        AppError::Storage {
            operation,
            table,
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotInitialized => ErrorKind::NotInitialized,
            AppError::NestedTransaction => ErrorKind::NestedTransaction,
            AppError::Storage { .. } => ErrorKind::Storage,
            AppError::Cycle { .. } => ErrorKind::Cycle,
            AppError::UnsupportedProtocol(_) => ErrorKind::UnsupportedProtocol,
            AppError::Transport(_) => ErrorKind::Transport,
            AppError::NotFound { .. } => ErrorKind::NotFound,
            AppError::InvalidUrl(_) => ErrorKind::InvalidUrl,
            AppError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            AppError::Io { .. } => ErrorKind::Io,
            AppError::Config(_) => ErrorKind::Config,
        }
    }

    /// True when the error is SQLite rejecting a dangling foreign key.
    pub fn is_foreign_key_violation(&self) -> bool {
        match self {
            AppError::Storage {
                source: rusqlite::Error::SqliteFailure(err, _),
                ..
            } => err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_names_operation_and_table() {
        let err = AppError::storage("findById", "collections", rusqlite::Error::InvalidQuery);
        let message = err.to_string();
        assert!(message.contains("findById"));
        assert!(message.contains("`collections`"));
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[test]
    fn foreign_key_violation_is_detected() {
        let err = AppError::storage(
            "create",
            "requests",
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY),
                Some("FOREIGN KEY constraint failed".into()),
            ),
        );
        assert!(err.is_foreign_key_violation());
        assert!(!AppError::NotInitialized.is_foreign_key_violation());
    }
}
