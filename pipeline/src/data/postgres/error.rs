//! PostgreSQL error types

use thiserror::Error;

/// Errors from the relational store
#[derive(Error, Debug)]
pub enum PostgresError {
    /// Database error from sqlx
    #[error("PostgreSQL error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration failed
    #[error("Migration {version} ({name}) failed: {error}")]
    MigrationFailed {
        version: i32,
        name: String,
        error: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A row violated an application-level invariant
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl PostgresError {
    /// Whether the error is connection-class and worth a bounded retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_transient() {
        assert!(PostgresError::Database(sqlx::Error::PoolTimedOut).is_transient());
        assert!(PostgresError::Database(sqlx::Error::PoolClosed).is_transient());
    }

    #[test]
    fn test_config_and_conflict_are_not_transient() {
        assert!(!PostgresError::Config("bad url".into()).is_transient());
        assert!(!PostgresError::Conflict("duplicate".into()).is_transient());
    }

    #[test]
    fn test_migration_error_display() {
        let err = PostgresError::MigrationFailed {
            version: 2,
            name: "add_symptoms".to_string(),
            error: "syntax error".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Migration 2 (add_symptoms) failed: syntax error"
        );
    }
}
