//! Error types for the connection layer.
//!
//! Connections report failures as [`DbError`], which wraps the underlying
//! [`sqlx`] and [`fred`] errors. Mappers convert them into
//! [`DalError`](rowkeep_core::DalError) and attach the operation and entity
//! type before they reach the caller.

use rowkeep_core::DalError;

/// Errors that can occur talking to a backing store.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Connecting did not finish within the configured timeout.
    #[error("Timed out connecting to {0}")]
    Timeout(String),

    /// The store refused a statement.
    #[error("Statement rejected [{code}]: {message}")]
    Rejected {
        /// Store specific error code.
        code: String,
        /// Human-readable reason.
        message: String,
    },

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<DbError> for DalError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Postgres(sqlx::Error::Database(db)) => Self::Execution {
                code: db.code().map(std::borrow::Cow::into_owned).unwrap_or_default(),
                message: db.message().to_owned(),
            },
            DbError::Postgres(e) => {
                let message = format!("PostgreSQL error: {e}");
                Self::connection_with(message, e)
            }
            DbError::Dragonfly(e) => {
                let message = format!("Dragonfly error: {e}");
                Self::connection_with(message, e)
            }
            DbError::Serialization(e) => Self::Serialization(e),
            DbError::Timeout(target) => Self::connection(format!("timed out connecting to {target}")),
            DbError::Rejected { code, message } => Self::Execution { code, message },
            DbError::Config(message) => Self::Config(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_statements_become_execution_errors() {
        let err = DalError::from(DbError::Rejected {
            code: "injected".to_owned(),
            message: "boom".to_owned(),
        });
        assert!(err.is_execution());
        assert_eq!(err.to_string(), "execution error [injected]: boom");
    }

    #[test]
    fn driver_failures_become_connection_errors() {
        let err = DalError::from(DbError::Postgres(sqlx::Error::PoolTimedOut));
        assert!(err.is_connection());
        assert!(DalError::from(DbError::Timeout("postgres".to_owned())).is_connection());
    }

    #[test]
    fn config_errors_keep_their_message() {
        let err = DalError::from(DbError::Config("missing url".to_owned()));
        assert!(matches!(err, DalError::Config(m) if m == "missing url"));
    }
}
