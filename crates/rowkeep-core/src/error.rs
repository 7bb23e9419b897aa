//! Error types for the data-access layer.
//!
//! All fallible operations return [`DalError`]. Failures coming from a
//! collaborator (a connection, a driver) are wrapped in
//! [`DalError::Context`] naming the operation and entity type, so the
//! caller sees both what went wrong and where. Use [`DalError::root`] to
//! look past the context layers.

use std::fmt;

/// Boxed error from an underlying driver.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convenience alias used throughout the workspace.
pub type Result<T, E = DalError> = std::result::Result<T, E>;

/// Store operation during which an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Writing an entity.
    Save,
    /// Reading an entity by identity.
    Load,
    /// Removing an entity.
    Delete,
    /// Checking whether an entity exists.
    Exists,
    /// Running a caller-built read query.
    GetData,
    /// Opening or closing a connection.
    Connect,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Save => "save",
            Self::Load => "load",
            Self::Delete => "delete",
            Self::Exists => "exists",
            Self::GetData => "get_data",
            Self::Connect => "connect",
        })
    }
}

/// Errors that can occur in the data-access layer.
#[derive(Debug, thiserror::Error)]
pub enum DalError {
    /// A property that is not declared on the entity type was referenced.
    #[error("unknown property `{property}` on {entity}")]
    UnknownProperty {
        /// Entity type name.
        entity: String,
        /// The property that was referenced.
        property: String,
    },

    /// A value of the wrong shape was given for a property.
    #[error("invalid value for `{property}` on {entity}: expected {expected}")]
    InvalidValue {
        /// Entity type name.
        entity: String,
        /// The property being assigned or read.
        property: String,
        /// What the property accepts.
        expected: &'static str,
    },

    /// No row matched the entity's identity.
    #[error("{entity} not found for id {id}")]
    NotFound {
        /// Entity type name.
        entity: String,
        /// Rendered identity that was looked up.
        id: String,
    },

    /// The registry has no store bound to the requested name.
    #[error("no data store registered as `{0}`")]
    StoreNotFound(String),

    /// The underlying driver failed to connect or execute.
    #[error("connection error: {message}")]
    Connection {
        /// Human-readable description.
        message: String,
        /// The driver error, when there is one.
        #[source]
        source: Option<BoxError>,
    },

    /// The store rejected a statement.
    #[error("execution error [{code}]: {message}")]
    Execution {
        /// Driver specific error code (SQLSTATE, CQL error code, ...).
        code: String,
        /// Driver error message.
        message: String,
    },

    /// An entity schema is malformed.
    #[error("schema error: {0}")]
    Schema(String),

    /// Configuration is invalid or missing.
    #[error("configuration error: {0}")]
    Config(String),

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A collaborator failure annotated with the operation and entity type.
    #[error("{operation} {entity} failed: {source}")]
    Context {
        /// The store operation that failed.
        operation: Operation,
        /// Entity type name.
        entity: String,
        /// The wrapped failure.
        #[source]
        source: Box<DalError>,
    },
}

impl DalError {
    /// Build a [`DalError::Connection`] from a message alone.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Build a [`DalError::Connection`] wrapping a driver error.
    pub fn connection_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Wrap this error with the operation and entity type it occurred in.
    ///
    /// Errors that already describe the entity (`NotFound`,
    /// `UnknownProperty`, ...) and errors that already carry context are
    /// returned unchanged.
    #[must_use]
    pub fn context(self, operation: Operation, entity: &str) -> Self {
        match self {
            Self::Connection { .. } | Self::Execution { .. } | Self::Serialization(_) => {
                Self::Context {
                    operation,
                    entity: entity.to_owned(),
                    source: Box::new(self),
                }
            }
            other => other,
        }
    }

    /// The innermost error, looking through any context layers.
    pub fn root(&self) -> &Self {
        let mut current = self;
        while let Self::Context { source, .. } = current {
            current = source;
        }
        current
    }

    /// Whether the root cause is [`DalError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Self::NotFound { .. })
    }

    /// Whether the root cause is [`DalError::Connection`].
    pub fn is_connection(&self) -> bool {
        matches!(self.root(), Self::Connection { .. })
    }

    /// Whether the root cause is [`DalError::Execution`].
    pub fn is_execution(&self) -> bool {
        matches!(self.root(), Self::Execution { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_wraps_collaborator_failures() {
        let err = DalError::connection("socket closed").context(Operation::Save, "User");
        assert!(matches!(err, DalError::Context { operation: Operation::Save, .. }));
        assert!(err.is_connection());
        assert_eq!(err.to_string(), "save User failed: connection error: socket closed");
    }

    #[test]
    fn context_leaves_domain_errors_alone() {
        let err = DalError::NotFound {
            entity: "User".to_owned(),
            id: "a@x.com".to_owned(),
        }
        .context(Operation::Load, "User");
        assert!(matches!(err, DalError::NotFound { .. }));
        assert!(err.is_not_found());
    }

    #[test]
    fn context_is_not_nested_twice() {
        let err = DalError::Execution {
            code: "42P01".to_owned(),
            message: "relation does not exist".to_owned(),
        }
        .context(Operation::Load, "User")
        .context(Operation::Save, "Other");
        assert!(matches!(
            &err,
            DalError::Context { operation: Operation::Load, entity, source }
                if entity == "User" && matches!(**source, DalError::Execution { .. })
        ));
        assert!(err.is_execution());
    }
}
