//! Error types for tablegate

use thiserror::Error;

use crate::types::PermKind;

/// Stable, client-facing error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    AlreadyExists,
    NotDefined,
    NotFound,
    NotSupported,
    InvalidLimit,
    PredicateError,
    RelationshipNotAllowed,
    ValidationFailed,
    InvalidCommand,
    Storage,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::AlreadyExists => "already-exists",
            ErrorCode::NotDefined => "not-defined",
            ErrorCode::NotFound => "not-found",
            ErrorCode::NotSupported => "not-supported",
            ErrorCode::InvalidLimit => "invalid-limit",
            ErrorCode::PredicateError => "predicate-error",
            ErrorCode::RelationshipNotAllowed => "relationship-not-allowed",
            ErrorCode::ValidationFailed => "validation-failed",
            ErrorCode::InvalidCommand => "invalid-command",
            ErrorCode::Storage => "storage",
        }
    }
}

/// The main error type for tablegate operations
#[derive(Debug, Error)]
pub enum PermError {
    #[error("{kind} permission already defined on table {table:?} with role {role:?}")]
    AlreadyExists { kind: PermKind, table: String, role: String },

    #[error("{kind} permission on table {table:?} is not defined for role {role:?}")]
    NotDefined { kind: PermKind, table: String, role: String },

    #[error("source {0:?} does not exist")]
    SourceNotFound(String),

    #[error("table {table:?} does not exist in source {source_name:?}")]
    TableNotFound { source_name: String, table: String },

    #[error("column {column:?} not found in table {table:?}")]
    ColumnNotFound { table: String, column: String },

    #[error("computed field {name:?} not found in table {table:?}")]
    ComputedFieldNotFound { table: String, name: String },

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("unexpected limit {0}: limit must be a positive integer")]
    InvalidLimit(i64),

    #[error("{0}")]
    Predicate(String),

    #[error("{name:?} is a relationship of table {table:?}, expected a column")]
    RelationshipNotAllowed { table: String, name: String },

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("{}: {inner}", .path.join("."))]
    Located { path: Vec<String>, inner: Box<PermError> },
}

impl PermError {
    /// Prefix the error location with `segment` (outermost call wins the front)
    pub fn at(self, segment: impl Into<String>) -> Self {
        match self {
            PermError::Located { mut path, inner } => {
                path.insert(0, segment.into());
                PermError::Located { path, inner }
            }
            other => PermError::Located { path: vec![segment.into()], inner: Box::new(other) },
        }
    }

    /// Dotted location of the failure, e.g. `permission.set.author_id`
    pub fn path(&self) -> Option<String> {
        match self {
            PermError::Located { path, .. } => Some(path.join(".")),
            _ => None,
        }
    }

    /// The error with any location stripped
    pub fn root(&self) -> &PermError {
        match self {
            PermError::Located { inner, .. } => inner.root(),
            other => other,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            PermError::Located { inner, .. } => inner.code(),
            PermError::AlreadyExists { .. } => ErrorCode::AlreadyExists,
            PermError::NotDefined { .. } => ErrorCode::NotDefined,
            PermError::SourceNotFound(_)
            | PermError::TableNotFound { .. }
            | PermError::ColumnNotFound { .. }
            | PermError::ComputedFieldNotFound { .. } => ErrorCode::NotFound,
            PermError::NotSupported(_) => ErrorCode::NotSupported,
            PermError::InvalidLimit(_) => ErrorCode::InvalidLimit,
            PermError::Predicate(_) => ErrorCode::PredicateError,
            PermError::RelationshipNotAllowed { .. } => ErrorCode::RelationshipNotAllowed,
            PermError::ValidationFailed(_) => ErrorCode::ValidationFailed,
            PermError::InvalidCommand(_) | PermError::Json(_) => ErrorCode::InvalidCommand,
            PermError::Storage(_) => ErrorCode::Storage,
        }
    }

    /// HTTP status for the metadata endpoint
    pub fn status_code(&self) -> u16 {
        match self.code() {
            ErrorCode::NotFound | ErrorCode::NotDefined => 404,
            ErrorCode::AlreadyExists => 409,
            ErrorCode::Storage => 500,
            _ => 400,
        }
    }
}

/// Result type alias for tablegate operations
pub type Result<T> = std::result::Result<T, PermError>;

/// Convert a storage-layer error to PermError
pub fn err<E: std::error::Error>(e: E) -> PermError {
    PermError::Storage(e.to_string())
}
