//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)        Business rule (CoreError)           │
//! │       │                                  │                              │
//! │       ▼                                  ▼                              │
//! │  DbError::{NotFound, Unique..}     DbError::Domain(CoreError)          │
//! │       │                                  │                              │
//! │       └──────────────┬───────────────────┘                              │
//! │                      ▼                                                  │
//! │              request layer (HTTP status / UI message)                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use hearth_core::CoreError;
use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Duplicate room number within a tenant
    /// - Second check-in / check-out row for a room booking
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Deleting a room that still has booking history
    /// - Referencing a tenant that does not exist
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Stored data could not be decoded (e.g. malformed guest JSON).
    #[error("Corrupt {entity} row {id}: {reason}")]
    Corrupt {
        entity: String,
        id: String,
        reason: String,
    },

    /// Business rule rejected the operation. Nothing was written.
    #[error(transparent)]
    Domain(#[from] CoreError),

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Returns the domain error, if this is one.
    pub fn as_domain(&self) -> Option<&CoreError> {
        match self {
            DbError::Domain(err) => Some(err),
            _ => None,
        }
    }

    /// Stable machine-readable code for the request layer.
    pub fn code(&self) -> &'static str {
        match self {
            DbError::NotFound { .. } => "NOT_FOUND",
            DbError::UniqueViolation { .. } => "DUPLICATE",
            DbError::ForeignKeyViolation { .. } => "REFERENCE_VIOLATION",
            DbError::Domain(err) => err.code(),
            _ => "DATABASE_ERROR",
        }
    }
}

impl From<hearth_core::ValidationError> for DbError {
    fn from(err: hearth_core::ValidationError) -> Self {
        DbError::Domain(CoreError::Validation(err))
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // UNIQUE constraint: "UNIQUE constraint failed: <table>.<column>"
                // FK constraint: "FOREIGN KEY constraint failed"
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
