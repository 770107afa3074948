//! Error type for the data layer

use thiserror::Error;

/// Error type for store operations
///
/// Wraps backend errors and the schema-level failures that stores detect
/// before issuing SQL.
#[derive(Error, Debug)]
pub enum DataError {
    /// PostgreSQL database error
    #[error("PostgreSQL error: {0}")]
    Postgres(sqlx::Error),

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

    /// A table or column the operation relies on does not exist
    #[error("Schema error: {0}")]
    Schema(String),
}

impl DataError {
    pub fn migration_failed(version: i32, name: &str, error: &str) -> Self {
        Self::MigrationFailed {
            version,
            name: name.to_string(),
            error: error.to_string(),
        }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }

    /// Check if this is a connection-related error that might be transient
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Postgres(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            _ => false,
        }
    }
}

/// Convert from the PostgreSQL backend error
impl From<crate::data::postgres::PostgresError> for DataError {
    fn from(e: crate::data::postgres::PostgresError) -> Self {
        match e {
            crate::data::postgres::PostgresError::Database(e) => Self::Postgres(e),
            crate::data::postgres::PostgresError::MigrationFailed {
                version,
                name,
                error,
            } => Self::MigrationFailed {
                version,
                name,
                error,
            },
            crate::data::postgres::PostgresError::Config(msg) => Self::Config(msg),
            crate::data::postgres::PostgresError::MissingTable(table) => {
                Self::Schema(format!("table {} does not exist", table))
            }
        }
    }
}
