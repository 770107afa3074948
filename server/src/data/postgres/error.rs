//! PostgreSQL error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PostgresError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration {version} ({name}) failed: {error}")]
    MigrationFailed {
        version: i32,
        name: String,
        error: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Table {0} does not exist")]
    MissingTable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_failed_error_display() {
        let err = PostgresError::MigrationFailed {
            version: 1,
            name: "topic_registry".to_string(),
            error: "syntax error".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Migration 1 (topic_registry) failed: syntax error"
        );
    }

    #[test]
    fn test_config_error_display() {
        let err = PostgresError::Config("missing URL".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing URL");
    }

    #[test]
    fn test_missing_table_display() {
        let err = PostgresError::MissingTable("sensor_room1".to_string());
        assert_eq!(err.to_string(), "Table sensor_room1 does not exist");
    }
}
