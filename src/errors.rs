use std::time::Duration;

use thiserror::Error;

use crate::schema::diff::MissingMap;

/// Custom error type for agent operations.
#[derive(Error, Debug)]
pub enum DbError {
    /// Unreadable or invalid declaration (config file, model list).
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Unsupported database driver: {0}")]
    UnsupportedDriver(String),
    /// Connection error (e.g., issues with network or database connection).
    #[error("Connection error: {0}")]
    Connection(String),
    /// Introspection query failure.
    #[error("Query error: {0}")]
    Query(String),
    #[error("Schema mismatch: {missing}")]
    SchemaMismatch { missing: MissingMap },
    #[error("Unsupported type {declared:?} for column {table}.{column}")]
    UnsupportedType {
        table: String,
        column: String,
        declared: String,
    },
    #[error("Migration error: {0}")]
    Migration(String),
    /// The store reported a duplicate object (table, column or role).
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Role {0} already exists")]
    RoleExists(String),
    #[error("Grant error: {0}")]
    Grant(String),
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}
