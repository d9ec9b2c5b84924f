//! Database Backend Abstractions
//!
//! This module provides the database capability consumed by the migration
//! runner, with sqlx-backed implementations for PostgreSQL and SQLite.

pub mod core;
pub mod postgres;
pub mod sqlite;

use std::sync::Arc;

// Re-export core traits and types
pub use core::*;
pub use postgres::PostgresBackend;
pub use sqlite::SqliteBackend;

use crate::error::{MigrationError, MigrationResult};

/// Database backend type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseBackendType {
    PostgreSQL,
    SQLite,
}

impl DatabaseBackendType {
    /// Pick the backend from a database URL scheme
    pub fn from_url(url: &str) -> MigrationResult<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(DatabaseBackendType::PostgreSQL)
        } else if url.starts_with("sqlite:") {
            Ok(DatabaseBackendType::SQLite)
        } else {
            Err(MigrationError::UnsupportedDatabase(url.to_string()))
        }
    }
}

impl std::fmt::Display for DatabaseBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseBackendType::PostgreSQL => write!(f, "postgresql"),
            DatabaseBackendType::SQLite => write!(f, "sqlite"),
        }
    }
}

/// Connect to the database named by `database_url`
pub async fn connect(database_url: &str) -> MigrationResult<Arc<dyn MigrationBackend>> {
    let backend: Arc<dyn MigrationBackend> = match DatabaseBackendType::from_url(database_url)? {
        DatabaseBackendType::PostgreSQL => Arc::new(PostgresBackend::connect(database_url).await?),
        DatabaseBackendType::SQLite => Arc::new(SqliteBackend::connect(database_url).await?),
    };
    Ok(backend)
}
