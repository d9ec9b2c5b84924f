//! Core Database Backend Traits
//!
//! The runner never talks to a driver directly. It needs two things: run a
//! statement on its own, and run several statements inside one transaction
//! that either commits or rolls back as a whole.

use async_trait::async_trait;
use sqlparser::dialect::{Dialect, PostgreSqlDialect, SQLiteDialect};

use crate::error::MigrationResult;
use crate::migrations::definitions::AppliedRecord;

/// Database handle the migration runner executes against
#[async_trait]
pub trait MigrationBackend: Send + Sync {
    /// SQL dialect spoken by this backend
    fn sql_dialect(&self) -> SqlDialect;

    /// Execute a single statement outside any transaction
    async fn execute(&self, sql: &str) -> MigrationResult<u64>;

    /// Check whether a table (optionally `schema.table`) exists
    async fn table_exists(&self, table: &str) -> MigrationResult<bool>;

    /// Run a tracking-table query selecting `version, name, applied_at, checksum`
    async fn fetch_applied(&self, sql: &str) -> MigrationResult<Vec<AppliedRecord>>;

    /// Begin a transaction
    async fn begin_transaction(&self) -> MigrationResult<Box<dyn MigrationTransaction>>;

    /// Close the underlying pool
    async fn close(&self);
}

/// An open transaction; dropping it without `commit` rolls it back
#[async_trait]
pub trait MigrationTransaction: Send {
    /// Execute a migration body verbatim; it may hold several statements
    async fn execute_script(&mut self, sql: &str) -> MigrationResult<()>;

    /// Execute one statement with text parameters bound in order
    async fn execute(&mut self, sql: &str, params: &[String]) -> MigrationResult<u64>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> MigrationResult<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> MigrationResult<()>;
}

/// SQL dialect differences the migration system cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    PostgreSQL,
    SQLite,
}

impl SqlDialect {
    /// Bind placeholder for the 1-based parameter `index`
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::PostgreSQL => format!("${}", index),
            SqlDialect::SQLite => "?".to_string(),
        }
    }

    /// Parser dialect used when counting statements for reports
    pub fn parser_dialect(&self) -> Box<dyn Dialect> {
        match self {
            SqlDialect::PostgreSQL => Box::new(PostgreSqlDialect {}),
            SqlDialect::SQLite => Box::new(SQLiteDialect {}),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(SqlDialect::PostgreSQL.placeholder(1), "$1");
        assert_eq!(SqlDialect::PostgreSQL.placeholder(3), "$3");
        assert_eq!(SqlDialect::SQLite.placeholder(2), "?");
    }
}
