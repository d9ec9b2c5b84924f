//! Applied-state store: the tracking table recording which migrations ran.
//!
//! Reads go through the backend directly. Writes only happen through a
//! transaction handed in by the runner, so a tracking row commits or rolls
//! back together with the migration it describes.

use std::sync::Arc;

use super::definitions::AppliedRecord;
use crate::backends::{MigrationBackend, MigrationTransaction, SqlDialect};
use crate::error::MigrationResult;

/// Tracking table access for one backend
#[derive(Clone)]
pub struct TrackingStore {
    backend: Arc<dyn MigrationBackend>,
    table: String,
}

impl TrackingStore {
    /// `table` must already be a validated identifier
    pub fn new(backend: Arc<dyn MigrationBackend>, table: impl Into<String>) -> Self {
        Self {
            backend,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the tracking table and its index if they do not exist
    pub async fn ensure_schema(&self) -> MigrationResult<()> {
        let dialect = self.backend.sql_dialect();
        self.backend
            .execute(&create_tracking_table_sql(dialect, &self.table))
            .await?;
        self.backend
            .execute(&create_tracking_index_sql(dialect, &self.table))
            .await?;
        tracing::debug!("Tracking table {} is ready", self.table);
        Ok(())
    }

    pub async fn table_exists(&self) -> MigrationResult<bool> {
        self.backend.table_exists(&self.table).await
    }

    /// Applied records ordered by version; empty when the table is missing
    pub async fn list_applied(&self) -> MigrationResult<Vec<AppliedRecord>> {
        if !self.table_exists().await? {
            return Ok(Vec::new());
        }
        self.backend
            .fetch_applied(&list_applied_sql(&self.table))
            .await
    }

    /// Insert a tracking row inside the migration's transaction
    pub async fn record_applied(
        &self,
        tx: &mut dyn MigrationTransaction,
        version: &str,
        name: &str,
        checksum: &str,
    ) -> MigrationResult<()> {
        let sql = record_applied_sql(self.backend.sql_dialect(), &self.table);
        tx.execute(
            &sql,
            &[version.to_string(), name.to_string(), checksum.to_string()],
        )
        .await?;
        Ok(())
    }

    /// Delete a tracking row inside the rollback's transaction
    pub async fn remove_applied(
        &self,
        tx: &mut dyn MigrationTransaction,
        version: &str,
    ) -> MigrationResult<()> {
        let sql = remove_applied_sql(self.backend.sql_dialect(), &self.table);
        tx.execute(&sql, &[version.to_string()]).await?;
        Ok(())
    }
}

/// SQL to create the migrations tracking table
fn create_tracking_table_sql(dialect: SqlDialect, table: &str) -> String {
    match dialect {
        SqlDialect::PostgreSQL => format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                id SERIAL PRIMARY KEY,\n    \
                version VARCHAR(255) UNIQUE NOT NULL,\n    \
                name VARCHAR(255) NOT NULL,\n    \
                applied_at TIMESTAMP DEFAULT NOW(),\n    \
                checksum VARCHAR(64) NOT NULL\n\
            )",
            table
        ),
        SqlDialect::SQLite => format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                id INTEGER PRIMARY KEY AUTOINCREMENT,\n    \
                version TEXT UNIQUE NOT NULL,\n    \
                name TEXT NOT NULL,\n    \
                applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,\n    \
                checksum TEXT NOT NULL\n\
            )",
            table
        ),
    }
}

/// PostgreSQL creates the index in the table's schema; SQLite wants the schema on the index name
fn create_tracking_index_sql(dialect: SqlDialect, table: &str) -> String {
    let (schema, bare) = match table.split_once('.') {
        Some((schema, bare)) => (Some(schema), bare),
        None => (None, table),
    };
    match (dialect, schema) {
        (SqlDialect::SQLite, Some(schema)) => format!(
            "CREATE INDEX IF NOT EXISTS {}.idx_{}_version ON {} (version)",
            schema, bare, bare
        ),
        _ => format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_version ON {} (version)",
            bare, table
        ),
    }
}

fn list_applied_sql(table: &str) -> String {
    format!(
        "SELECT version, name, applied_at, checksum FROM {} ORDER BY version ASC",
        table
    )
}

fn record_applied_sql(dialect: SqlDialect, table: &str) -> String {
    format!(
        "INSERT INTO {} (version, name, checksum) VALUES ({}, {}, {})",
        table,
        dialect.placeholder(1),
        dialect.placeholder(2),
        dialect.placeholder(3)
    )
}

fn remove_applied_sql(dialect: SqlDialect, table: &str) -> String {
    format!(
        "DELETE FROM {} WHERE version = {}",
        table,
        dialect.placeholder(1)
    )
}
