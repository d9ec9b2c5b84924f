//! SQLite Backend Implementation
//!
//! SQLite is used for embedded databases and for exercising the runner in
//! tests. Its DDL is transactional, so rollback semantics match PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Executor, Row, Sqlite, SqlitePool, Transaction};
use std::str::FromStr;

use super::core::*;
use crate::error::MigrationResult;
use crate::migrations::definitions::AppliedRecord;

/// SQLite database backend implementation
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Wrap an existing pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the database, creating the file when missing.
    ///
    /// A single connection keeps `sqlite::memory:` databases alive and
    /// serializes all work, which is what the runner wants anyway.
    pub async fn connect(database_url: &str) -> MigrationResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        tracing::debug!("Connected to SQLite");
        Ok(Self::new(pool))
    }

    /// Get the database pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl MigrationBackend for SqliteBackend {
    fn sql_dialect(&self) -> SqlDialect {
        SqlDialect::SQLite
    }

    async fn execute(&self, sql: &str) -> MigrationResult<u64> {
        let result = sqlx::query(sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn table_exists(&self, table: &str) -> MigrationResult<bool> {
        let (master, name) = match table.split_once('.') {
            Some((schema, name)) => (format!("{}.sqlite_master", schema), name),
            None => ("sqlite_master".to_string(), table),
        };

        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE type = 'table' AND name = ?",
            master
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(name)
            .fetch_one(&self.pool)
            .await?;

        Ok(count > 0)
    }

    async fn fetch_applied(&self, sql: &str) -> MigrationResult<Vec<AppliedRecord>> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            // CURRENT_TIMESTAMP is stored as UTC text
            let applied_at: NaiveDateTime = row.try_get("applied_at")?;
            records.push(AppliedRecord {
                version: row.try_get("version")?,
                name: row.try_get("name")?,
                applied_at: DateTime::from_naive_utc_and_offset(applied_at, Utc),
                checksum: row.try_get("checksum")?,
            });
        }

        Ok(records)
    }

    async fn begin_transaction(&self) -> MigrationResult<Box<dyn MigrationTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteTransaction { tx }))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// SQLite transaction
pub struct SqliteTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl MigrationTransaction for SqliteTransaction {
    async fn execute_script(&mut self, sql: &str) -> MigrationResult<()> {
        (&mut *self.tx).execute(sql).await?;
        Ok(())
    }

    async fn execute(&mut self, sql: &str, params: &[String]) -> MigrationResult<u64> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = query.bind(param.as_str());
        }
        let result = query.execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> MigrationResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> MigrationResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
