//! PostgreSQL Backend Implementation
//!
//! This module provides the PostgreSQL-specific implementation of the
//! migration backend traits using sqlx as the underlying database driver.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool, Postgres, Row, Transaction};

use super::core::*;
use crate::error::MigrationResult;
use crate::migrations::definitions::AppliedRecord;

/// PostgreSQL database backend implementation
#[derive(Debug, Clone)]
pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    /// Wrap an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a small pool; migrations never run in parallel
    pub async fn connect(database_url: &str) -> MigrationResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(database_url)
            .await?;
        tracing::debug!("Connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    /// Get the database pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl MigrationBackend for PostgresBackend {
    fn sql_dialect(&self) -> SqlDialect {
        SqlDialect::PostgreSQL
    }

    async fn execute(&self, sql: &str) -> MigrationResult<u64> {
        let result = sqlx::query(sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn table_exists(&self, table: &str) -> MigrationResult<bool> {
        let (schema, name) = match table.split_once('.') {
            Some((schema, name)) => (Some(schema), name),
            None => (None, table),
        };

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
             WHERE table_schema = COALESCE($1::text, current_schema()) AND table_name = $2)",
        )
        .bind(schema)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn fetch_applied(&self, sql: &str) -> MigrationResult<Vec<AppliedRecord>> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
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
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// PostgreSQL transaction; DDL is transactional, so a whole migration rolls back
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl MigrationTransaction for PostgresTransaction {
    async fn execute_script(&mut self, sql: &str) -> MigrationResult<()> {
        // No bind arguments: sqlx uses the simple query protocol, which accepts many statements
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
