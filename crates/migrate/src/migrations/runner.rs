//! Migration Runner - Executes migrations against the database
//!
//! Coordinates the file store and the tracking table. The runner holds no
//! migration state of its own: every operation rescans the directory and
//! rereads the tracking table.
//!
//! Each migration runs in its own transaction together with its tracking
//! row. A batch stops at the first failure, so the database is always left
//! at the last migration that committed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::definitions::{
    GeneratedMigration, MigrateOptions, MigrationDefinition, MigrationDirection,
    MigrationRunResult, MigrationStatus, MigrationStatusEntry, MigrationSummary,
};
use super::manager::{is_blank_sql, MigrationManager};
use super::tracking::TrackingStore;
use crate::backends::{self, MigrationBackend, MigrationTransaction};
use crate::error::{MigrationError, MigrationResult};

/// Migration runner that executes migrations against a database
pub struct MigrationRunner {
    manager: MigrationManager,
    backend: Arc<dyn MigrationBackend>,
    tracking: TrackingStore,
}

impl MigrationRunner {
    /// Create a new migration runner
    pub fn new(manager: MigrationManager, backend: Arc<dyn MigrationBackend>) -> Self {
        let table = manager.config().migrations_table.clone();
        let tracking = TrackingStore::new(backend.clone(), table);
        Self {
            manager,
            backend,
            tracking,
        }
    }

    /// Create a new migration runner from database URL
    pub async fn from_url(manager: MigrationManager, database_url: &str) -> MigrationResult<Self> {
        let backend = backends::connect(database_url).await?;
        Ok(Self::new(manager, backend))
    }

    /// Get the migration manager
    pub fn manager(&self) -> &MigrationManager {
        &self.manager
    }

    /// Get the database backend
    pub fn backend(&self) -> &Arc<dyn MigrationBackend> {
        &self.backend
    }

    pub(super) fn tracking(&self) -> &TrackingStore {
        &self.tracking
    }

    /// Create the tracking table if needed. Safe to call repeatedly.
    pub async fn initialize(&self) -> MigrationResult<()> {
        self.tracking.ensure_schema().await?;
        tracing::info!("Migration tracking table {} initialized", self.tracking.table());
        Ok(())
    }

    /// Write a new up/down file pair; does not touch the database
    pub async fn generate_migration(&self, name: &str) -> MigrationResult<GeneratedMigration> {
        self.manager.create_migration(name).await
    }

    /// Get migration status for every migration on disk, ordered by version
    pub async fn status(&self) -> MigrationResult<Vec<MigrationStatusEntry>> {
        self.tracking.ensure_schema().await?;

        let all_migrations = self.manager.load_migrations().await?;
        let applied: HashMap<String, _> = self
            .tracking
            .list_applied()
            .await?
            .into_iter()
            .map(|record| (record.version.clone(), record))
            .collect();

        let known: HashSet<&str> = all_migrations.iter().map(|m| m.version.as_str()).collect();
        for version in applied.keys().filter(|v| !known.contains(v.as_str())) {
            tracing::debug!("Applied migration {} has no files on disk", version);
        }

        Ok(all_migrations
            .into_iter()
            .map(|migration| {
                let status = match applied.get(&migration.version) {
                    Some(record) => MigrationStatus::Applied {
                        applied_at: record.applied_at,
                    },
                    None => MigrationStatus::Pending,
                };
                MigrationStatusEntry {
                    version: migration.version,
                    name: migration.name,
                    status,
                }
            })
            .collect())
    }

    /// Apply pending migrations in ascending version order.
    ///
    /// With a target only versions `<= target` are applied. A dry run
    /// reports the plan and leaves the database untouched, including the
    /// tracking table.
    pub async fn run_migrations(
        &self,
        options: &MigrateOptions,
    ) -> MigrationResult<MigrationRunResult> {
        let start_time = std::time::Instant::now();

        if let Some(target) = &options.target {
            self.manager.validate_version(target)?;
        }
        if !options.dry_run {
            self.tracking.ensure_schema().await?;
        }

        let all_migrations = self.manager.load_migrations().await?;
        let applied_versions: HashSet<String> = self
            .tracking
            .list_applied()
            .await?
            .into_iter()
            .map(|record| record.version)
            .collect();

        let (already_applied, mut pending): (Vec<_>, Vec<_>) = all_migrations
            .iter()
            .partition(|m| applied_versions.contains(&m.version));

        if let Some(target) = &options.target {
            pending.retain(|m| m.version.as_str() <= target.as_str());
        }
        pending.sort_by(|a, b| a.version.cmp(&b.version));

        let mut applied_migrations = Vec::with_capacity(pending.len());

        if options.dry_run {
            for migration in pending {
                tracing::info!("Would apply migration: {}", migration.id());
                applied_migrations.push(self.summarize(migration, MigrationDirection::Up));
            }
        } else {
            for migration in pending {
                tracing::info!("Applying migration: {}", migration.id());
                self.execute_migration(migration, MigrationDirection::Up)
                    .await?;
                tracing::info!("Committed migration: {}", migration.id());
                applied_migrations.push(self.summarize(migration, MigrationDirection::Up));
            }
        }

        Ok(MigrationRunResult {
            applied_migrations,
            skipped_count: already_applied.len(),
            dry_run: options.dry_run,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }

    /// Run one migration body and its tracking write in a single transaction.
    ///
    /// Any failure rolls the transaction back and comes back as
    /// `MigrationError::Execution` naming the migration.
    pub(super) async fn execute_migration(
        &self,
        migration: &MigrationDefinition,
        direction: MigrationDirection,
    ) -> MigrationResult<()> {
        self.execute_in_transaction(migration, direction)
            .await
            .map_err(|source| {
                tracing::error!(
                    "Failed to {} migration {}, transaction rolled back: {}",
                    direction,
                    migration.id(),
                    source
                );
                MigrationError::Execution {
                    version: migration.version.clone(),
                    name: migration.name.clone(),
                    direction,
                    source: Box::new(source),
                }
            })
    }

    async fn execute_in_transaction(
        &self,
        migration: &MigrationDefinition,
        direction: MigrationDirection,
    ) -> MigrationResult<()> {
        let mut transaction = self.backend.begin_transaction().await?;

        match self
            .execute_statements(&mut *transaction, migration, direction)
            .await
        {
            Ok(()) => transaction.commit().await,
            Err(e) => {
                if let Err(rollback_error) = transaction.rollback().await {
                    tracing::warn!(
                        "Rollback of {} failed, connection will discard it: {}",
                        migration.id(),
                        rollback_error
                    );
                }
                Err(e)
            }
        }
    }

    async fn execute_statements(
        &self,
        transaction: &mut dyn MigrationTransaction,
        migration: &MigrationDefinition,
        direction: MigrationDirection,
    ) -> MigrationResult<()> {
        let sql = migration.sql(direction);
        if !is_blank_sql(sql) {
            transaction.execute_script(sql).await?;
        }

        match direction {
            MigrationDirection::Up => {
                self.tracking
                    .record_applied(
                        transaction,
                        &migration.version,
                        &migration.name,
                        &migration.checksum(),
                    )
                    .await
            }
            MigrationDirection::Down => {
                self.tracking
                    .remove_applied(transaction, &migration.version)
                    .await
            }
        }
    }

    pub(super) fn summarize(
        &self,
        migration: &MigrationDefinition,
        direction: MigrationDirection,
    ) -> MigrationSummary {
        let dialect = self.backend.sql_dialect().parser_dialect();
        MigrationSummary {
            version: migration.version.clone(),
            name: migration.name.clone(),
            statement_count: self
                .manager
                .split_sql_statements(migration.sql(direction), dialect.as_ref())
                .len(),
        }
    }
}
