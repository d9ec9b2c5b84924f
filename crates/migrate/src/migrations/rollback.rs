//! Migration Rollback - Handles rolling back applied migrations
//!
//! Executes DOWN bodies in reverse version order so the most recent schema
//! change is always undone first.

use std::collections::HashMap;

use super::definitions::{MigrateOptions, MigrationDefinition, MigrationDirection, RollbackResult};
use super::runner::MigrationRunner;
use crate::error::MigrationResult;

impl MigrationRunner {
    /// Roll back applied migrations whose version is greater than `target`.
    ///
    /// Without a target this rolls back **every** applied migration, newest
    /// first, not only the most recent one. Applied versions whose files are
    /// gone are skipped with a warning and reported in `skipped`; any other
    /// failure stops the batch.
    pub async fn rollback(&self, options: &MigrateOptions) -> MigrationResult<RollbackResult> {
        let start_time = std::time::Instant::now();

        if let Some(target) = &options.target {
            self.manager().validate_version(target)?;
        }
        if !options.dry_run {
            self.tracking().ensure_schema().await?;
        }

        let mut selected = self.tracking().list_applied().await?;
        if let Some(target) = &options.target {
            selected.retain(|record| record.version.as_str() > target.as_str());
        }
        selected.sort_by(|a, b| b.version.cmp(&a.version));

        if selected.is_empty() {
            tracing::debug!("Nothing to roll back");
        }

        // Load all migration files to get DOWN SQL
        let migration_map: HashMap<String, MigrationDefinition> = self
            .manager()
            .load_migrations()
            .await?
            .into_iter()
            .map(|m| (m.version.clone(), m))
            .collect();

        let mut rolled_back_migrations = Vec::with_capacity(selected.len());
        let mut skipped = Vec::new();

        for record in selected {
            let Some(migration) = migration_map.get(&record.version) else {
                tracing::warn!(
                    "Cannot roll back {}_{}: migration files not found, skipping",
                    record.version,
                    record.name
                );
                skipped.push(record.version);
                continue;
            };

            if migration.name != record.name {
                tracing::debug!(
                    "Migration {} was applied as '{}' and is now named '{}'",
                    record.version,
                    record.name,
                    migration.name
                );
            }

            if options.dry_run {
                tracing::info!("Would roll back migration: {}", migration.id());
            } else {
                tracing::info!("Rolling back migration: {}", migration.id());
                self.execute_migration(migration, MigrationDirection::Down)
                    .await?;
                tracing::info!("Committed rollback of migration: {}", migration.id());
            }
            rolled_back_migrations.push(self.summarize(migration, MigrationDirection::Down));
        }

        Ok(RollbackResult {
            rolled_back_migrations,
            skipped,
            dry_run: options.dry_run,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }
}
