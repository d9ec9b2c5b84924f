//! Migration Definitions - Core types and structures for migrations
//!
//! Defines the types shared by the file store, the tracking table and the
//! runner: MigrationDefinition, AppliedRecord, the derived status view and
//! the results returned by each operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::checksum::checksum;

/// A migration discovered on disk: a complete up/down file pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationDefinition {
    /// Fixed-width timestamp identifying the migration's position in history
    pub version: String,
    /// Free-form slug from the filename
    pub name: String,
    /// Full text of the `.up.sql` file
    pub up_sql: String,
    /// Full text of the `.down.sql` file
    pub down_sql: String,
}

impl MigrationDefinition {
    /// `<version>_<name>`, the shared stem of both files
    pub fn id(&self) -> String {
        format!("{}_{}", self.version, self.name)
    }

    /// Fingerprint of the up and down bodies, recorded when applied
    pub fn checksum(&self) -> String {
        checksum(&self.up_sql, &self.down_sql)
    }

    /// SQL body for the given direction
    pub fn sql(&self, direction: MigrationDirection) -> &str {
        match direction {
            MigrationDirection::Up => &self.up_sql,
            MigrationDirection::Down => &self.down_sql,
        }
    }
}

/// A row of the tracking table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedRecord {
    pub version: String,
    pub name: String,
    /// Assigned by the database at insert time
    pub applied_at: DateTime<Utc>,
    pub checksum: String,
}

/// Migration direction for execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationDirection {
    /// Apply the migration (run UP statements)
    Up,
    /// Rollback the migration (run DOWN statements)
    Down,
}

impl MigrationDirection {
    /// File extension infix, `up` or `down`
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationDirection::Up => "up",
            MigrationDirection::Down => "down",
        }
    }
}

impl fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationDirection::Up => write!(f, "apply"),
            MigrationDirection::Down => write!(f, "roll back"),
        }
    }
}

/// Migration status in the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum MigrationStatus {
    /// Migration is pending (not yet applied)
    Pending,
    /// Migration has been applied
    Applied {
        /// When it was applied
        applied_at: DateTime<Utc>,
    },
}

impl MigrationStatus {
    pub fn is_applied(&self) -> bool {
        matches!(self, MigrationStatus::Applied { .. })
    }

    pub fn applied_at(&self) -> Option<DateTime<Utc>> {
        match self {
            MigrationStatus::Applied { applied_at } => Some(*applied_at),
            MigrationStatus::Pending => None,
        }
    }
}

/// One line of the status report, derived fresh on every query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStatusEntry {
    pub version: String,
    pub name: String,
    #[serde(flatten)]
    pub status: MigrationStatus,
}

/// Options shared by `up` and `down`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrateOptions {
    /// Up: apply versions `<= target`. Down: revert versions `> target`.
    pub target: Option<String>,
    /// Report the plan without touching the database
    pub dry_run: bool,
}

impl MigrateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target(mut self, version: impl Into<String>) -> Self {
        self.target = Some(version.into());
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// A migration that was (or, in a dry run, would be) executed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationSummary {
    pub version: String,
    pub name: String,
    /// Number of statements in the body that was or would be run
    pub statement_count: usize,
}

/// Paths written by `generate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedMigration {
    pub version: String,
    pub name: String,
    pub up_file: PathBuf,
    pub down_file: PathBuf,
}

/// Result of running migrations
#[derive(Debug, Clone, Serialize)]
pub struct MigrationRunResult {
    /// Migrations applied, in order; the plan when `dry_run` is set
    pub applied_migrations: Vec<MigrationSummary>,
    /// Number of migrations that were skipped (already applied)
    pub skipped_count: usize,
    pub dry_run: bool,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl MigrationRunResult {
    pub fn applied_count(&self) -> usize {
        self.applied_migrations.len()
    }
}

/// Result of rolling back migrations
#[derive(Debug, Clone, Serialize)]
pub struct RollbackResult {
    /// Migrations rolled back, most recent first; the plan when `dry_run` is set
    pub rolled_back_migrations: Vec<MigrationSummary>,
    /// Applied versions with no migration files left on disk
    pub skipped: Vec<String>,
    pub dry_run: bool,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl RollbackResult {
    pub fn rolled_back_count(&self) -> usize {
        self.rolled_back_migrations.len()
    }
}
