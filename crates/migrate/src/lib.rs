//! # elif-migrate: versioned SQL migrations for elif.rs
//!
//! Discovers `<version>_<name>.up.sql` / `.down.sql` pairs on disk, records
//! applied versions in a tracking table and applies or reverts them in
//! version order, one transaction per migration.
//!
//! ```no_run
//! use elif_migrate::{MigrateOptions, MigrationConfig, MigrationManager, MigrationRunner};
//!
//! # async fn run() -> elif_migrate::MigrationResult<()> {
//! let manager = MigrationManager::with_config(MigrationConfig::with_dir("migrations"))?;
//! let runner = MigrationRunner::from_url(manager, "postgres://localhost/app").await?;
//!
//! let result = runner.run_migrations(&MigrateOptions::new()).await?;
//! println!("applied {} migrations", result.applied_count());
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod checksum;
pub mod config;
pub mod error;
pub mod migrations;

// Re-export core traits and types
pub use backends::{
    connect, MigrationBackend, MigrationTransaction, PostgresBackend, SqlDialect, SqliteBackend,
};
pub use checksum::checksum;
pub use config::{ConfigError, DatabaseConfig, EnvConfig, LoggingConfig, MigrationConfig};
pub use error::{MigrationError, MigrationResult};
pub use migrations::*;
