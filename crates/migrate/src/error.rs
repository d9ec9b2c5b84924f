//! Error types for the migration system
//!
//! Execution-level problems (filesystem, database, a failing migration body)
//! are errors and always propagate. Discovery-level problems such as an
//! incomplete up/down pair are logged and recovered locally, so they have
//! no variant here.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::migrations::definitions::MigrationDirection;

/// Result type alias for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A migration body or its tracking-row write failed; its transaction was rolled back
    #[error("Failed to {direction} migration {version}_{name}: {source}")]
    Execution {
        version: String,
        name: String,
        direction: MigrationDirection,
        #[source]
        source: Box<MigrationError>,
    },

    #[error("Invalid migration name '{0}': use letters, digits and underscores")]
    InvalidName(String),

    #[error("Invalid target version '{target}': expected {width} digits")]
    InvalidTarget { target: String, width: usize },

    #[error("Migration file already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Unsupported database URL '{0}': expected postgres://, postgresql:// or sqlite:")]
    UnsupportedDatabase(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl MigrationError {
    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MigrationError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Version of the migration that failed, if this error came from executing one
    pub fn failed_version(&self) -> Option<&str> {
        match self {
            MigrationError::Execution { version, .. } => Some(version),
            _ => None,
        }
    }
}
