//! Configuration for the migration system
//!
//! Everything can be built in code or loaded from environment variables.

use std::env;
use std::path::PathBuf;
use thiserror::Error;

/// Default tracking table name
pub const DEFAULT_MIGRATIONS_TABLE: &str = "migrations_tracking";

/// Width of a `YYYYMMDDHHMMSS` version string
pub const DEFAULT_VERSION_WIDTH: usize = 14;

/// Configuration loaded from the process environment
pub trait EnvConfig: Sized {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self, ConfigError>;

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError>;
}

/// Configuration for the migration system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationConfig {
    /// Directory where migration files are stored
    pub migrations_dir: PathBuf,
    /// Table name for tracking applied migrations, optionally `schema.table`
    pub migrations_table: String,
    /// Exact number of digits in a migration version
    pub version_width: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("migrations"),
            migrations_table: DEFAULT_MIGRATIONS_TABLE.to_string(),
            version_width: DEFAULT_VERSION_WIDTH,
        }
    }
}

impl MigrationConfig {
    /// Default configuration rooted at the given directory
    pub fn with_dir(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
            ..Self::default()
        }
    }
}

impl EnvConfig for MigrationConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let migrations_dir = get_env_or_default("MIGRATIONS_DIR", "migrations");
        let migrations_table = get_env_or_default("MIGRATIONS_TABLE", DEFAULT_MIGRATIONS_TABLE);

        let version_width = get_env_or_default("MIGRATIONS_VERSION_WIDTH", "14");
        let version_width = version_width
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidValue {
                field: "version_width".to_string(),
                value: version_width,
                expected: "a positive number".to_string(),
            })?;

        let config = MigrationConfig {
            migrations_dir: PathBuf::from(migrations_dir),
            migrations_table,
            version_width,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.migrations_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed {
                field: "migrations_dir".to_string(),
                reason: "Migrations directory cannot be empty".to_string(),
            });
        }

        if !is_valid_table_name(&self.migrations_table) {
            return Err(ConfigError::InvalidValue {
                field: "migrations_table".to_string(),
                value: self.migrations_table.clone(),
                expected: "a lower-case identifier or schema.identifier".to_string(),
            });
        }

        if self.version_width == 0 {
            return Err(ConfigError::ValidationFailed {
                field: "version_width".to_string(),
                reason: "Version width cannot be 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Logging configuration consumed by binaries installing a subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl EnvConfig for LoggingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let config = LoggingConfig {
            level: get_env_or_default("LOG_LEVEL", "info"),
            format: get_env_or_default("LOG_FORMAT", "compact"),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "level".to_string(),
                value: self.level.clone(),
                expected: "trace, debug, info, warn, or error".to_string(),
            });
        }

        let valid_formats = ["compact", "pretty", "json"];
        if !valid_formats.contains(&self.format.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "format".to_string(),
                value: self.format.clone(),
                expected: "compact, pretty, or json".to_string(),
            });
        }

        Ok(())
    }
}

/// Database URL, required from `DATABASE_URL` when loaded from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
}

impl EnvConfig for DatabaseConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let config = DatabaseConfig {
            url: get_env_required("DATABASE_URL")?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::ValidationFailed {
                field: "url".to_string(),
                reason: "Database URL cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Tracking table names are interpolated into SQL unquoted, so only plain
/// lower-case identifiers pass. PostgreSQL folds unquoted names to lower case,
/// and a mixed-case name would never match its own catalog entry.
pub fn is_valid_table_name(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.is_empty() || parts.len() > 2 {
        return false;
    }

    parts.iter().all(|part| {
        let mut chars = part.chars();
        match chars.next() {
            Some(first) if first.is_ascii_lowercase() || first == '_' => {
                chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            }
            _ => false,
        }
    })
}

fn get_env_required(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnvVar {
        var: key.to_string(),
    })
}

fn get_env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}")]
    MissingEnvVar { var: String },

    #[error("Invalid value for {field}: '{value}', expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Validation failed for {field}: {reason}")]
    ValidationFailed { field: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clean_test_env() {
        env::remove_var("MIGRATIONS_DIR");
        env::remove_var("MIGRATIONS_TABLE");
        env::remove_var("MIGRATIONS_VERSION_WIDTH");
        env::remove_var("DATABASE_URL");
        env::remove_var("LOG_LEVEL");
        env::remove_var("LOG_FORMAT");
    }

    #[test]
    #[serial]
    fn test_migration_config_defaults() {
        clean_test_env();

        let config = MigrationConfig::from_env().unwrap();
        assert_eq!(config, MigrationConfig::default());
        assert_eq!(config.migrations_dir, PathBuf::from("migrations"));
        assert_eq!(config.migrations_table, "migrations_tracking");
        assert_eq!(config.version_width, 14);
    }

    #[test]
    #[serial]
    fn test_migration_config_from_env() {
        clean_test_env();
        env::set_var("MIGRATIONS_DIR", "db/migrations");
        env::set_var("MIGRATIONS_TABLE", "meta.schema_history");
        env::set_var("MIGRATIONS_VERSION_WIDTH", "12");

        let config = MigrationConfig::from_env().unwrap();
        assert_eq!(config.migrations_dir, PathBuf::from("db/migrations"));
        assert_eq!(config.migrations_table, "meta.schema_history");
        assert_eq!(config.version_width, 12);

        clean_test_env();
    }

    #[test]
    #[serial]
    fn test_migration_config_rejects_bad_values() {
        clean_test_env();
        env::set_var("MIGRATIONS_VERSION_WIDTH", "wide");
        assert!(matches!(
            MigrationConfig::from_env(),
            Err(ConfigError::InvalidValue { .. })
        ));

        env::set_var("MIGRATIONS_VERSION_WIDTH", "14");
        env::set_var("MIGRATIONS_TABLE", "tracking; DROP TABLE users");
        assert!(matches!(
            MigrationConfig::from_env(),
            Err(ConfigError::InvalidValue { .. })
        ));

        clean_test_env();
    }

    #[test]
    #[serial]
    fn test_database_config_requires_url() {
        clean_test_env();
        assert!(matches!(
            DatabaseConfig::from_env(),
            Err(ConfigError::MissingEnvVar { .. })
        ));

        env::set_var("DATABASE_URL", "sqlite::memory:");
        assert_eq!(DatabaseConfig::from_env().unwrap().url, "sqlite::memory:");

        clean_test_env();
    }

    #[test]
    #[serial]
    fn test_logging_config_validation() {
        clean_test_env();
        env::set_var("LOG_LEVEL", "verbose");
        assert!(LoggingConfig::from_env().is_err());

        env::set_var("LOG_LEVEL", "debug");
        env::set_var("LOG_FORMAT", "json");
        let config = LoggingConfig::from_env().unwrap();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, "json");

        clean_test_env();
    }

    #[test]
    fn test_table_name_validation() {
        assert!(is_valid_table_name("migrations_tracking"));
        assert!(is_valid_table_name("public.migrations_tracking"));
        assert!(is_valid_table_name("_private"));
        assert!(!is_valid_table_name(""));
        assert!(!is_valid_table_name("1table"));
        assert!(!is_valid_table_name("a.b.c"));
        assert!(!is_valid_table_name("users; --"));
        assert!(!is_valid_table_name("schema."));
    }

    #[test]
    fn test_table_name_must_be_lower_case() {
        assert!(is_valid_table_name("schema_history"));
        assert!(is_valid_table_name("meta.schema_history_2"));
        assert!(!is_valid_table_name("Schema_History"));
        assert!(!is_valid_table_name("Meta.schema_history"));

        let config = MigrationConfig {
            migrations_table: "Schema_History".to_string(),
            ..MigrationConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "migrations_table"
        ));
    }
}
