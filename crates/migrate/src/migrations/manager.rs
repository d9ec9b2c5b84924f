//! Migration Manager - File system operations for migrations
//!
//! Handles creating, loading, and parsing migration files from the filesystem.
//! Every migration is a pair of files sharing a `<version>_<name>` stem:
//!
//! ```text
//! 20240101120000_add_users.up.sql
//! 20240101120000_add_users.down.sql
//! ```

use chrono::Utc;
use regex::Regex;
use sqlparser::dialect::Dialect;
use sqlparser::parser::Parser;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::definitions::{GeneratedMigration, MigrationDefinition, MigrationDirection};
use crate::config::{EnvConfig, MigrationConfig};
use crate::error::{MigrationError, MigrationResult};

/// `<digits>_<word chars>.<up|down>.sql`; version width is checked separately
const MIGRATION_FILE_PATTERN: &str = r"^([0-9]+)_([A-Za-z0-9_]+)\.(up|down)\.sql$";

const HEADER_NAME_PREFIX: &str = "-- Migration:";

static FILE_PATTERN: OnceLock<Regex> = OnceLock::new();

fn file_pattern() -> &'static Regex {
    FILE_PATTERN.get_or_init(|| {
        Regex::new(MIGRATION_FILE_PATTERN).expect("migration file pattern is a valid regex")
    })
}

/// Migration manager for creating and loading migrations
#[derive(Debug, Clone)]
pub struct MigrationManager {
    config: MigrationConfig,
}

#[derive(Default)]
struct FilePair {
    up: Option<PathBuf>,
    down: Option<PathBuf>,
}

impl MigrationManager {
    /// Create a new migration manager with default configuration
    pub fn new() -> MigrationResult<Self> {
        Self::with_config(MigrationConfig::default())
    }

    /// Create a new migration manager with custom configuration
    pub fn with_config(config: MigrationConfig) -> MigrationResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Get the configuration
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Create a new up/down migration file pair
    pub async fn create_migration(&self, name: &str) -> MigrationResult<GeneratedMigration> {
        let name = normalize_name(name)?;
        let dir = &self.config.migrations_dir;

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| MigrationError::filesystem(dir, e))?;

        let now = Utc::now();
        let version = format_version(
            &now.format("%Y%m%d%H%M%S").to_string(),
            self.config.version_width,
        );

        if let Some(existing) = self.find_version_file(&version).await? {
            return Err(MigrationError::AlreadyExists(existing));
        }

        let created = now.format("%Y-%m-%d %H:%M:%S UTC").to_string();
        let up_file = dir.join(migration_filename(&version, &name, MigrationDirection::Up));
        let down_file = dir.join(migration_filename(&version, &name, MigrationDirection::Down));

        write_new_file(
            &up_file,
            &migration_template(&name, &created, MigrationDirection::Up),
        )?;
        if let Err(e) = write_new_file(
            &down_file,
            &migration_template(&name, &created, MigrationDirection::Down),
        ) {
            // Leave no half-written pair behind
            let _ = std::fs::remove_file(&up_file);
            return Err(e);
        }

        tracing::info!("Created migration {}_{}", version, name);

        Ok(GeneratedMigration {
            version,
            name,
            up_file,
            down_file,
        })
    }

    /// Load all complete migrations from the migrations directory, ordered by version
    pub async fn load_migrations(&self) -> MigrationResult<Vec<MigrationDefinition>> {
        let dir = &self.config.migrations_dir;
        let exists = tokio::fs::try_exists(dir)
            .await
            .map_err(|e| MigrationError::filesystem(dir, e))?;
        if !exists {
            tracing::debug!("Migrations directory {} does not exist", dir.display());
            return Ok(Vec::new());
        }

        let mut pairs: BTreeMap<(String, String), FilePair> = BTreeMap::new();
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| MigrationError::filesystem(dir, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| MigrationError::filesystem(dir, e))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| MigrationError::filesystem(&path, e))?;
            if !file_type.is_file() {
                continue;
            }

            let Some(filename) = path.file_name().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some((version, name, direction)) = self.parse_filename(filename) else {
                tracing::trace!("Ignoring non-migration file {}", filename);
                continue;
            };

            if version.len() != self.config.version_width {
                tracing::warn!(
                    "Skipping {}: version must be exactly {} digits",
                    filename,
                    self.config.version_width
                );
                continue;
            }

            let pair = pairs.entry((version, name)).or_default();
            match direction {
                MigrationDirection::Up => pair.up = Some(path),
                MigrationDirection::Down => pair.down = Some(path),
            }
        }

        let mut by_version: BTreeMap<String, Vec<MigrationDefinition>> = BTreeMap::new();
        for ((version, name), pair) in pairs {
            let (up_path, down_path) = match (pair.up, pair.down) {
                (Some(up), Some(down)) => (up, down),
                (up, _) => {
                    let missing = if up.is_none() { "up" } else { "down" };
                    tracing::warn!(
                        "Skipping migration {}_{}: missing {} file",
                        version,
                        name,
                        missing
                    );
                    continue;
                }
            };

            let up_sql = read_migration_file(&up_path).await?;
            let down_sql = read_migration_file(&down_path).await?;

            by_version
                .entry(version.clone())
                .or_default()
                .push(MigrationDefinition {
                    version,
                    name,
                    up_sql,
                    down_sql,
                });
        }

        let mut migrations = Vec::with_capacity(by_version.len());
        for (version, mut group) in by_version {
            if group.len() > 1 {
                let names: Vec<&str> = group.iter().map(|m| m.name.as_str()).collect();
                tracing::warn!(
                    "Skipping version {}: claimed by several migrations ({})",
                    version,
                    names.join(", ")
                );
                continue;
            }
            migrations.append(&mut group);
        }

        // BTreeMap iteration is already ordered; the invariant is that callers get version order
        migrations.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(migrations)
    }

    /// Split a filename into version, name and direction
    fn parse_filename(&self, filename: &str) -> Option<(String, String, MigrationDirection)> {
        let captures = file_pattern().captures(filename)?;
        let direction = match &captures[3] {
            "up" => MigrationDirection::Up,
            "down" => MigrationDirection::Down,
            _ => return None,
        };
        Some((captures[1].to_string(), captures[2].to_string(), direction))
    }

    /// Check that a target version has the configured width
    pub fn validate_version(&self, version: &str) -> MigrationResult<()> {
        let width = self.config.version_width;
        if version.len() == width && version.bytes().all(|b| b.is_ascii_digit()) {
            Ok(())
        } else {
            Err(MigrationError::InvalidTarget {
                target: version.to_string(),
                width,
            })
        }
    }

    async fn find_version_file(&self, version: &str) -> MigrationResult<Option<PathBuf>> {
        let dir = &self.config.migrations_dir;
        let prefix = format!("{}_", version);
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| MigrationError::filesystem(dir, e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| MigrationError::filesystem(dir, e))?
        {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                return Ok(Some(entry.path()));
            }
        }
        Ok(None)
    }

    /// Split SQL statements using proper SQL parsing
    pub fn split_sql_statements(&self, sql: &str, dialect: &dyn Dialect) -> Vec<String> {
        match Parser::parse_sql(dialect, sql) {
            Ok(parsed_statements) => parsed_statements
                .into_iter()
                .map(|stmt| format!("{};", stmt))
                .collect(),
            Err(e) => {
                // Counting only; the body itself is always sent to the database verbatim
                tracing::debug!("SQL parsing failed, using naive semicolon splitting: {}", e);
                sql.split(';')
                    .map(strip_comment_lines)
                    .filter(|s| !s.is_empty())
                    .map(|s| format!("{};", s))
                    .collect()
            }
        }
    }
}

/// Extract the migration name from a generated file's header
pub fn parse_header_name(content: &str) -> Option<String> {
    content
        .lines()
        .map(str::trim)
        .take_while(|line| line.starts_with("--") || line.is_empty())
        .find_map(|line| line.strip_prefix(HEADER_NAME_PREFIX))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Lower-case the name and turn spaces and hyphens into underscores
fn normalize_name(name: &str) -> MigrationResult<String> {
    let normalized = name.trim().to_lowercase().replace([' ', '-'], "_");
    if normalized.is_empty()
        || !normalized
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(MigrationError::InvalidName(name.to_string()));
    }
    Ok(normalized)
}

/// Fit a 14-digit timestamp to the configured width
fn format_version(timestamp: &str, width: usize) -> String {
    if width <= timestamp.len() {
        timestamp[..width].to_string()
    } else {
        format!("{:0<width$}", timestamp, width = width)
    }
}

fn migration_filename(version: &str, name: &str, direction: MigrationDirection) -> String {
    format!("{}_{}.{}.sql", version, name, direction.as_str())
}

fn migration_template(name: &str, created: &str, direction: MigrationDirection) -> String {
    let body = match direction {
        MigrationDirection::Up => "-- Add your schema changes here",
        MigrationDirection::Down => "-- Add rollback statements here",
    };
    format!(
        "{} {}\n\
         -- Created: {}\n\
         -- Direction: {}\n\n\
         {}\n",
        HEADER_NAME_PREFIX,
        name,
        created,
        direction.as_str().to_uppercase(),
        body
    )
}

fn write_new_file(path: &Path, content: &str) -> MigrationResult<()> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => MigrationError::AlreadyExists(path.to_path_buf()),
            _ => MigrationError::filesystem(path, e),
        })?;
    file.write_all(content.as_bytes())
        .map_err(|e| MigrationError::filesystem(path, e))
}

async fn read_migration_file(path: &Path) -> MigrationResult<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| MigrationError::filesystem(path, e))
}

/// True when a body holds nothing but whitespace and `--` comments
pub(crate) fn is_blank_sql(sql: &str) -> bool {
    sql.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

fn strip_comment_lines(sql: &str) -> String {
    sql.lines()
        .filter(|line| !line.trim().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::GenericDialect;
    use std::fs;
    use tempfile::TempDir;

    fn manager_for(dir: &TempDir) -> MigrationManager {
        MigrationManager::with_config(MigrationConfig::with_dir(dir.path())).unwrap()
    }

    fn write(dir: &TempDir, filename: &str, content: &str) {
        fs::write(dir.path().join(filename), content).unwrap();
    }

    #[tokio::test]
    async fn test_create_migration_writes_pair_with_header() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("db").join("migrations");
        let manager = MigrationManager::with_config(MigrationConfig::with_dir(&nested)).unwrap();

        let generated = manager.create_migration("Create Users-Table").await.unwrap();

        assert_eq!(generated.name, "create_users_table");
        assert_eq!(generated.version.len(), 14);
        assert!(generated.version.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(
            generated.up_file,
            nested.join(format!("{}_create_users_table.up.sql", generated.version))
        );

        let up = fs::read_to_string(&generated.up_file).unwrap();
        let down = fs::read_to_string(&generated.down_file).unwrap();
        assert!(up.starts_with("-- Migration: create_users_table\n-- Created: "));
        assert!(up.contains("-- Direction: UP"));
        assert!(down.contains("-- Direction: DOWN"));
        assert_eq!(parse_header_name(&up).as_deref(), Some("create_users_table"));

        // A fresh pair is immediately discoverable
        let migrations = manager.load_migrations().await.unwrap();
        assert_eq!(migrations.len(), 1);
        assert_eq!(migrations[0].version, generated.version);
    }

    #[tokio::test]
    async fn test_create_migration_rejects_invalid_names() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_for(&temp_dir);

        for name in ["", "   ", "drop;table", "naïve"] {
            assert!(matches!(
                manager.create_migration(name).await,
                Err(MigrationError::InvalidName(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_create_migration_refuses_version_collision() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_for(&temp_dir);

        let first = manager.create_migration("first").await.unwrap();

        let existing = manager.find_version_file(&first.version).await.unwrap();
        assert!(existing.is_some());
        assert!(manager.find_version_file("19990101000000").await.unwrap().is_none());

        assert!(matches!(
            write_new_file(&first.up_file, "-- clobbered"),
            Err(MigrationError::AlreadyExists(_))
        ));
        let up = fs::read_to_string(&first.up_file).unwrap();
        assert!(up.starts_with("-- Migration: first"));
    }

    #[tokio::test]
    async fn test_load_migrations_pairs_and_sorts() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_for(&temp_dir);

        write(&temp_dir, "20240101130000_add_posts.up.sql", "CREATE TABLE posts (id INTEGER);");
        write(&temp_dir, "20240101130000_add_posts.down.sql", "DROP TABLE posts;");
        write(&temp_dir, "20240101120000_add_users.down.sql", "DROP TABLE users;");
        write(&temp_dir, "20240101120000_add_users.up.sql", "CREATE TABLE users (id INTEGER);");

        let migrations = manager.load_migrations().await.unwrap();
        assert_eq!(migrations.len(), 2);
        assert_eq!(migrations[0].version, "20240101120000");
        assert_eq!(migrations[0].name, "add_users");
        assert_eq!(migrations[0].up_sql, "CREATE TABLE users (id INTEGER);");
        assert_eq!(migrations[0].down_sql, "DROP TABLE users;");
        assert_eq!(migrations[1].name, "add_posts");
    }

    #[tokio::test]
    async fn test_load_migrations_skips_incomplete_and_foreign_files() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_for(&temp_dir);

        write(&temp_dir, "20240101120000_add_users.up.sql", "CREATE TABLE users (id INTEGER);");
        write(&temp_dir, "20240101120000_add_users.down.sql", "DROP TABLE users;");
        // up without down
        write(&temp_dir, "20240102120000_orphan.up.sql", "SELECT 1;");
        // down without up
        write(&temp_dir, "20240103120000_lonely.down.sql", "SELECT 1;");
        // wrong width
        write(&temp_dir, "20240104_short.up.sql", "SELECT 1;");
        write(&temp_dir, "20240104_short.down.sql", "SELECT 1;");
        // grammar misses
        write(&temp_dir, "README.md", "docs");
        write(&temp_dir, "20240105120000_legacy.sql", "SELECT 1;");
        write(&temp_dir, "20240106120000_bad-name.up.sql", "SELECT 1;");
        fs::create_dir(temp_dir.path().join("20240107120000_dir.up.sql")).unwrap();

        let migrations = manager.load_migrations().await.unwrap();
        assert_eq!(migrations.len(), 1);
        assert_eq!(migrations[0].id(), "20240101120000_add_users");
    }

    #[tokio::test]
    async fn test_load_migrations_drops_duplicate_versions() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_for(&temp_dir);

        for name in ["alpha", "beta"] {
            write(&temp_dir, &format!("20240101120000_{}.up.sql", name), "SELECT 1;");
            write(&temp_dir, &format!("20240101120000_{}.down.sql", name), "SELECT 1;");
        }
        write(&temp_dir, "20240101130000_gamma.up.sql", "SELECT 1;");
        write(&temp_dir, "20240101130000_gamma.down.sql", "SELECT 1;");

        let migrations = manager.load_migrations().await.unwrap();
        assert_eq!(migrations.len(), 1);
        assert_eq!(migrations[0].name, "gamma");
    }

    #[tokio::test]
    async fn test_load_migrations_missing_directory_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let manager = MigrationManager::with_config(MigrationConfig::with_dir(
            temp_dir.path().join("missing"),
        ))
        .unwrap();

        assert!(manager.load_migrations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_migrations_unreadable_directory_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let not_a_dir = temp_dir.path().join("plain_file");
        fs::write(&not_a_dir, "not a directory").unwrap();

        let manager = MigrationManager::with_config(MigrationConfig::with_dir(
            not_a_dir.join("migrations"),
        ))
        .unwrap();

        match manager.load_migrations().await {
            Err(MigrationError::Filesystem { path, .. }) => {
                assert_eq!(path, not_a_dir.join("migrations"));
            }
            other => panic!("expected filesystem error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_custom_version_width() {
        let temp_dir = TempDir::new().unwrap();
        let config = MigrationConfig {
            version_width: 8,
            ..MigrationConfig::with_dir(temp_dir.path())
        };
        let manager = MigrationManager::with_config(config).unwrap();

        write(&temp_dir, "20240101_daily.up.sql", "SELECT 1;");
        write(&temp_dir, "20240101_daily.down.sql", "SELECT 1;");
        write(&temp_dir, "20240101120000_precise.up.sql", "SELECT 1;");
        write(&temp_dir, "20240101120000_precise.down.sql", "SELECT 1;");

        let migrations = manager.load_migrations().await.unwrap();
        assert_eq!(migrations.len(), 1);
        assert_eq!(migrations[0].name, "daily");

        let generated = manager.create_migration("next").await.unwrap();
        assert_eq!(generated.version.len(), 8);
    }

    #[test]
    fn test_validate_version() {
        let manager = MigrationManager::new().unwrap();
        assert!(manager.validate_version("20240101120000").is_ok());
        assert!(matches!(
            manager.validate_version("2024"),
            Err(MigrationError::InvalidTarget { width: 14, .. })
        ));
        assert!(manager.validate_version("2024010112000a").is_err());
    }

    #[test]
    fn test_format_version() {
        assert_eq!(format_version("20240101120000", 14), "20240101120000");
        assert_eq!(format_version("20240101120000", 8), "20240101");
        assert_eq!(format_version("20240101120000", 16), "2024010112000000");
    }

    #[test]
    fn test_split_sql_statements() {
        let manager = MigrationManager::new().unwrap();
        let dialect = GenericDialect {};

        let statements = manager.split_sql_statements(
            "-- Migration: add_users\n\
             CREATE TABLE users (id INT);\n\
             CREATE INDEX idx ON users (id);",
            &dialect,
        );
        assert_eq!(statements.len(), 2);

        assert!(manager
            .split_sql_statements("-- Migration: empty\n-- nothing here\n", &dialect)
            .is_empty());

        // Unparseable bodies still get a count
        let naive =
            manager.split_sql_statements("FROBNICATE everything; FROBNICATE more;", &dialect);
        assert_eq!(naive.len(), 2);
    }

    #[test]
    fn test_is_blank_sql() {
        assert!(is_blank_sql(""));
        assert!(is_blank_sql("-- Migration: x\n-- Direction: UP\n\n  -- note\n"));
        assert!(!is_blank_sql("-- Migration: x\nCREATE TABLE t (id INT);"));
    }

    #[test]
    fn test_parse_header_name() {
        let content = "-- Migration: add_users\n-- Created: now\n\nCREATE TABLE x (id INT);";
        assert_eq!(parse_header_name(content).as_deref(), Some("add_users"));
        assert_eq!(parse_header_name("CREATE TABLE x (id INT);\n-- Migration: late"), None);
        assert_eq!(parse_header_name("-- Migration:   \n"), None);
    }
}
