mod commands;
mod logging;

use clap::{Parser, Subcommand};
use commands::*;
use elif_migrate::{EnvConfig, LoggingConfig, MigrateOptions};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "elif-migrate")]
#[command(about = "Versioned SQL migrations for elif.rs applications")]
struct Cli {
    /// Database URL (postgres://... or sqlite:...)
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    /// Directory holding the migration files
    #[arg(long, global = true)]
    migrations_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the migration tracking table
    Init,

    /// Create a new up/down migration file pair
    Generate {
        /// Migration name (e.g., add_users)
        name: String,
    },

    /// Show applied and pending migrations
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply pending migrations
    Up {
        /// Apply only migrations up to and including this version
        #[arg(long)]
        target: Option<String>,

        /// Print the plan without touching the database
        #[arg(long)]
        dry_run: bool,
    },

    /// Roll back applied migrations (all of them unless --target is given)
    Down {
        /// Keep this version and everything older
        #[arg(long)]
        target: Option<String>,

        /// Print the plan without touching the database
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init_logging(&LoggingConfig::from_env()?)?;

    let context = MigrateContext::from_env(cli.database_url, cli.migrations_dir)?;

    match cli.command {
        Commands::Init => {
            migrate::init(&context).await?;
        }
        Commands::Generate { name } => {
            migrate::generate(&context, &name).await?;
        }
        Commands::Status { json } => {
            migrate::status(&context, json).await?;
        }
        Commands::Up { target, dry_run } => {
            let options = MigrateOptions { target, dry_run };
            migrate::up(&context, &options).await?;
        }
        Commands::Down { target, dry_run } => {
            let options = MigrateOptions { target, dry_run };
            migrate::down(&context, &options).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_up_with_target() {
        let cli = Cli::parse_from([
            "elif-migrate",
            "--database-url",
            "sqlite::memory:",
            "up",
            "--target",
            "20240101120000",
            "--dry-run",
        ]);
        assert_eq!(cli.database_url.as_deref(), Some("sqlite::memory:"));
        match cli.command {
            Commands::Up { target, dry_run } => {
                assert_eq!(target.as_deref(), Some("20240101120000"));
                assert!(dry_run);
            }
            _ => panic!("Expected up command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["elif-migrate", "down", "--migrations-dir", "db/migrations"]);
        assert_eq!(cli.migrations_dir, Some(PathBuf::from("db/migrations")));
        assert!(matches!(
            cli.command,
            Commands::Down {
                target: None,
                dry_run: false
            }
        ));
    }
}
