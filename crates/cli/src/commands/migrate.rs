use anyhow::Context;
use elif_migrate::{
    DatabaseConfig, EnvConfig, MigrateOptions, MigrationConfig, MigrationError, MigrationManager,
    MigrationRunResult, MigrationRunner, MigrationStatus, MigrationStatusEntry, RollbackResult,
};
use std::path::PathBuf;

/// Settings shared by every migrate command
pub struct MigrateContext {
    config: MigrationConfig,
    database_url: Option<String>,
}

impl MigrateContext {
    /// Environment configuration with command-line overrides applied
    pub fn from_env(
        database_url: Option<String>,
        migrations_dir: Option<PathBuf>,
    ) -> anyhow::Result<Self> {
        let mut config = MigrationConfig::from_env()?;
        if let Some(dir) = migrations_dir {
            config.migrations_dir = dir;
        }
        config.validate()?;

        Ok(Self {
            config,
            database_url,
        })
    }

    fn manager(&self) -> anyhow::Result<MigrationManager> {
        Ok(MigrationManager::with_config(self.config.clone())?)
    }

    async fn runner(&self) -> anyhow::Result<MigrationRunner> {
        let database = DatabaseConfig {
            url: self
                .database_url
                .clone()
                .context("No database configured: set DATABASE_URL or pass --database-url")?,
        };
        database.validate()?;

        let runner = MigrationRunner::from_url(self.manager()?, &database.url).await?;
        Ok(runner)
    }
}

pub async fn init(context: &MigrateContext) -> anyhow::Result<()> {
    let runner = context.runner().await?;
    runner.initialize().await?;
    runner.backend().close().await;

    println!(
        "Migration tracking table '{}' is ready",
        context.config.migrations_table
    );
    Ok(())
}

pub async fn generate(context: &MigrateContext, name: &str) -> anyhow::Result<()> {
    // Pure filesystem work; no database connection needed
    let generated = context.manager()?.create_migration(name).await?;

    println!("Created migration: {}_{}", generated.version, generated.name);
    println!("  {}", generated.up_file.display());
    println!("  {}", generated.down_file.display());
    Ok(())
}

pub async fn status(context: &MigrateContext, json: bool) -> anyhow::Result<()> {
    let runner = context.runner().await?;
    let entries = runner.status().await?;
    runner.backend().close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        print!("{}", render_status(&entries));
    }
    Ok(())
}

pub async fn up(context: &MigrateContext, options: &MigrateOptions) -> anyhow::Result<()> {
    let runner = context.runner().await?;
    let result = runner.run_migrations(options).await;
    runner.backend().close().await;

    match result {
        Ok(result) => {
            print!("{}", render_run(&result));
            Ok(())
        }
        Err(e) => {
            if let Some(hint) = render_failure(&e) {
                eprint!("{}", hint);
            }
            Err(e.into())
        }
    }
}

pub async fn down(context: &MigrateContext, options: &MigrateOptions) -> anyhow::Result<()> {
    let runner = context.runner().await?;
    let result = runner.rollback(options).await;
    runner.backend().close().await;

    match result {
        Ok(result) => {
            print!("{}", render_rollback(&result));
            Ok(())
        }
        Err(e) => {
            if let Some(hint) = render_failure(&e) {
                eprint!("{}", hint);
            }
            Err(e.into())
        }
    }
}

/// A batch stops at the first failing migration; everything before it stays committed
fn render_failure(error: &MigrationError) -> Option<String> {
    let version = error.failed_version()?;
    Some(format!(
        "Stopped at migration {}: it was rolled back, earlier migrations in this run \
         remain committed.\nRun `elif-migrate status` to see the current state.\n",
        version
    ))
}

fn render_status(entries: &[MigrationStatusEntry]) -> String {
    let mut out = String::from("Migration Status:\n================\n");

    if entries.is_empty() {
        out.push_str("No migrations found\n");
        return out;
    }

    for entry in entries {
        match &entry.status {
            MigrationStatus::Applied { applied_at } => out.push_str(&format!(
                "  ✅ {}_{} (applied {})\n",
                entry.version,
                entry.name,
                applied_at.format("%Y-%m-%d %H:%M:%S UTC")
            )),
            MigrationStatus::Pending => {
                out.push_str(&format!("  ⏳ {}_{}\n", entry.version, entry.name))
            }
        }
    }

    let applied = entries.iter().filter(|e| e.status.is_applied()).count();
    out.push_str(&format!(
        "\n{} applied, {} pending\n",
        applied,
        entries.len() - applied
    ));
    out
}

fn render_run(result: &MigrationRunResult) -> String {
    if result.applied_migrations.is_empty() {
        return "Nothing to migrate\n".to_string();
    }

    let verb = if result.dry_run { "Would apply" } else { "Applied" };
    let mut out = format!("{} {} migration(s):\n", verb, result.applied_count());
    for migration in &result.applied_migrations {
        out.push_str(&format!(
            "  {}_{} ({} statements)\n",
            migration.version, migration.name, migration.statement_count
        ));
    }
    if !result.dry_run {
        out.push_str(&format!("Finished in {} ms\n", result.execution_time_ms));
    }
    out
}

fn render_rollback(result: &RollbackResult) -> String {
    let mut out = String::new();

    if result.rolled_back_migrations.is_empty() {
        out.push_str("Nothing to roll back\n");
    } else {
        let verb = if result.dry_run { "Would roll back" } else { "Rolled back" };
        out.push_str(&format!("{} {} migration(s):\n", verb, result.rolled_back_count()));
        for migration in &result.rolled_back_migrations {
            out.push_str(&format!("  {}_{}\n", migration.version, migration.name));
        }
    }

    for version in &result.skipped {
        out.push_str(&format!("Skipped {}: migration files not found\n", version));
    }
    out
}
