use sqlx::Row;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::SqlitePool;

use remit_access::config::seed_from_env;
use remit_access::services::seed;

#[derive(Parser, Debug)]
#[command(author, version, about = "remit-access migration and seed tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new empty reversible migration with the provided name
    MakeMigration { name: String },
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Roll back the last applied migration
    MigrateRollback,
    /// Seed default permissions, system roles and the top-tier account
    Seed,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Containers may run the binary from another directory, so fall back to
    // the crate-local `.env`.
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MakeMigration { name } => {
            let (up, down) = make_migration_files(&name)?;
            println!("Created migration: {}", up.display());
            println!("Created migration: {}", down.display());
        }
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::MigrateRollback => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            let applied = applied_versions(&pool).await?;
            let Some(target) = previous_version(&applied) else {
                println!("Nothing to roll back");
                return Ok(());
            };
            migrator
                .undo(&pool, target)
                .await
                .context("no migrations were rolled back")?;
            println!("Rolled back last migration");
        }
        Commands::Seed => {
            let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
            let pool = remit_access::db::init(&database_url).await?;
            let credentials = seed_from_env()?;
            let outcome = seed::run(&pool, &credentials).await?;
            println!(
                "Seeded {} permissions and {} roles",
                outcome.permissions_created, outcome.roles_created
            );
            let state = if outcome.created { "created" } else { "already present" };
            println!(
                "Top-tier account {} ({}): {}",
                outcome.super_admin.email, outcome.super_admin.id, state
            );
        }
    }

    Ok(())
}

fn make_migration_files(name: &str) -> anyhow::Result<(PathBuf, PathBuf)> {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let sanitized = sanitize_name(name);
    let up = Path::new("migrations").join(format!("{timestamp}_{sanitized}.up.sql"));
    let down = Path::new("migrations").join(format!("{timestamp}_{sanitized}.down.sql"));

    if up.exists() || down.exists() {
        anyhow::bail!("migration already exists: {}", up.display());
    }

    fs::write(&up, "-- Write your migration SQL here\n")
        .with_context(|| format!("failed to create migration at {}", up.display()))?;
    fs::write(&down, "-- Revert the matching up migration here\n")
        .with_context(|| format!("failed to create migration at {}", down.display()))?;

    Ok((up, down))
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    let options: sqlx::sqlite::SqliteConnectOptions = database_url
        .parse::<sqlx::sqlite::SqliteConnectOptions>()
        .context("invalid DATABASE_URL")?
        .create_if_missing(true)
        .foreign_keys(true);

    sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("failed to connect to database")
}

async fn applied_versions(pool: &SqlitePool) -> anyhow::Result<Vec<i64>> {
    let table: Option<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'")
            .fetch_optional(pool)
            .await?;

    if table.is_none() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1 ORDER BY version")
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect())
}

/// `Migrator::undo` reverts everything above the target version.
fn previous_version(applied: &[i64]) -> Option<i64> {
    match applied {
        [] => None,
        [_] => Some(0),
        [.., previous, _] => Some(*previous),
    }
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    let applied: HashSet<i64> = applied_versions(pool).await?.into_iter().collect();

    println!("{:<8} {:<20} Name", "Status", "Version");
    for migration in migrator.iter().filter(|m| m.migration_type.is_up_migration()) {
        let version = migration.version;
        let status = if applied.contains(&version) { "applied" } else { "pending" };
        let desc = migration.description.as_ref().trim();
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, version, name);
    }

    Ok(())
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' => c,
            'A'..='Z' => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect()
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    // Prefer ./migrations when run from the repo root, else the crate-local copy.
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let migrator_path_display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {}", migrator_path_display))
}
