use std::time::Duration;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::AppError;

pub async fn init(database_url: &str) -> anyhow::Result<SqlitePool> {
	let options = SqliteConnectOptions::from_str(database_url)
		.context("invalid DATABASE_URL")?
		.create_if_missing(true)
		.foreign_keys(true);

	let pool = SqlitePoolOptions::new()
		.max_connections(10)
		.min_connections(1)
		.acquire_timeout(Duration::from_secs(10))
		.connect_with(options)
		.await
		.context("failed to connect to database")?;

	sqlx::migrate!()
		.run(&pool)
		.await
		.context("failed to run migrations")?;

	Ok(pool)
}

/// Ids are stored as canonical hyphenated TEXT.
pub fn parse_uuid(raw: &str) -> Result<Uuid, AppError> {
	Uuid::parse_str(raw).map_err(|err| AppError::internal(format!("malformed id '{raw}' in storage: {err}")))
}

pub fn parse_optional_uuid(raw: Option<&str>) -> Result<Option<Uuid>, AppError> {
	raw.map(parse_uuid).transpose()
}

/// Returns the failing constraint description ("table.col, table.col") when
/// `err` is a unique-index violation.
pub fn unique_violation(err: &sqlx::Error) -> Option<String> {
	match err {
		sqlx::Error::Database(db_err) if db_err.is_unique_violation() => Some(
			db_err
				.message()
				.trim_start_matches("UNIQUE constraint failed:")
				.trim()
				.to_string(),
		),
		_ => None,
	}
}
