// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::{
	SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::str::FromStr;
use std::time::Duration;

use crate::error::DbError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Create the writable SqlitePool with WAL mode and common settings.
///
/// # Arguments
/// * `database_url` - SQLite connection string (e.g., "sqlite:./warden.db")
/// * `max_connections` - Upper bound on pooled connections
///
/// # Errors
/// Returns `DbError::Internal` if the URL is invalid or connection fails.
#[tracing::instrument(skip(database_url))]
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<SqlitePool, DbError> {
	let options = SqliteConnectOptions::from_str(database_url)
		.map_err(|e| DbError::Internal(format!("Invalid database URL: {e}")))?
		.journal_mode(SqliteJournalMode::Wal)
		.synchronous(SqliteSynchronous::Normal)
		.foreign_keys(true)
		.busy_timeout(BUSY_TIMEOUT)
		.create_if_missing(true);

	let pool = SqlitePoolOptions::new()
		.max_connections(max_connections)
		.connect_with(options)
		.await?;

	tracing::debug!("database pool created");
	Ok(pool)
}

/// Create a read-only SqlitePool for replica-preferring reads.
///
/// The database must already exist; read-only connections never create it.
#[tracing::instrument(skip(database_url))]
pub async fn create_readonly_pool(
	database_url: &str,
	max_connections: u32,
) -> Result<SqlitePool, DbError> {
	let options = SqliteConnectOptions::from_str(database_url)
		.map_err(|e| DbError::Internal(format!("Invalid database URL: {e}")))?
		.read_only(true)
		.busy_timeout(BUSY_TIMEOUT);

	let pool = SqlitePoolOptions::new()
		.max_connections(max_connections)
		.connect_with(options)
		.await?;

	tracing::debug!("read-only database pool created");
	Ok(pool)
}

/// The two execution contexts every store can run against.
///
/// Mutations always use `writable`. Reads may use `readonly`, which lags the
/// primary when it is a real replica.
#[derive(Debug, Clone)]
pub struct DbContext {
	writable: SqlitePool,
	readonly: SqlitePool,
}

impl DbContext {
	pub fn new(writable: SqlitePool, readonly: SqlitePool) -> Self {
		Self { writable, readonly }
	}

	/// Use one pool for both contexts (no replica configured).
	pub fn single(pool: SqlitePool) -> Self {
		Self {
			writable: pool.clone(),
			readonly: pool,
		}
	}

	/// Connect the primary and, when given, a separate read-only replica.
	pub async fn connect(
		url: &str,
		readonly_url: Option<&str>,
		max_connections: u32,
	) -> Result<Self, DbError> {
		let writable = create_pool(url, max_connections).await?;
		match readonly_url {
			Some(readonly_url) => {
				let readonly = create_readonly_pool(readonly_url, max_connections).await?;
				Ok(Self::new(writable, readonly))
			}
			None => Ok(Self::single(writable)),
		}
	}

	pub fn writable(&self) -> &SqlitePool {
		&self.writable
	}

	pub fn readonly(&self) -> &SqlitePool {
		&self.readonly
	}

	/// Close both pools, waiting for checked-out connections to be returned.
	pub async fn close(&self) {
		self.readonly.close().await;
		self.writable.close().await;
		tracing::debug!("database pools closed");
	}
}
