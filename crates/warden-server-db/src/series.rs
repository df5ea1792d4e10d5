// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Secret series repository.
//!
//! A series is the named identity of a secret. This repository owns only the
//! `secrets` table; removing content versions and grants for a series is the
//! caller's job and is never done implicitly here.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{sqlite::SqlitePool, Row};

use crate::clock::{Clock, SystemClock};
use crate::error::DbError;
use crate::types::{
	decode_string_map, encode_string_map, format_timestamp, parse_timestamp, NewSeries,
	SecretSeries, SeriesId,
};

#[async_trait]
pub trait SeriesStore: Send + Sync {
	async fn create_series(&self, series: &NewSeries) -> Result<SeriesId, DbError>;
	async fn get_series_by_id(&self, id: SeriesId) -> Result<Option<SecretSeries>, DbError>;
	async fn get_series_by_name(&self, name: &str) -> Result<Option<SecretSeries>, DbError>;
	async fn list_series(&self) -> Result<Vec<SecretSeries>, DbError>;
	async fn touch_series(&self, id: SeriesId, updater: &str) -> Result<(), DbError>;
	async fn delete_series_by_id(&self, id: SeriesId) -> Result<bool, DbError>;
	async fn delete_series_by_name(&self, name: &str) -> Result<bool, DbError>;
}

/// Repository for secret series.
#[derive(Clone)]
pub struct SeriesRepository {
	pool: SqlitePool,
	clock: Arc<dyn Clock>,
}

impl SeriesRepository {
	/// Create a new repository with the given pool.
	///
	/// # Arguments
	/// * `pool` - SQLite connection pool
	pub fn new(pool: SqlitePool) -> Self {
		Self::with_clock(pool, Arc::new(SystemClock))
	}

	pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
		Self { pool, clock }
	}

	/// Create a new series.
	///
	/// An absent `generation_options` map is stored as an empty one.
	///
	/// # Errors
	/// Returns `DbError::Conflict` if a series with this name already exists.
	#[tracing::instrument(skip(self, series), fields(name = %series.name, creator = %series.creator))]
	pub async fn create_series(&self, series: &NewSeries) -> Result<SeriesId, DbError> {
		let now = format_timestamp(self.clock.now());
		let options = encode_string_map(&series.generation_options.clone().unwrap_or_default());

		let result = sqlx::query(
			r#"
			INSERT INTO secrets (name, description, secret_type, generation_options, created_by, created_at, updated_by, updated_at)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&series.name)
		.bind(&series.description)
		.bind(&series.secret_type)
		.bind(options)
		.bind(&series.creator)
		.bind(&now)
		.bind(&series.creator)
		.bind(&now)
		.execute(&self.pool)
		.await
		.map_err(|e| {
			DbError::from_constraint(
				e,
				|| format!("secret series '{}' already exists", series.name),
				|| format!("secret series '{}' references a missing row", series.name),
			)
		})?;

		let id = SeriesId::new(result.last_insert_rowid());
		tracing::debug!(series_id = %id, "secret series created");
		Ok(id)
	}

	#[tracing::instrument(skip(self), fields(series_id = %id))]
	pub async fn get_series_by_id(&self, id: SeriesId) -> Result<Option<SecretSeries>, DbError> {
		let row = sqlx::query(
			r#"
			SELECT id, name, description, secret_type, generation_options, created_by, created_at, updated_by, updated_at
			FROM secrets
			WHERE id = ?
			"#,
		)
		.bind(id.get())
		.fetch_optional(&self.pool)
		.await?;

		row.map(|r| self.row_to_series(&r)).transpose()
	}

	#[tracing::instrument(skip(self), fields(name = %name))]
	pub async fn get_series_by_name(&self, name: &str) -> Result<Option<SecretSeries>, DbError> {
		let row = sqlx::query(
			r#"
			SELECT id, name, description, secret_type, generation_options, created_by, created_at, updated_by, updated_at
			FROM secrets
			WHERE name = ?
			"#,
		)
		.bind(name)
		.fetch_optional(&self.pool)
		.await?;

		let result = row.map(|r| self.row_to_series(&r)).transpose()?;
		if let Some(ref series) = result {
			tracing::debug!(series_id = %series.id, "secret series found by name");
		}
		Ok(result)
	}

	/// List every series in creation order.
	#[tracing::instrument(skip(self))]
	pub async fn list_series(&self) -> Result<Vec<SecretSeries>, DbError> {
		let rows = sqlx::query(
			r#"
			SELECT id, name, description, secret_type, generation_options, created_by, created_at, updated_by, updated_at
			FROM secrets
			ORDER BY id ASC
			"#,
		)
		.fetch_all(&self.pool)
		.await?;

		let series = rows
			.iter()
			.map(|r| self.row_to_series(r))
			.collect::<Result<Vec<_>, _>>()?;
		tracing::debug!(count = series.len(), "listed secret series");
		Ok(series)
	}

	/// Record that `updater` wrote to the series just now.
	///
	/// # Errors
	/// Returns `DbError::NotFound` if the series does not exist.
	#[tracing::instrument(skip(self), fields(series_id = %id))]
	pub async fn touch_series(&self, id: SeriesId, updater: &str) -> Result<(), DbError> {
		let now = format_timestamp(self.clock.now());
		let result = sqlx::query("UPDATE secrets SET updated_by = ?, updated_at = ? WHERE id = ?")
			.bind(updater)
			.bind(now)
			.bind(id.get())
			.execute(&self.pool)
			.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("secret series {id}")));
		}
		tracing::debug!(series_id = %id, "secret series touched");
		Ok(())
	}

	/// Delete only the series row. Returns whether a row was removed.
	///
	/// # Errors
	/// Returns `DbError::Referential` while content versions or grants still
	/// reference the series.
	#[tracing::instrument(skip(self), fields(series_id = %id))]
	pub async fn delete_series_by_id(&self, id: SeriesId) -> Result<bool, DbError> {
		let result = sqlx::query("DELETE FROM secrets WHERE id = ?")
			.bind(id.get())
			.execute(&self.pool)
			.await
			.map_err(|e| {
				DbError::from_constraint(
					e,
					|| format!("secret series {id}"),
					|| format!("secret series {id} is still referenced"),
				)
			})?;

		let deleted = result.rows_affected() > 0;
		tracing::debug!(series_id = %id, deleted, "secret series delete");
		Ok(deleted)
	}

	#[tracing::instrument(skip(self), fields(name = %name))]
	pub async fn delete_series_by_name(&self, name: &str) -> Result<bool, DbError> {
		let result = sqlx::query("DELETE FROM secrets WHERE name = ?")
			.bind(name)
			.execute(&self.pool)
			.await
			.map_err(|e| {
				DbError::from_constraint(
					e,
					|| format!("secret series '{name}'"),
					|| format!("secret series '{name}' is still referenced"),
				)
			})?;

		let deleted = result.rows_affected() > 0;
		tracing::debug!(deleted, "secret series delete by name");
		Ok(deleted)
	}

	fn row_to_series(&self, row: &sqlx::sqlite::SqliteRow) -> Result<SecretSeries, DbError> {
		let created_at: String = row.get("created_at");
		let updated_at: String = row.get("updated_at");
		let options: String = row.get("generation_options");

		Ok(SecretSeries {
			id: SeriesId::new(row.get("id")),
			name: row.get("name"),
			description: row.get("description"),
			secret_type: row.get("secret_type"),
			generation_options: decode_string_map(&options)?,
			created_by: row.get("created_by"),
			created_at: parse_timestamp("created_at", &created_at)?,
			updated_by: row.get("updated_by"),
			updated_at: parse_timestamp("updated_at", &updated_at)?,
		})
	}
}

#[async_trait]
impl SeriesStore for SeriesRepository {
	async fn create_series(&self, series: &NewSeries) -> Result<SeriesId, DbError> {
		self.create_series(series).await
	}

	async fn get_series_by_id(&self, id: SeriesId) -> Result<Option<SecretSeries>, DbError> {
		self.get_series_by_id(id).await
	}

	async fn get_series_by_name(&self, name: &str) -> Result<Option<SecretSeries>, DbError> {
		self.get_series_by_name(name).await
	}

	async fn list_series(&self) -> Result<Vec<SecretSeries>, DbError> {
		self.list_series().await
	}

	async fn touch_series(&self, id: SeriesId, updater: &str) -> Result<(), DbError> {
		self.touch_series(id, updater).await
	}

	async fn delete_series_by_id(&self, id: SeriesId) -> Result<bool, DbError> {
		self.delete_series_by_id(id).await
	}

	async fn delete_series_by_name(&self, name: &str) -> Result<bool, DbError> {
		self.delete_series_by_name(name).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{create_test_pool, ManualClock};
	use crate::types::StringMap;
	use chrono::Duration;
	use proptest::prelude::*;

	fn new_series(name: &str) -> NewSeries {
		NewSeries {
			name: name.to_string(),
			creator: "admin".to_string(),
			..Default::default()
		}
	}

	async fn make_repo() -> (SeriesRepository, Arc<ManualClock>) {
		let pool = create_test_pool().await;
		let clock = Arc::new(ManualClock::at_epoch());
		(SeriesRepository::with_clock(pool, clock.clone()), clock)
	}

	#[tokio::test]
	async fn test_create_and_get_series() {
		let (repo, _) = make_repo().await;
		let mut input = new_series("db-password");
		input.description = Some("primary database".to_string());
		input.secret_type = Some("password".to_string());

		let id = repo.create_series(&input).await.unwrap();
		let by_id = repo.get_series_by_id(id).await.unwrap().unwrap();
		let by_name = repo.get_series_by_name("db-password").await.unwrap().unwrap();

		assert_eq!(by_id, by_name);
		assert_eq!(by_id.name, "db-password");
		assert_eq!(by_id.description.as_deref(), Some("primary database"));
		assert_eq!(by_id.secret_type.as_deref(), Some("password"));
		assert_eq!(by_id.created_by, "admin");
		assert_eq!(by_id.updated_by, "admin");
		assert_eq!(by_id.created_at, by_id.updated_at);
	}

	#[tokio::test]
	async fn test_absent_generation_options_stored_as_empty() {
		let (repo, _) = make_repo().await;
		let id = repo.create_series(&new_series("s")).await.unwrap();

		let (raw,): (String,) = sqlx::query_as("SELECT generation_options FROM secrets WHERE id = ?")
			.bind(id.get())
			.fetch_one(&repo.pool)
			.await
			.unwrap();
		assert_eq!(raw, "{}");

		let series = repo.get_series_by_id(id).await.unwrap().unwrap();
		assert!(series.generation_options.is_empty());
	}

	#[tokio::test]
	async fn test_generation_options_preserved() {
		let (repo, _) = make_repo().await;
		let mut input = new_series("templ");
		let mut options = StringMap::new();
		options.insert("host".to_string(), "db.internal".to_string());
		input.generation_options = Some(options.clone());

		let id = repo.create_series(&input).await.unwrap();
		let series = repo.get_series_by_id(id).await.unwrap().unwrap();
		assert_eq!(series.generation_options, options);
	}

	#[tokio::test]
	async fn test_duplicate_name_conflicts_and_leaves_state_unchanged() {
		let (repo, _) = make_repo().await;
		repo.create_series(&new_series("dup")).await.unwrap();

		let err = repo.create_series(&new_series("dup")).await.unwrap_err();
		assert!(matches!(err, DbError::Conflict(_)));
		assert_eq!(repo.list_series().await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_get_missing_returns_none() {
		let (repo, _) = make_repo().await;
		assert!(repo.get_series_by_id(SeriesId::new(42)).await.unwrap().is_none());
		assert!(repo.get_series_by_name("missing").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_list_is_in_creation_order() {
		let (repo, _) = make_repo().await;
		for name in ["zeta", "alpha", "mid"] {
			repo.create_series(&new_series(name)).await.unwrap();
		}
		let names: Vec<_> = repo
			.list_series()
			.await
			.unwrap()
			.into_iter()
			.map(|s| s.name)
			.collect();
		assert_eq!(names, vec!["zeta", "alpha", "mid"]);
	}

	#[tokio::test]
	async fn test_touch_updates_audit_fields() {
		let (repo, clock) = make_repo().await;
		let id = repo.create_series(&new_series("rotate")).await.unwrap();
		clock.advance(Duration::minutes(5));

		repo.touch_series(id, "rotator").await.unwrap();
		let series = repo.get_series_by_id(id).await.unwrap().unwrap();
		assert_eq!(series.updated_by, "rotator");
		assert_eq!(series.updated_at - series.created_at, Duration::minutes(5));
		assert_eq!(series.created_by, "admin");
	}

	#[tokio::test]
	async fn test_touch_missing_series_is_not_found() {
		let (repo, _) = make_repo().await;
		let err = repo.touch_series(SeriesId::new(7), "x").await.unwrap_err();
		assert!(matches!(err, DbError::NotFound(_)));
	}

	#[tokio::test]
	async fn test_delete_by_id_and_name() {
		let (repo, _) = make_repo().await;
		let a = repo.create_series(&new_series("a")).await.unwrap();
		repo.create_series(&new_series("b")).await.unwrap();

		assert!(repo.delete_series_by_id(a).await.unwrap());
		assert!(!repo.delete_series_by_id(a).await.unwrap());
		assert!(repo.delete_series_by_name("b").await.unwrap());
		assert!(!repo.delete_series_by_name("b").await.unwrap());
		assert!(repo.list_series().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_delete_does_not_cascade_to_content() {
		let (repo, _) = make_repo().await;
		let id = repo.create_series(&new_series("held")).await.unwrap();
		sqlx::query(
			"INSERT INTO secrets_content (secret_id, encrypted_content, metadata, created_by, created_at) \
			 VALUES (?, x'00', '{}', 'admin', '2024-01-01T00:00:00.000000Z')",
		)
		.bind(id.get())
		.execute(&repo.pool)
		.await
		.unwrap();

		let err = repo.delete_series_by_id(id).await.unwrap_err();
		assert!(matches!(err, DbError::Referential(_)));
		assert!(repo.get_series_by_id(id).await.unwrap().is_some());
	}

	proptest! {
		#![proptest_config(ProptestConfig::with_cases(16))]

		#[test]
		fn created_series_is_found_by_its_name(name in "[a-z][a-z0-9._-]{0,40}") {
			tokio_test::block_on(async {
				let (repo, _) = make_repo().await;
				let id = repo.create_series(&new_series(&name)).await.unwrap();
				let found = repo.get_series_by_name(&name).await.unwrap().unwrap();
				assert_eq!(found.id, id);
				assert_eq!(found.name, name);
			});
		}
	}
}
