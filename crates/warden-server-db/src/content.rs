// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Secret content repository.
//!
//! Content rows are immutable: a rotation inserts a new row and nothing here
//! updates an existing one. The current version of a series is the row with the
//! latest `created_at`, ties broken by the highest id.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{sqlite::SqlitePool, Row};

use crate::clock::{Clock, SystemClock};
use crate::error::DbError;
use crate::types::{
	decode_string_map, encode_string_map, format_timestamp, parse_timestamp, ContentId, NewContent,
	SecretContent, SeriesId,
};

#[async_trait]
pub trait ContentStore: Send + Sync {
	async fn create_content(&self, content: &NewContent) -> Result<ContentId, DbError>;
	async fn get_content_by_id(&self, id: ContentId) -> Result<Option<SecretContent>, DbError>;
	async fn get_current_content(&self, series_id: SeriesId)
		-> Result<Option<SecretContent>, DbError>;
	async fn get_content_version(
		&self,
		series_id: SeriesId,
		version: &str,
	) -> Result<Option<SecretContent>, DbError>;
	async fn list_content_versions(&self, series_id: SeriesId)
		-> Result<Vec<SecretContent>, DbError>;
	async fn delete_content(&self, id: ContentId) -> Result<bool, DbError>;
	async fn delete_content_by_series(&self, series_id: SeriesId) -> Result<u64, DbError>;
}

/// Repository for encrypted secret content versions.
#[derive(Clone)]
pub struct ContentRepository {
	pool: SqlitePool,
	clock: Arc<dyn Clock>,
}

impl ContentRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self::with_clock(pool, Arc::new(SystemClock))
	}

	pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
		Self { pool, clock }
	}

	/// Append a content version to a series.
	///
	/// # Errors
	/// - `DbError::Referential` if the series does not exist.
	/// - `DbError::Conflict` if the version label is already used in the series.
	#[tracing::instrument(
		skip(self, content),
		fields(series_id = %content.series_id, version = ?content.version, size = content.encrypted_content.len())
	)]
	pub async fn create_content(&self, content: &NewContent) -> Result<ContentId, DbError> {
		let now = format_timestamp(self.clock.now());

		let result = sqlx::query(
			r#"
			INSERT INTO secrets_content (secret_id, encrypted_content, version, metadata, created_by, created_at)
			VALUES (?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(content.series_id.get())
		.bind(&content.encrypted_content)
		.bind(&content.version)
		.bind(encode_string_map(&content.metadata))
		.bind(&content.creator)
		.bind(now)
		.execute(&self.pool)
		.await
		.map_err(|e| {
			DbError::from_constraint(
				e,
				|| {
					format!(
						"version '{}' already exists for secret series {}",
						content.version.as_deref().unwrap_or_default(),
						content.series_id
					)
				},
				|| format!("secret series {} does not exist", content.series_id),
			)
		})?;

		let id = ContentId::new(result.last_insert_rowid());
		tracing::debug!(content_id = %id, "secret content created");
		Ok(id)
	}

	#[tracing::instrument(skip(self), fields(content_id = %id))]
	pub async fn get_content_by_id(&self, id: ContentId) -> Result<Option<SecretContent>, DbError> {
		let row = sqlx::query(
			r#"
			SELECT id, secret_id, encrypted_content, version, metadata, created_by, created_at
			FROM secrets_content
			WHERE id = ?
			"#,
		)
		.bind(id.get())
		.fetch_optional(&self.pool)
		.await?;

		row.map(|r| self.row_to_content(&r)).transpose()
	}

	/// Get the current version of a series, if it has any content.
	#[tracing::instrument(skip(self), fields(series_id = %series_id))]
	pub async fn get_current_content(
		&self,
		series_id: SeriesId,
	) -> Result<Option<SecretContent>, DbError> {
		let row = sqlx::query(
			r#"
			SELECT id, secret_id, encrypted_content, version, metadata, created_by, created_at
			FROM secrets_content
			WHERE secret_id = ?
			ORDER BY created_at DESC, id DESC
			LIMIT 1
			"#,
		)
		.bind(series_id.get())
		.fetch_optional(&self.pool)
		.await?;

		let result = row.map(|r| self.row_to_content(&r)).transpose()?;
		if let Some(ref content) = result {
			tracing::debug!(content_id = %content.id, "current secret content resolved");
		}
		Ok(result)
	}

	/// Get a pinned version of a series by its label.
	#[tracing::instrument(skip(self), fields(series_id = %series_id, version = %version))]
	pub async fn get_content_version(
		&self,
		series_id: SeriesId,
		version: &str,
	) -> Result<Option<SecretContent>, DbError> {
		let row = sqlx::query(
			r#"
			SELECT id, secret_id, encrypted_content, version, metadata, created_by, created_at
			FROM secrets_content
			WHERE secret_id = ? AND version = ?
			"#,
		)
		.bind(series_id.get())
		.bind(version)
		.fetch_optional(&self.pool)
		.await?;

		row.map(|r| self.row_to_content(&r)).transpose()
	}

	/// List all versions of a series, newest first.
	#[tracing::instrument(skip(self), fields(series_id = %series_id))]
	pub async fn list_content_versions(
		&self,
		series_id: SeriesId,
	) -> Result<Vec<SecretContent>, DbError> {
		let rows = sqlx::query(
			r#"
			SELECT id, secret_id, encrypted_content, version, metadata, created_by, created_at
			FROM secrets_content
			WHERE secret_id = ?
			ORDER BY created_at DESC, id DESC
			"#,
		)
		.bind(series_id.get())
		.fetch_all(&self.pool)
		.await?;

		let versions = rows
			.iter()
			.map(|r| self.row_to_content(r))
			.collect::<Result<Vec<_>, _>>()?;
		tracing::debug!(count = versions.len(), "listed secret content versions");
		Ok(versions)
	}

	#[tracing::instrument(skip(self), fields(content_id = %id))]
	pub async fn delete_content(&self, id: ContentId) -> Result<bool, DbError> {
		let result = sqlx::query("DELETE FROM secrets_content WHERE id = ?")
			.bind(id.get())
			.execute(&self.pool)
			.await?;

		let deleted = result.rows_affected() > 0;
		tracing::debug!(content_id = %id, deleted, "secret content delete");
		Ok(deleted)
	}

	/// Delete every version of a series. Returns how many rows were removed.
	#[tracing::instrument(skip(self), fields(series_id = %series_id))]
	pub async fn delete_content_by_series(&self, series_id: SeriesId) -> Result<u64, DbError> {
		let result = sqlx::query("DELETE FROM secrets_content WHERE secret_id = ?")
			.bind(series_id.get())
			.execute(&self.pool)
			.await?;

		let removed = result.rows_affected();
		tracing::debug!(series_id = %series_id, removed, "secret content deleted for series");
		Ok(removed)
	}

	fn row_to_content(&self, row: &sqlx::sqlite::SqliteRow) -> Result<SecretContent, DbError> {
		let created_at: String = row.get("created_at");
		let metadata: String = row.get("metadata");

		Ok(SecretContent {
			id: ContentId::new(row.get("id")),
			series_id: SeriesId::new(row.get("secret_id")),
			encrypted_content: row.get("encrypted_content"),
			version: row.get("version"),
			metadata: decode_string_map(&metadata)?,
			created_by: row.get("created_by"),
			created_at: parse_timestamp("created_at", &created_at)?,
		})
	}
}

#[async_trait]
impl ContentStore for ContentRepository {
	async fn create_content(&self, content: &NewContent) -> Result<ContentId, DbError> {
		self.create_content(content).await
	}

	async fn get_content_by_id(&self, id: ContentId) -> Result<Option<SecretContent>, DbError> {
		self.get_content_by_id(id).await
	}

	async fn get_current_content(
		&self,
		series_id: SeriesId,
	) -> Result<Option<SecretContent>, DbError> {
		self.get_current_content(series_id).await
	}

	async fn get_content_version(
		&self,
		series_id: SeriesId,
		version: &str,
	) -> Result<Option<SecretContent>, DbError> {
		self.get_content_version(series_id, version).await
	}

	async fn list_content_versions(
		&self,
		series_id: SeriesId,
	) -> Result<Vec<SecretContent>, DbError> {
		self.list_content_versions(series_id).await
	}

	async fn delete_content(&self, id: ContentId) -> Result<bool, DbError> {
		self.delete_content(id).await
	}

	async fn delete_content_by_series(&self, series_id: SeriesId) -> Result<u64, DbError> {
		self.delete_content_by_series(series_id).await
	}
}
