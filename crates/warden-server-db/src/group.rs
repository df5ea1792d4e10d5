// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{sqlite::SqlitePool, Row};

use crate::clock::{Clock, SystemClock};
use crate::error::DbError;
use crate::types::{format_timestamp, parse_timestamp, Group, GroupId, NewGroup};

#[async_trait]
pub trait GroupStore: Send + Sync {
	async fn create_group(&self, group: &NewGroup) -> Result<GroupId, DbError>;
	async fn get_group_by_id(&self, id: GroupId) -> Result<Option<Group>, DbError>;
	async fn get_group_by_name(&self, name: &str) -> Result<Option<Group>, DbError>;
	async fn list_groups(&self) -> Result<Vec<Group>, DbError>;
	async fn delete_group(&self, id: GroupId) -> Result<bool, DbError>;
}

/// Repository for group principals.
///
/// Deleting a group removes its memberships and grants through
/// `ON DELETE CASCADE`.
#[derive(Clone)]
pub struct GroupRepository {
	pool: SqlitePool,
	clock: Arc<dyn Clock>,
}

impl GroupRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self::with_clock(pool, Arc::new(SystemClock))
	}

	pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
		Self { pool, clock }
	}

	#[tracing::instrument(skip(self, group), fields(name = %group.name))]
	pub async fn create_group(&self, group: &NewGroup) -> Result<GroupId, DbError> {
		let now = format_timestamp(self.clock.now());

		let result = sqlx::query(
			r#"
			INSERT INTO access_groups (name, description, created_by, created_at, updated_at)
			VALUES (?, ?, ?, ?, ?)
			"#,
		)
		.bind(&group.name)
		.bind(&group.description)
		.bind(&group.creator)
		.bind(&now)
		.bind(&now)
		.execute(&self.pool)
		.await
		.map_err(|e| {
			DbError::from_constraint(
				e,
				|| format!("group '{}' already exists", group.name),
				|| format!("group '{}' references a missing row", group.name),
			)
		})?;

		let id = GroupId::new(result.last_insert_rowid());
		tracing::debug!(group_id = %id, "group created");
		Ok(id)
	}

	#[tracing::instrument(skip(self), fields(group_id = %id))]
	pub async fn get_group_by_id(&self, id: GroupId) -> Result<Option<Group>, DbError> {
		let row = sqlx::query(
			r#"
			SELECT id, name, description, created_by, created_at, updated_at
			FROM access_groups
			WHERE id = ?
			"#,
		)
		.bind(id.get())
		.fetch_optional(&self.pool)
		.await?;

		row.map(|r| row_to_group(&r)).transpose()
	}

	#[tracing::instrument(skip(self), fields(name = %name))]
	pub async fn get_group_by_name(&self, name: &str) -> Result<Option<Group>, DbError> {
		let row = sqlx::query(
			r#"
			SELECT id, name, description, created_by, created_at, updated_at
			FROM access_groups
			WHERE name = ?
			"#,
		)
		.bind(name)
		.fetch_optional(&self.pool)
		.await?;

		row.map(|r| row_to_group(&r)).transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_groups(&self) -> Result<Vec<Group>, DbError> {
		let rows = sqlx::query(
			r#"
			SELECT id, name, description, created_by, created_at, updated_at
			FROM access_groups
			ORDER BY id ASC
			"#,
		)
		.fetch_all(&self.pool)
		.await?;

		let groups = rows
			.iter()
			.map(row_to_group)
			.collect::<Result<Vec<_>, _>>()?;
		tracing::debug!(count = groups.len(), "listed groups");
		Ok(groups)
	}

	#[tracing::instrument(skip(self), fields(group_id = %id))]
	pub async fn delete_group(&self, id: GroupId) -> Result<bool, DbError> {
		let result = sqlx::query("DELETE FROM access_groups WHERE id = ?")
			.bind(id.get())
			.execute(&self.pool)
			.await?;

		let deleted = result.rows_affected() > 0;
		tracing::debug!(group_id = %id, deleted, "group delete");
		Ok(deleted)
	}
}

pub(crate) fn row_to_group(row: &sqlx::sqlite::SqliteRow) -> Result<Group, DbError> {
	let created_at: String = row.get("created_at");
	let updated_at: String = row.get("updated_at");

	Ok(Group {
		id: GroupId::new(row.get("id")),
		name: row.get("name"),
		description: row.get("description"),
		created_by: row.get("created_by"),
		created_at: parse_timestamp("created_at", &created_at)?,
		updated_at: parse_timestamp("updated_at", &updated_at)?,
	})
}

#[async_trait]
impl GroupStore for GroupRepository {
	async fn create_group(&self, group: &NewGroup) -> Result<GroupId, DbError> {
		self.create_group(group).await
	}

	async fn get_group_by_id(&self, id: GroupId) -> Result<Option<Group>, DbError> {
		self.get_group_by_id(id).await
	}

	async fn get_group_by_name(&self, name: &str) -> Result<Option<Group>, DbError> {
		self.get_group_by_name(name).await
	}

	async fn list_groups(&self) -> Result<Vec<Group>, DbError> {
		self.list_groups().await
	}

	async fn delete_group(&self, id: GroupId) -> Result<bool, DbError> {
		self.delete_group(id).await
	}
}
