// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client principal repository.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{sqlite::SqlitePool, Row};

use crate::clock::{Clock, SystemClock};
use crate::error::DbError;
use crate::types::{format_timestamp, parse_timestamp, Client, ClientId, NewClient};

#[async_trait]
pub trait ClientStore: Send + Sync {
	async fn create_client(&self, client: &NewClient) -> Result<ClientId, DbError>;
	async fn get_client_by_id(&self, id: ClientId) -> Result<Option<Client>, DbError>;
	async fn get_client_by_name(&self, name: &str) -> Result<Option<Client>, DbError>;
	async fn list_clients(&self) -> Result<Vec<Client>, DbError>;
	async fn set_client_enabled(&self, id: ClientId, enabled: bool) -> Result<(), DbError>;
	async fn delete_client(&self, id: ClientId) -> Result<bool, DbError>;
}

/// Repository for client principals.
///
/// Deleting a client removes its memberships through `ON DELETE CASCADE`.
#[derive(Clone)]
pub struct ClientRepository {
	pool: SqlitePool,
	clock: Arc<dyn Clock>,
}

impl ClientRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self::with_clock(pool, Arc::new(SystemClock))
	}

	pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
		Self { pool, clock }
	}

	/// # Errors
	/// Returns `DbError::Conflict` if the name is taken.
	#[tracing::instrument(skip(self, client), fields(name = %client.name))]
	pub async fn create_client(&self, client: &NewClient) -> Result<ClientId, DbError> {
		let now = format_timestamp(self.clock.now());

		let result = sqlx::query(
			r#"
			INSERT INTO clients (name, description, enabled, created_by, created_at, updated_at)
			VALUES (?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&client.name)
		.bind(&client.description)
		.bind(client.enabled as i32)
		.bind(&client.creator)
		.bind(&now)
		.bind(&now)
		.execute(&self.pool)
		.await
		.map_err(|e| {
			DbError::from_constraint(
				e,
				|| format!("client '{}' already exists", client.name),
				|| format!("client '{}' references a missing row", client.name),
			)
		})?;

		let id = ClientId::new(result.last_insert_rowid());
		tracing::debug!(client_id = %id, "client created");
		Ok(id)
	}

	#[tracing::instrument(skip(self), fields(client_id = %id))]
	pub async fn get_client_by_id(&self, id: ClientId) -> Result<Option<Client>, DbError> {
		let row = sqlx::query(
			r#"
			SELECT id, name, description, enabled, created_by, created_at, updated_at
			FROM clients
			WHERE id = ?
			"#,
		)
		.bind(id.get())
		.fetch_optional(&self.pool)
		.await?;

		row.map(|r| self.row_to_client(&r)).transpose()
	}

	#[tracing::instrument(skip(self), fields(name = %name))]
	pub async fn get_client_by_name(&self, name: &str) -> Result<Option<Client>, DbError> {
		let row = sqlx::query(
			r#"
			SELECT id, name, description, enabled, created_by, created_at, updated_at
			FROM clients
			WHERE name = ?
			"#,
		)
		.bind(name)
		.fetch_optional(&self.pool)
		.await?;

		row.map(|r| self.row_to_client(&r)).transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_clients(&self) -> Result<Vec<Client>, DbError> {
		let rows = sqlx::query(
			r#"
			SELECT id, name, description, enabled, created_by, created_at, updated_at
			FROM clients
			ORDER BY id ASC
			"#,
		)
		.fetch_all(&self.pool)
		.await?;

		let clients = rows
			.iter()
			.map(|r| self.row_to_client(r))
			.collect::<Result<Vec<_>, _>>()?;
		tracing::debug!(count = clients.len(), "listed clients");
		Ok(clients)
	}

	/// # Errors
	/// Returns `DbError::NotFound` if the client does not exist.
	#[tracing::instrument(skip(self), fields(client_id = %id, enabled))]
	pub async fn set_client_enabled(&self, id: ClientId, enabled: bool) -> Result<(), DbError> {
		let now = format_timestamp(self.clock.now());
		let result = sqlx::query("UPDATE clients SET enabled = ?, updated_at = ? WHERE id = ?")
			.bind(enabled as i32)
			.bind(now)
			.bind(id.get())
			.execute(&self.pool)
			.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("client {id}")));
		}
		tracing::debug!(client_id = %id, enabled, "client enabled flag updated");
		Ok(())
	}

	#[tracing::instrument(skip(self), fields(client_id = %id))]
	pub async fn delete_client(&self, id: ClientId) -> Result<bool, DbError> {
		let result = sqlx::query("DELETE FROM clients WHERE id = ?")
			.bind(id.get())
			.execute(&self.pool)
			.await?;

		let deleted = result.rows_affected() > 0;
		tracing::debug!(client_id = %id, deleted, "client delete");
		Ok(deleted)
	}

	fn row_to_client(&self, row: &sqlx::sqlite::SqliteRow) -> Result<Client, DbError> {
		let enabled: i32 = row.get("enabled");
		let created_at: String = row.get("created_at");
		let updated_at: String = row.get("updated_at");

		Ok(Client {
			id: ClientId::new(row.get("id")),
			name: row.get("name"),
			description: row.get("description"),
			enabled: enabled != 0,
			created_by: row.get("created_by"),
			created_at: parse_timestamp("created_at", &created_at)?,
			updated_at: parse_timestamp("updated_at", &updated_at)?,
		})
	}
}

#[async_trait]
impl ClientStore for ClientRepository {
	async fn create_client(&self, client: &NewClient) -> Result<ClientId, DbError> {
		self.create_client(client).await
	}

	async fn get_client_by_id(&self, id: ClientId) -> Result<Option<Client>, DbError> {
		self.get_client_by_id(id).await
	}

	async fn get_client_by_name(&self, name: &str) -> Result<Option<Client>, DbError> {
		self.get_client_by_name(name).await
	}

	async fn list_clients(&self) -> Result<Vec<Client>, DbError> {
		self.list_clients().await
	}

	async fn set_client_enabled(&self, id: ClientId, enabled: bool) -> Result<(), DbError> {
		self.set_client_enabled(id, enabled).await
	}

	async fn delete_client(&self, id: ClientId) -> Result<bool, DbError> {
		self.delete_client(id).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_pool;

	fn new_client(name: &str) -> NewClient {
		NewClient {
			name: name.to_string(),
			description: None,
			enabled: true,
			creator: "admin".to_string(),
		}
	}

	#[tokio::test]
	async fn test_create_and_lookup_client() {
		let repo = ClientRepository::new(create_test_pool().await);
		let id = repo.create_client(&new_client("web-1")).await.unwrap();

		let by_id = repo.get_client_by_id(id).await.unwrap().unwrap();
		let by_name = repo.get_client_by_name("web-1").await.unwrap().unwrap();
		assert_eq!(by_id, by_name);
		assert!(by_id.enabled);
		assert_eq!(by_id.created_by, "admin");
	}

	#[tokio::test]
	async fn test_duplicate_client_conflicts() {
		let repo = ClientRepository::new(create_test_pool().await);
		repo.create_client(&new_client("web-1")).await.unwrap();
		let err = repo.create_client(&new_client("web-1")).await.unwrap_err();
		assert!(matches!(err, DbError::Conflict(_)));
	}

	#[tokio::test]
	async fn test_set_enabled_round_trips() {
		let repo = ClientRepository::new(create_test_pool().await);
		let id = repo.create_client(&new_client("web-1")).await.unwrap();

		repo.set_client_enabled(id, false).await.unwrap();
		assert!(!repo.get_client_by_id(id).await.unwrap().unwrap().enabled);

		let err = repo
			.set_client_enabled(ClientId::new(404), true)
			.await
			.unwrap_err();
		assert!(matches!(err, DbError::NotFound(_)));
	}

	#[tokio::test]
	async fn test_list_and_delete_clients() {
		let repo = ClientRepository::new(create_test_pool().await);
		let a = repo.create_client(&new_client("a")).await.unwrap();
		repo.create_client(&new_client("b")).await.unwrap();
		assert_eq!(repo.list_clients().await.unwrap().len(), 2);

		assert!(repo.delete_client(a).await.unwrap());
		assert!(!repo.delete_client(a).await.unwrap());
		let names: Vec<_> = repo
			.list_clients()
			.await
			.unwrap()
			.into_iter()
			.map(|c| c.name)
			.collect();
		assert_eq!(names, vec!["b"]);
	}
}
