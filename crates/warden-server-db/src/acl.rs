// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Membership (client to group) and grant (group to secret series) relations.
//!
//! Every mutation is idempotent and reports whether a row changed. Every query
//! reads the relation tables directly; nothing is cached between calls.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{sqlite::SqlitePool, Row};

use crate::clock::{Clock, SystemClock};
use crate::error::DbError;
use crate::group::row_to_group;
use crate::types::{format_timestamp, ClientId, Group, GroupId, SeriesId};

#[async_trait]
pub trait AclStore: Send + Sync {
	async fn add_membership(&self, client_id: ClientId, group_id: GroupId) -> Result<bool, DbError>;
	async fn remove_membership(
		&self,
		client_id: ClientId,
		group_id: GroupId,
	) -> Result<bool, DbError>;
	async fn grant(&self, group_id: GroupId, series_id: SeriesId) -> Result<bool, DbError>;
	async fn revoke(&self, group_id: GroupId, series_id: SeriesId) -> Result<bool, DbError>;
	async fn delete_grants_for_series(&self, series_id: SeriesId) -> Result<u64, DbError>;
	async fn groups_for_client(&self, client_id: ClientId) -> Result<Vec<Group>, DbError>;
	async fn groups_for_series(&self, series_id: SeriesId) -> Result<Vec<Group>, DbError>;
	async fn series_for_client(&self, client_id: ClientId) -> Result<Vec<SeriesId>, DbError>;
	async fn clients_for_series(&self, series_id: SeriesId) -> Result<Vec<ClientId>, DbError>;
	async fn client_can_access(
		&self,
		client_id: ClientId,
		series_id: SeriesId,
	) -> Result<bool, DbError>;
}

/// Repository for access-control relations.
#[derive(Clone)]
pub struct AclRepository {
	pool: SqlitePool,
	clock: Arc<dyn Clock>,
}

impl AclRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self::with_clock(pool, Arc::new(SystemClock))
	}

	pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
		Self { pool, clock }
	}

	// =========================================================================
	// Memberships
	// =========================================================================

	/// Put a client in a group. Returns `false` if it was already a member.
	///
	/// # Errors
	/// Returns `DbError::Referential` if the client or group does not exist.
	#[tracing::instrument(skip(self), fields(client_id = %client_id, group_id = %group_id))]
	pub async fn add_membership(
		&self,
		client_id: ClientId,
		group_id: GroupId,
	) -> Result<bool, DbError> {
		let now = format_timestamp(self.clock.now());
		let result = sqlx::query(
			r#"
			INSERT INTO memberships (client_id, group_id, created_at)
			VALUES (?, ?, ?)
			ON CONFLICT (client_id, group_id) DO NOTHING
			"#,
		)
		.bind(client_id.get())
		.bind(group_id.get())
		.bind(now)
		.execute(&self.pool)
		.await
		.map_err(|e| {
			DbError::from_constraint(
				e,
				|| format!("client {client_id} is already in group {group_id}"),
				|| format!("client {client_id} or group {group_id} does not exist"),
			)
		})?;

		let added = result.rows_affected() > 0;
		tracing::debug!(added, "membership add");
		Ok(added)
	}

	#[tracing::instrument(skip(self), fields(client_id = %client_id, group_id = %group_id))]
	pub async fn remove_membership(
		&self,
		client_id: ClientId,
		group_id: GroupId,
	) -> Result<bool, DbError> {
		let result = sqlx::query("DELETE FROM memberships WHERE client_id = ? AND group_id = ?")
			.bind(client_id.get())
			.bind(group_id.get())
			.execute(&self.pool)
			.await?;

		let removed = result.rows_affected() > 0;
		tracing::debug!(removed, "membership remove");
		Ok(removed)
	}

	// =========================================================================
	// Grants
	// =========================================================================

	/// Grant a group access to a series. Returns `false` if already granted.
	///
	/// # Errors
	/// Returns `DbError::Referential` if the group or series does not exist.
	#[tracing::instrument(skip(self), fields(group_id = %group_id, series_id = %series_id))]
	pub async fn grant(&self, group_id: GroupId, series_id: SeriesId) -> Result<bool, DbError> {
		let now = format_timestamp(self.clock.now());
		let result = sqlx::query(
			r#"
			INSERT INTO access_grants (group_id, secret_id, created_at)
			VALUES (?, ?, ?)
			ON CONFLICT (group_id, secret_id) DO NOTHING
			"#,
		)
		.bind(group_id.get())
		.bind(series_id.get())
		.bind(now)
		.execute(&self.pool)
		.await
		.map_err(|e| {
			DbError::from_constraint(
				e,
				|| format!("group {group_id} already holds series {series_id}"),
				|| format!("group {group_id} or series {series_id} does not exist"),
			)
		})?;

		let granted = result.rows_affected() > 0;
		tracing::debug!(granted, "grant");
		Ok(granted)
	}

	#[tracing::instrument(skip(self), fields(group_id = %group_id, series_id = %series_id))]
	pub async fn revoke(&self, group_id: GroupId, series_id: SeriesId) -> Result<bool, DbError> {
		let result = sqlx::query("DELETE FROM access_grants WHERE group_id = ? AND secret_id = ?")
			.bind(group_id.get())
			.bind(series_id.get())
			.execute(&self.pool)
			.await?;

		let revoked = result.rows_affected() > 0;
		tracing::debug!(revoked, "revoke");
		Ok(revoked)
	}

	/// Drop every grant that references a series. Returns the removed count.
	#[tracing::instrument(skip(self), fields(series_id = %series_id))]
	pub async fn delete_grants_for_series(&self, series_id: SeriesId) -> Result<u64, DbError> {
		let result = sqlx::query("DELETE FROM access_grants WHERE secret_id = ?")
			.bind(series_id.get())
			.execute(&self.pool)
			.await?;

		let removed = result.rows_affected();
		tracing::debug!(removed, "grants deleted for series");
		Ok(removed)
	}

	// =========================================================================
	// Queries
	// =========================================================================

	#[tracing::instrument(skip(self), fields(client_id = %client_id))]
	pub async fn groups_for_client(&self, client_id: ClientId) -> Result<Vec<Group>, DbError> {
		let rows = sqlx::query(
			r#"
			SELECT g.id, g.name, g.description, g.created_by, g.created_at, g.updated_at
			FROM access_groups g
			INNER JOIN memberships m ON m.group_id = g.id
			WHERE m.client_id = ?
			ORDER BY g.id ASC
			"#,
		)
		.bind(client_id.get())
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(row_to_group).collect()
	}

	#[tracing::instrument(skip(self), fields(series_id = %series_id))]
	pub async fn groups_for_series(&self, series_id: SeriesId) -> Result<Vec<Group>, DbError> {
		let rows = sqlx::query(
			r#"
			SELECT g.id, g.name, g.description, g.created_by, g.created_at, g.updated_at
			FROM access_groups g
			INNER JOIN access_grants a ON a.group_id = g.id
			WHERE a.secret_id = ?
			ORDER BY g.id ASC
			"#,
		)
		.bind(series_id.get())
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(row_to_group).collect()
	}

	/// Every series reachable from the client through any of its groups.
	#[tracing::instrument(skip(self), fields(client_id = %client_id))]
	pub async fn series_for_client(&self, client_id: ClientId) -> Result<Vec<SeriesId>, DbError> {
		let rows = sqlx::query(
			r#"
			SELECT DISTINCT a.secret_id
			FROM access_grants a
			INNER JOIN memberships m ON m.group_id = a.group_id
			WHERE m.client_id = ?
			ORDER BY a.secret_id ASC
			"#,
		)
		.bind(client_id.get())
		.fetch_all(&self.pool)
		.await?;

		let ids: Vec<SeriesId> = rows
			.iter()
			.map(|r| SeriesId::new(r.get("secret_id")))
			.collect();
		tracing::debug!(count = ids.len(), "series allowed for client");
		Ok(ids)
	}

	/// Every client that reaches the series through any granted group.
	#[tracing::instrument(skip(self), fields(series_id = %series_id))]
	pub async fn clients_for_series(&self, series_id: SeriesId) -> Result<Vec<ClientId>, DbError> {
		let rows = sqlx::query(
			r#"
			SELECT DISTINCT m.client_id
			FROM memberships m
			INNER JOIN access_grants a ON a.group_id = m.group_id
			WHERE a.secret_id = ?
			ORDER BY m.client_id ASC
			"#,
		)
		.bind(series_id.get())
		.fetch_all(&self.pool)
		.await?;

		let ids: Vec<ClientId> = rows
			.iter()
			.map(|r| ClientId::new(r.get("client_id")))
			.collect();
		tracing::debug!(count = ids.len(), "clients allowed for series");
		Ok(ids)
	}

	/// Whether the client's groups and the series' granted groups intersect.
	#[tracing::instrument(skip(self), fields(client_id = %client_id, series_id = %series_id))]
	pub async fn client_can_access(
		&self,
		client_id: ClientId,
		series_id: SeriesId,
	) -> Result<bool, DbError> {
		let found: i64 = sqlx::query_scalar(
			r#"
			SELECT EXISTS (
				SELECT 1
				FROM memberships m
				INNER JOIN access_grants a ON a.group_id = m.group_id
				WHERE m.client_id = ? AND a.secret_id = ?
			)
			"#,
		)
		.bind(client_id.get())
		.bind(series_id.get())
		.fetch_one(&self.pool)
		.await?;

		let allowed = found != 0;
		tracing::debug!(allowed, "access check");
		Ok(allowed)
	}
}

#[async_trait]
impl AclStore for AclRepository {
	async fn add_membership(&self, client_id: ClientId, group_id: GroupId) -> Result<bool, DbError> {
		self.add_membership(client_id, group_id).await
	}

	async fn remove_membership(
		&self,
		client_id: ClientId,
		group_id: GroupId,
	) -> Result<bool, DbError> {
		self.remove_membership(client_id, group_id).await
	}

	async fn grant(&self, group_id: GroupId, series_id: SeriesId) -> Result<bool, DbError> {
		self.grant(group_id, series_id).await
	}

	async fn revoke(&self, group_id: GroupId, series_id: SeriesId) -> Result<bool, DbError> {
		self.revoke(group_id, series_id).await
	}

	async fn delete_grants_for_series(&self, series_id: SeriesId) -> Result<u64, DbError> {
		self.delete_grants_for_series(series_id).await
	}

	async fn groups_for_client(&self, client_id: ClientId) -> Result<Vec<Group>, DbError> {
		self.groups_for_client(client_id).await
	}

	async fn groups_for_series(&self, series_id: SeriesId) -> Result<Vec<Group>, DbError> {
		self.groups_for_series(series_id).await
	}

	async fn series_for_client(&self, client_id: ClientId) -> Result<Vec<SeriesId>, DbError> {
		self.series_for_client(client_id).await
	}

	async fn clients_for_series(&self, series_id: SeriesId) -> Result<Vec<ClientId>, DbError> {
		self.clients_for_series(series_id).await
	}

	async fn client_can_access(
		&self,
		client_id: ClientId,
		series_id: SeriesId,
	) -> Result<bool, DbError> {
		self.client_can_access(client_id, series_id).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::client::ClientRepository;
	use crate::group::GroupRepository;
	use crate::series::SeriesRepository;
	use crate::testing::create_test_pool;
	use crate::types::{NewClient, NewGroup, NewSeries};

	struct Fixture {
		acl: AclRepository,
		clients: ClientRepository,
		groups: GroupRepository,
		series: SeriesRepository,
	}

	async fn fixture() -> Fixture {
		let pool = create_test_pool().await;
		Fixture {
			acl: AclRepository::new(pool.clone()),
			clients: ClientRepository::new(pool.clone()),
			groups: GroupRepository::new(pool.clone()),
			series: SeriesRepository::new(pool),
		}
	}

	impl Fixture {
		async fn client(&self, name: &str) -> ClientId {
			self.clients
				.create_client(&NewClient {
					name: name.to_string(),
					description: None,
					enabled: true,
					creator: "admin".to_string(),
				})
				.await
				.unwrap()
		}

		async fn group(&self, name: &str) -> GroupId {
			self.groups
				.create_group(&NewGroup {
					name: name.to_string(),
					description: None,
					creator: "admin".to_string(),
				})
				.await
				.unwrap()
		}

		async fn series(&self, name: &str) -> SeriesId {
			self.series
				.create_series(&NewSeries {
					name: name.to_string(),
					creator: "admin".to_string(),
					..Default::default()
				})
				.await
				.unwrap()
		}
	}

	#[tokio::test]
	async fn test_membership_is_idempotent() {
		let f = fixture().await;
		let c = f.client("web-1").await;
		let g = f.group("ops").await;

		assert!(f.acl.add_membership(c, g).await.unwrap());
		assert!(!f.acl.add_membership(c, g).await.unwrap());
		assert!(f.acl.remove_membership(c, g).await.unwrap());
		assert!(!f.acl.remove_membership(c, g).await.unwrap());
	}

	#[tokio::test]
	async fn test_grant_is_idempotent() {
		let f = fixture().await;
		let g = f.group("ops").await;
		let s = f.series("db-password").await;

		assert!(f.acl.grant(g, s).await.unwrap());
		assert!(!f.acl.grant(g, s).await.unwrap());
		assert!(f.acl.revoke(g, s).await.unwrap());
		assert!(!f.acl.revoke(g, s).await.unwrap());
	}

	#[tokio::test]
	async fn test_relations_to_missing_rows_are_referential() {
		let f = fixture().await;
		let g = f.group("ops").await;

		let err = f.acl.add_membership(ClientId::new(77), g).await.unwrap_err();
		assert!(matches!(err, DbError::Referential(_)));
		let err = f.acl.grant(g, SeriesId::new(77)).await.unwrap_err();
		assert!(matches!(err, DbError::Referential(_)));
	}

	#[tokio::test]
	async fn test_access_flows_only_through_groups() {
		let f = fixture().await;
		let web1 = f.client("web-1").await;
		let web2 = f.client("web-2").await;
		let ops = f.group("ops").await;
		let s = f.series("db-password").await;

		f.acl.add_membership(web1, ops).await.unwrap();
		f.acl.grant(ops, s).await.unwrap();

		assert!(f.acl.client_can_access(web1, s).await.unwrap());
		assert!(!f.acl.client_can_access(web2, s).await.unwrap());
		assert_eq!(f.acl.series_for_client(web1).await.unwrap(), vec![s]);
		assert!(f.acl.series_for_client(web2).await.unwrap().is_empty());
		assert_eq!(f.acl.clients_for_series(s).await.unwrap(), vec![web1]);
	}

	#[tokio::test]
	async fn test_overlapping_groups_are_deduplicated() {
		let f = fixture().await;
		let c = f.client("web-1").await;
		let ops = f.group("ops").await;
		let dba = f.group("dba").await;
		let s = f.series("db-password").await;

		for g in [ops, dba] {
			f.acl.add_membership(c, g).await.unwrap();
			f.acl.grant(g, s).await.unwrap();
		}

		assert_eq!(f.acl.series_for_client(c).await.unwrap(), vec![s]);
		assert_eq!(f.acl.clients_for_series(s).await.unwrap(), vec![c]);
		let names: Vec<_> = f
			.acl
			.groups_for_client(c)
			.await
			.unwrap()
			.into_iter()
			.map(|g| g.name)
			.collect();
		assert_eq!(names, vec!["ops", "dba"]);
		assert_eq!(f.acl.groups_for_series(s).await.unwrap().len(), 2);
	}

	#[tokio::test]
	async fn test_revocation_is_visible_on_next_query() {
		let f = fixture().await;
		let c = f.client("web-1").await;
		let g = f.group("ops").await;
		let s = f.series("db-password").await;
		f.acl.add_membership(c, g).await.unwrap();
		f.acl.grant(g, s).await.unwrap();
		assert!(f.acl.client_can_access(c, s).await.unwrap());

		f.acl.revoke(g, s).await.unwrap();
		assert!(!f.acl.client_can_access(c, s).await.unwrap());
	}

	#[tokio::test]
	async fn test_delete_grants_for_series() {
		let f = fixture().await;
		let a = f.group("a").await;
		let b = f.group("b").await;
		let s = f.series("s").await;
		f.acl.grant(a, s).await.unwrap();
		f.acl.grant(b, s).await.unwrap();

		assert_eq!(f.acl.delete_grants_for_series(s).await.unwrap(), 2);
		assert_eq!(f.acl.delete_grants_for_series(s).await.unwrap(), 0);
		assert!(f.acl.groups_for_series(s).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_deleting_principals_cascades_their_relations() {
		let f = fixture().await;
		let c = f.client("web-1").await;
		let g = f.group("ops").await;
		let s = f.series("s").await;
		f.acl.add_membership(c, g).await.unwrap();
		f.acl.grant(g, s).await.unwrap();

		f.clients.delete_client(c).await.unwrap();
		assert!(f.acl.clients_for_series(s).await.unwrap().is_empty());

		f.groups.delete_group(g).await.unwrap();
		assert!(f.acl.groups_for_series(s).await.unwrap().is_empty());
		// With the grant gone the series row has no remaining references.
		assert!(f.series.delete_series_by_id(s).await.unwrap());
	}
}
