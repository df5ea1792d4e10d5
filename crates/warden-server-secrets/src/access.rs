// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Group-based authorization.
//!
//! A client can read a secret when at least one group it belongs to has been
//! granted that secret. There are no direct client-to-secret grants. Every
//! query reads current relation state; nothing is cached.

use std::collections::BTreeSet;
use std::sync::Arc;

use warden_server_db::{
	AclRepository, AclStore, Client, ClientId, ClientRepository, ClientStore, Clock, DbContext,
	Group, GroupId, GroupRepository, GroupStore, NewClient, NewGroup, SeriesId, SeriesRepository,
	SeriesStore,
};

use crate::error::{SecretsError, SecretsResult};
use crate::routing::{Consistency, Routed};

/// Manages principals, memberships and grants, and answers access queries.
#[derive(Clone)]
pub struct AccessControlEngine {
	acl: Routed<Arc<dyn AclStore>>,
	clients: Routed<Arc<dyn ClientStore>>,
	groups: Routed<Arc<dyn GroupStore>>,
	series: Routed<Arc<dyn SeriesStore>>,
}

impl AccessControlEngine {
	pub fn new(
		acl: Routed<Arc<dyn AclStore>>,
		clients: Routed<Arc<dyn ClientStore>>,
		groups: Routed<Arc<dyn GroupStore>>,
		series: Routed<Arc<dyn SeriesStore>>,
	) -> Self {
		Self {
			acl,
			clients,
			groups,
			series,
		}
	}

	pub fn from_context(ctx: &DbContext, clock: Arc<dyn Clock>) -> Self {
		Self::new(
			Routed::from_context(ctx, |pool| {
				Arc::new(AclRepository::with_clock(pool, clock.clone())) as Arc<dyn AclStore>
			}),
			Routed::from_context(ctx, |pool| {
				Arc::new(ClientRepository::with_clock(pool, clock.clone())) as Arc<dyn ClientStore>
			}),
			Routed::from_context(ctx, |pool| {
				Arc::new(GroupRepository::with_clock(pool, clock.clone())) as Arc<dyn GroupStore>
			}),
			Routed::from_context(ctx, |pool| {
				Arc::new(SeriesRepository::with_clock(pool, clock.clone())) as Arc<dyn SeriesStore>
			}),
		)
	}

	// =========================================================================
	// Principals
	// =========================================================================

	#[tracing::instrument(skip(self, client), fields(name = %client.name))]
	pub async fn create_client(&self, client: NewClient) -> SecretsResult<Client> {
		let store = self.clients.writable();
		let id = store.create_client(&client).await?;
		tracing::info!(client_id = %id, "client created");
		store
			.get_client_by_id(id)
			.await?
			.ok_or_else(|| SecretsError::NotFound(format!("client {id}")))
	}

	#[tracing::instrument(skip(self), fields(client_id = %id, enabled))]
	pub async fn set_client_enabled(&self, id: ClientId, enabled: bool) -> SecretsResult<()> {
		self.clients.writable().set_client_enabled(id, enabled).await?;
		tracing::info!(client_id = %id, enabled, "client enabled flag changed");
		Ok(())
	}

	/// Delete a client and its memberships.
	#[tracing::instrument(skip(self), fields(client_id = %id))]
	pub async fn delete_client(&self, id: ClientId) -> SecretsResult<()> {
		if !self.clients.writable().delete_client(id).await? {
			return Err(SecretsError::NotFound(format!("client {id}")));
		}
		tracing::info!(client_id = %id, "client deleted");
		Ok(())
	}

	pub async fn client_by_name(
		&self,
		name: &str,
		consistency: Consistency,
	) -> SecretsResult<Option<Client>> {
		Ok(self.clients.route(consistency).get_client_by_name(name).await?)
	}

	pub async fn list_clients(&self, consistency: Consistency) -> SecretsResult<Vec<Client>> {
		Ok(self.clients.route(consistency).list_clients().await?)
	}

	#[tracing::instrument(skip(self, group), fields(name = %group.name))]
	pub async fn create_group(&self, group: NewGroup) -> SecretsResult<Group> {
		let store = self.groups.writable();
		let id = store.create_group(&group).await?;
		tracing::info!(group_id = %id, "group created");
		store
			.get_group_by_id(id)
			.await?
			.ok_or_else(|| SecretsError::NotFound(format!("group {id}")))
	}

	/// Delete a group with its memberships and grants.
	#[tracing::instrument(skip(self), fields(group_id = %id))]
	pub async fn delete_group(&self, id: GroupId) -> SecretsResult<()> {
		if !self.groups.writable().delete_group(id).await? {
			return Err(SecretsError::NotFound(format!("group {id}")));
		}
		tracing::info!(group_id = %id, "group deleted");
		Ok(())
	}

	pub async fn group_by_name(
		&self,
		name: &str,
		consistency: Consistency,
	) -> SecretsResult<Option<Group>> {
		Ok(self.groups.route(consistency).get_group_by_name(name).await?)
	}

	pub async fn list_groups(&self, consistency: Consistency) -> SecretsResult<Vec<Group>> {
		Ok(self.groups.route(consistency).list_groups().await?)
	}

	// =========================================================================
	// Relations
	// =========================================================================

	/// Add a client to a group. Returns `false` if it was already a member.
	///
	/// # Errors
	/// Returns `SecretsError::NotFound` if the client or group does not exist.
	#[tracing::instrument(skip(self), fields(client_id = %client_id, group_id = %group_id))]
	pub async fn add_client_to_group(
		&self,
		client_id: ClientId,
		group_id: GroupId,
	) -> SecretsResult<bool> {
		self.require_client(client_id).await?;
		self.require_group(group_id).await?;
		let added = self
			.acl
			.writable()
			.add_membership(client_id, group_id)
			.await
			.map_err(|e| missing_on_referential(e, "client or group"))?;
		if added {
			tracing::info!(client_id = %client_id, group_id = %group_id, "client added to group");
		}
		Ok(added)
	}

	#[tracing::instrument(skip(self), fields(client_id = %client_id, group_id = %group_id))]
	pub async fn remove_client_from_group(
		&self,
		client_id: ClientId,
		group_id: GroupId,
	) -> SecretsResult<bool> {
		self.require_client(client_id).await?;
		self.require_group(group_id).await?;
		let removed = self
			.acl
			.writable()
			.remove_membership(client_id, group_id)
			.await?;
		if removed {
			tracing::info!(client_id = %client_id, group_id = %group_id, "client removed from group");
		}
		Ok(removed)
	}

	/// Grant a group access to a secret. Returns `false` if already granted.
	///
	/// # Errors
	/// Returns `SecretsError::NotFound` if the group or secret does not exist.
	#[tracing::instrument(skip(self), fields(group_id = %group_id, series_id = %series_id))]
	pub async fn grant_group_to_secret(
		&self,
		group_id: GroupId,
		series_id: SeriesId,
	) -> SecretsResult<bool> {
		self.require_group(group_id).await?;
		self.require_series(series_id).await?;
		let granted = self
			.acl
			.writable()
			.grant(group_id, series_id)
			.await
			.map_err(|e| missing_on_referential(e, "group or secret"))?;
		if granted {
			tracing::info!(group_id = %group_id, series_id = %series_id, "group granted secret");
		}
		Ok(granted)
	}

	#[tracing::instrument(skip(self), fields(group_id = %group_id, series_id = %series_id))]
	pub async fn revoke_group_from_secret(
		&self,
		group_id: GroupId,
		series_id: SeriesId,
	) -> SecretsResult<bool> {
		self.require_group(group_id).await?;
		self.require_series(series_id).await?;
		let revoked = self.acl.writable().revoke(group_id, series_id).await?;
		if revoked {
			tracing::info!(group_id = %group_id, series_id = %series_id, "group revoked from secret");
		}
		Ok(revoked)
	}

	// =========================================================================
	// Queries
	// =========================================================================

	/// Whether any group of the client holds a grant on the secret.
	///
	/// The client's enabled flag is not consulted here.
	#[tracing::instrument(skip(self), fields(client_id = %client_id, series_id = %series_id))]
	pub async fn can_access(
		&self,
		client_id: ClientId,
		series_id: SeriesId,
		consistency: Consistency,
	) -> SecretsResult<bool> {
		Ok(self
			.acl
			.route(consistency)
			.client_can_access(client_id, series_id)
			.await?)
	}

	/// Like [`can_access`](Self::can_access), but fails with
	/// `SecretsError::PermissionDenied` when access is not granted.
	pub async fn check_access(
		&self,
		client_id: ClientId,
		series_id: SeriesId,
		consistency: Consistency,
	) -> SecretsResult<()> {
		if self.can_access(client_id, series_id, consistency).await? {
			Ok(())
		} else {
			tracing::debug!(client_id = %client_id, series_id = %series_id, "access denied");
			Err(SecretsError::PermissionDenied(format!(
				"client {client_id} may not read secret {series_id}"
			)))
		}
	}

	/// Access check by names. An unknown client or secret is never allowed.
	#[tracing::instrument(skip(self), fields(client = %client_name, secret = %secret_name))]
	pub async fn can_access_by_name(
		&self,
		client_name: &str,
		secret_name: &str,
		consistency: Consistency,
	) -> SecretsResult<bool> {
		let Some(client) = self
			.clients
			.route(consistency)
			.get_client_by_name(client_name)
			.await?
		else {
			return Ok(false);
		};
		let Some(series) = self
			.series
			.route(consistency)
			.get_series_by_name(secret_name)
			.await?
		else {
			return Ok(false);
		};
		self.can_access(client.id, series.id, consistency).await
	}

	pub async fn get_allowed_secrets(
		&self,
		client_id: ClientId,
		consistency: Consistency,
	) -> SecretsResult<BTreeSet<SeriesId>> {
		let ids = self.acl.route(consistency).series_for_client(client_id).await?;
		Ok(ids.into_iter().collect())
	}

	pub async fn get_allowed_clients(
		&self,
		series_id: SeriesId,
		consistency: Consistency,
	) -> SecretsResult<BTreeSet<ClientId>> {
		let ids = self.acl.route(consistency).clients_for_series(series_id).await?;
		Ok(ids.into_iter().collect())
	}

	pub async fn groups_for_client(
		&self,
		client_id: ClientId,
		consistency: Consistency,
	) -> SecretsResult<Vec<Group>> {
		Ok(self.acl.route(consistency).groups_for_client(client_id).await?)
	}

	pub async fn groups_for_secret(
		&self,
		series_id: SeriesId,
		consistency: Consistency,
	) -> SecretsResult<Vec<Group>> {
		Ok(self.acl.route(consistency).groups_for_series(series_id).await?)
	}

	async fn require_client(&self, id: ClientId) -> SecretsResult<()> {
		match self.clients.writable().get_client_by_id(id).await? {
			Some(_) => Ok(()),
			None => Err(SecretsError::NotFound(format!("client {id}"))),
		}
	}

	async fn require_group(&self, id: GroupId) -> SecretsResult<()> {
		match self.groups.writable().get_group_by_id(id).await? {
			Some(_) => Ok(()),
			None => Err(SecretsError::NotFound(format!("group {id}"))),
		}
	}

	async fn require_series(&self, id: SeriesId) -> SecretsResult<()> {
		match self.series.writable().get_series_by_id(id).await? {
			Some(_) => Ok(()),
			None => Err(SecretsError::NotFound(format!("secret {id}"))),
		}
	}
}

/// A principal deleted between the existence check and the insert.
fn missing_on_referential(e: warden_server_db::DbError, what: &str) -> SecretsError {
	match e {
		warden_server_db::DbError::Referential(_) => {
			SecretsError::NotFound(format!("{what} no longer exists"))
		}
		other => other.into(),
	}
}
