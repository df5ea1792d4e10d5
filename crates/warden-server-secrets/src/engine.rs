// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Secret lifecycle: create, read, rotate, list and delete.
//!
//! The engine performs no authorization. Callers check the
//! [`AccessControlEngine`](crate::AccessControlEngine) first.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use warden_common_secret::SecretBytes;
use warden_server_db::{
	AclRepository, AclStore, Clock, ContentId, ContentRepository, ContentStore, DbContext,
	DbError, NewContent, NewSeries, SecretContent, SecretSeries, SeriesId, SeriesRepository,
	SeriesStore, StringMap,
};

use crate::cryptographer::Cryptographer;
use crate::error::{DeleteStep, SecretsError, SecretsResult};
use crate::routing::{Consistency, Routed};
use crate::transform::TransformRegistry;

/// Input for [`SecretEngine::create`].
#[derive(Debug, Clone)]
pub struct NewSecret {
	pub name: String,
	pub creator: String,
	pub description: Option<String>,
	pub secret_type: Option<String>,
	/// `None` and an empty map are stored the same way.
	pub generation_options: Option<StringMap>,
	pub content: SecretBytes,
	pub version: Option<String>,
	pub metadata: StringMap,
}

impl NewSecret {
	pub fn new(
		name: impl Into<String>,
		creator: impl Into<String>,
		content: impl Into<Vec<u8>>,
	) -> Self {
		Self {
			name: name.into(),
			creator: creator.into(),
			description: None,
			secret_type: None,
			generation_options: None,
			content: SecretBytes::new(content.into()),
			version: None,
			metadata: StringMap::new(),
		}
	}
}

/// Input for [`SecretEngine::create_version`].
#[derive(Debug, Clone)]
pub struct NewVersion {
	pub creator: String,
	pub content: SecretBytes,
	pub version: Option<String>,
	pub metadata: StringMap,
}

impl NewVersion {
	pub fn new(creator: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
		Self {
			creator: creator.into(),
			content: SecretBytes::new(content.into()),
			version: None,
			metadata: StringMap::new(),
		}
	}
}

/// Metadata of one stored content version, without its ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentVersion {
	pub id: ContentId,
	pub version: Option<String>,
	pub metadata: StringMap,
	pub created_by: String,
	pub created_at: DateTime<Utc>,
}

impl From<SecretContent> for ContentVersion {
	fn from(content: SecretContent) -> Self {
		Self {
			id: content.id,
			version: content.version,
			metadata: content.metadata,
			created_by: content.created_by,
			created_at: content.created_at,
		}
	}
}

/// A series joined with one decrypted, transformed content version.
#[derive(Debug, Clone)]
pub struct Secret {
	pub series: SecretSeries,
	pub content: ContentVersion,
	pub plaintext: SecretBytes,
}

impl Secret {
	pub fn id(&self) -> SeriesId {
		self.series.id
	}

	pub fn name(&self) -> &str {
		&self.series.name
	}

	pub fn expose(&self) -> &[u8] {
		self.plaintext.expose()
	}
}

/// Orchestrates the series and content stores, the cryptographer and the
/// transform registry.
#[derive(Clone)]
pub struct SecretEngine {
	series: Routed<Arc<dyn SeriesStore>>,
	content: Routed<Arc<dyn ContentStore>>,
	grants: Arc<dyn AclStore>,
	cryptographer: Arc<Cryptographer>,
	transforms: Arc<TransformRegistry>,
}

impl SecretEngine {
	pub fn new(
		series: Routed<Arc<dyn SeriesStore>>,
		content: Routed<Arc<dyn ContentStore>>,
		grants: Arc<dyn AclStore>,
		cryptographer: Arc<Cryptographer>,
		transforms: Arc<TransformRegistry>,
	) -> Self {
		Self {
			series,
			content,
			grants,
			cryptographer,
			transforms,
		}
	}

	/// Build SQLite-backed stores over both pools of `ctx`.
	pub fn from_context(
		ctx: &DbContext,
		clock: Arc<dyn Clock>,
		cryptographer: Arc<Cryptographer>,
		transforms: Arc<TransformRegistry>,
	) -> Self {
		let series = Routed::from_context(ctx, |pool| {
			Arc::new(SeriesRepository::with_clock(pool, clock.clone())) as Arc<dyn SeriesStore>
		});
		let content = Routed::from_context(ctx, |pool| {
			Arc::new(ContentRepository::with_clock(pool, clock.clone())) as Arc<dyn ContentStore>
		});
		let grants = Arc::new(AclRepository::with_clock(ctx.writable().clone(), clock));
		Self::new(series, content, grants, cryptographer, transforms)
	}

	/// Create a series and its first content version.
	///
	/// The content is run through its transform and encrypted before anything
	/// is written, so a failing transform leaves no rows behind. If the content row
	/// cannot be stored, the new series row is removed again and the content
	/// error is returned.
	///
	/// # Errors
	/// - `SecretsError::Conflict` if a secret with this name exists.
	/// - `SecretsError::Encryption` if the content cannot be encrypted.
	#[tracing::instrument(skip(self, secret), fields(name = %secret.name, creator = %secret.creator))]
	pub async fn create(&self, secret: NewSecret) -> SecretsResult<Secret> {
		self.check_transform(
			secret.secret_type.as_deref(),
			&secret.content,
			secret.generation_options.as_ref(),
		)?;
		let encrypted = self.cryptographer.encrypt(secret.content.expose())?;

		let series_store = self.series.writable();
		let series_id = series_store
			.create_series(&NewSeries {
				name: secret.name,
				creator: secret.creator.clone(),
				description: secret.description,
				secret_type: secret.secret_type,
				generation_options: secret.generation_options,
			})
			.await?;

		let content = NewContent {
			series_id,
			encrypted_content: encrypted,
			version: secret.version,
			metadata: secret.metadata,
			creator: secret.creator,
		};
		let content_id = match self.content.writable().create_content(&content).await {
			Ok(id) => id,
			Err(e) => {
				tracing::warn!(series_id = %series_id, error = %e, "content insert failed, removing new series");
				if let Err(cleanup) = series_store.delete_series_by_id(series_id).await {
					tracing::warn!(series_id = %series_id, error = %cleanup, "could not remove series after failed content insert");
				}
				return Err(e.into());
			}
		};

		tracing::info!(series_id = %series_id, content_id = %content_id, "secret created");
		self.load_written(series_id, content_id).await
	}

	/// Append a new immutable content version and make it current.
	///
	/// # Errors
	/// - `SecretsError::NotFound` if no secret has this name.
	/// - `SecretsError::Transform` if the series transform rejects the content.
	/// - `SecretsError::Conflict` if the version label already exists.
	#[tracing::instrument(skip(self, version), fields(name = %name, creator = %version.creator))]
	pub async fn create_version(&self, name: &str, version: NewVersion) -> SecretsResult<Secret> {
		let series = self.require_series(name, Consistency::Strong).await?;
		self.check_transform(
			series.secret_type.as_deref(),
			&version.content,
			Some(&series.generation_options),
		)?;
		let encrypted = self.cryptographer.encrypt(version.content.expose())?;

		let content_id = self
			.content
			.writable()
			.create_content(&NewContent {
				series_id: series.id,
				encrypted_content: encrypted,
				version: version.version,
				metadata: version.metadata,
				creator: version.creator.clone(),
			})
			.await
			.map_err(|e| match e {
				DbError::Referential(_) => SecretsError::NotFound(format!("secret '{name}'")),
				other => other.into(),
			})?;
		self.series
			.writable()
			.touch_series(series.id, &version.creator)
			.await?;

		tracing::info!(series_id = %series.id, content_id = %content_id, "secret version created");
		self.load_written(series.id, content_id).await
	}

	/// Get a secret by name, at its current version or at a pinned label.
	///
	/// # Errors
	/// - `SecretsError::NotFound` if the series or the version is missing.
	/// - `SecretsError::Integrity` / `SecretsError::UnknownScheme` if the
	///   stored content cannot be decrypted.
	#[tracing::instrument(skip(self), fields(name = %name, version = ?version))]
	pub async fn get_by_name(
		&self,
		name: &str,
		version: Option<&str>,
		consistency: Consistency,
	) -> SecretsResult<Secret> {
		let series = self.require_series(name, consistency).await?;
		self.resolve(series, version, consistency).await
	}

	#[tracing::instrument(skip(self), fields(series_id = %id, version = ?version))]
	pub async fn get_by_id(
		&self,
		id: SeriesId,
		version: Option<&str>,
		consistency: Consistency,
	) -> SecretsResult<Secret> {
		let series = self
			.series
			.route(consistency)
			.get_series_by_id(id)
			.await?
			.ok_or_else(|| SecretsError::NotFound(format!("secret {id}")))?;
		self.resolve(series, version, consistency).await
	}

	/// All series metadata in creation order. Nothing is decrypted.
	#[tracing::instrument(skip(self))]
	pub async fn list(&self, consistency: Consistency) -> SecretsResult<Vec<SecretSeries>> {
		Ok(self.series.route(consistency).list_series().await?)
	}

	/// Version metadata for a secret, newest first. Nothing is decrypted.
	#[tracing::instrument(skip(self), fields(name = %name))]
	pub async fn list_versions(
		&self,
		name: &str,
		consistency: Consistency,
	) -> SecretsResult<Vec<ContentVersion>> {
		let series = self.require_series(name, consistency).await?;
		let versions = self
			.content
			.route(consistency)
			.list_content_versions(series.id)
			.await?;
		Ok(versions.into_iter().map(ContentVersion::from).collect())
	}

	/// Delete a secret with all of its content versions and grants.
	///
	/// Runs content, then grants, then series. Each step is idempotent, so after
	/// a `SecretsError::CascadeDelete` the same call can be retried.
	#[tracing::instrument(skip(self), fields(name = %name))]
	pub async fn delete(&self, name: &str) -> SecretsResult<()> {
		let series = self.require_series(name, Consistency::Strong).await?;
		self.cascade_delete(series.id).await
	}

	#[tracing::instrument(skip(self), fields(series_id = %id))]
	pub async fn delete_by_id(&self, id: SeriesId) -> SecretsResult<()> {
		if self.series.writable().get_series_by_id(id).await?.is_none() {
			return Err(SecretsError::NotFound(format!("secret {id}")));
		}
		self.cascade_delete(id).await
	}

	async fn cascade_delete(&self, id: SeriesId) -> SecretsResult<()> {
		let versions = self
			.content
			.writable()
			.delete_content_by_series(id)
			.await
			.map_err(|e| cascade_error(DeleteStep::Content, e))?;
		let grants = self
			.grants
			.delete_grants_for_series(id)
			.await
			.map_err(|e| cascade_error(DeleteStep::Grants, e))?;
		self.series
			.writable()
			.delete_series_by_id(id)
			.await
			.map_err(|e| cascade_error(DeleteStep::Series, e))?;

		tracing::info!(series_id = %id, versions, grants, "secret deleted");
		Ok(())
	}

	async fn require_series(
		&self,
		name: &str,
		consistency: Consistency,
	) -> SecretsResult<SecretSeries> {
		self.series
			.route(consistency)
			.get_series_by_name(name)
			.await?
			.ok_or_else(|| SecretsError::NotFound(format!("secret '{name}'")))
	}

	async fn resolve(
		&self,
		series: SecretSeries,
		version: Option<&str>,
		consistency: Consistency,
	) -> SecretsResult<Secret> {
		let store = self.content.route(consistency);
		let content = match version {
			Some(label) => store.get_content_version(series.id, label).await?,
			None => store.get_current_content(series.id).await?,
		};
		let content = content.ok_or_else(|| match version {
			Some(label) => {
				SecretsError::NotFound(format!("version '{label}' of secret '{}'", series.name))
			}
			None => SecretsError::NotFound(format!("content of secret '{}'", series.name)),
		})?;
		self.compose(series, content)
	}

	/// Read back rows this engine just wrote, from the writable store.
	async fn load_written(&self, series_id: SeriesId, content_id: ContentId) -> SecretsResult<Secret> {
		let series = self
			.series
			.writable()
			.get_series_by_id(series_id)
			.await?
			.ok_or_else(|| SecretsError::NotFound(format!("secret {series_id}")))?;
		let content = self
			.content
			.writable()
			.get_content_by_id(content_id)
			.await?
			.ok_or_else(|| SecretsError::NotFound(format!("content {content_id}")))?;
		self.compose(series, content)
	}

	/// Dry-run the transform a read would apply, before any write.
	fn check_transform(
		&self,
		secret_type: Option<&str>,
		content: &SecretBytes,
		options: Option<&StringMap>,
	) -> SecretsResult<()> {
		let empty = StringMap::new();
		self.transforms
			.apply(secret_type, content.clone(), options.unwrap_or(&empty))
			.map(drop)
	}

	fn compose(&self, series: SecretSeries, content: SecretContent) -> SecretsResult<Secret> {
		let plaintext = self.cryptographer.decrypt(&content.encrypted_content)?;
		let plaintext = self.transforms.apply(
			series.secret_type.as_deref(),
			plaintext,
			&series.generation_options,
		)?;

		Ok(Secret {
			series,
			content: content.into(),
			plaintext,
		})
	}
}

fn cascade_error(step: DeleteStep, e: DbError) -> SecretsError {
	tracing::warn!(%step, error = %e, "secret delete interrupted");
	SecretsError::CascadeDelete {
		step,
		source: Box::new(e.into()),
	}
}
