// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Startup wiring from resolved configuration.

use std::sync::Arc;

use warden_server_config::{ConfigError, ServerConfig};
use warden_server_db::{ensure_schema, Clock, DbContext, SystemClock};

use crate::access::AccessControlEngine;
use crate::cryptographer::Cryptographer;
use crate::engine::SecretEngine;
use crate::error::SecretsResult;
use crate::key::{decode_key_material, KeyDerivationRegistry};
use crate::transform::TransformRegistry;

/// A connected secret engine and access-control engine sharing one database.
pub struct Warden {
	secrets: SecretEngine,
	access: AccessControlEngine,
	db: DbContext,
}

impl Warden {
	/// Derive the master key, open the pools, apply the schema and build both
	/// engines.
	///
	/// # Errors
	/// Returns `SecretsError::Config` when the derivation provider is unknown
	/// or no key material is configured.
	#[tracing::instrument(skip(config), fields(provider = %config.crypto.derivation_provider))]
	pub async fn connect(config: &ServerConfig) -> SecretsResult<Self> {
		let cryptographer = Arc::new(build_cryptographer(config, &KeyDerivationRegistry::with_defaults())?);

		let db = DbContext::connect(
			&config.database.url,
			config.database.readonly_url.as_deref(),
			config.database.max_connections,
		)
		.await?;
		ensure_schema(db.writable()).await?;

		let warden = Self::from_parts(
			db,
			Arc::new(SystemClock),
			cryptographer,
			Arc::new(TransformRegistry::with_defaults()),
		);
		tracing::info!(
			replica_configured = config.database.readonly_url.is_some(),
			"warden ready"
		);
		Ok(warden)
	}

	pub fn from_parts(
		db: DbContext,
		clock: Arc<dyn Clock>,
		cryptographer: Arc<Cryptographer>,
		transforms: Arc<TransformRegistry>,
	) -> Self {
		Self {
			secrets: SecretEngine::from_context(&db, clock.clone(), cryptographer, transforms),
			access: AccessControlEngine::from_context(&db, clock),
			db,
		}
	}

	pub fn secrets(&self) -> &SecretEngine {
		&self.secrets
	}

	pub fn access(&self) -> &AccessControlEngine {
		&self.access
	}

	pub fn db(&self) -> &DbContext {
		&self.db
	}

	pub async fn close(&self) {
		self.db.close().await;
		tracing::info!("warden closed");
	}
}

/// Resolve the configured provider and derive the content master key.
pub fn build_cryptographer(
	config: &ServerConfig,
	registry: &KeyDerivationRegistry,
) -> SecretsResult<Cryptographer> {
	let name = config.crypto.derivation_provider.as_str();
	let provider = registry.get(name).ok_or_else(|| ConfigError::InvalidValue {
		key: "crypto.derivation_provider".to_string(),
		message: format!(
			"unknown provider '{name}', expected one of: {}",
			registry.names().collect::<Vec<_>>().join(", ")
		),
	})?;

	let material = config
		.crypto
		.master_key
		.as_ref()
		.ok_or_else(|| ConfigError::Validation("no master key material configured".to_string()))?;

	let material = decode_key_material(material)?;
	let master_key = provider.derive_master_key(&material)?;
	tracing::debug!(provider = provider.name(), "master key derived");
	Ok(Cryptographer::new(master_key))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::SecretsError;
	use warden_server_config::{CryptoConfig, SecretString};

	fn config(provider: &str, key: Option<&str>) -> ServerConfig {
		ServerConfig {
			crypto: CryptoConfig {
				derivation_provider: provider.to_string(),
				master_key: key.map(|k| SecretString::new(k.to_string())),
			},
			..Default::default()
		}
	}

	#[test]
	fn unknown_provider_is_a_config_error() {
		let err = build_cryptographer(
			&config("kms", Some("00ff")),
			&KeyDerivationRegistry::with_defaults(),
		)
		.unwrap_err();
		assert!(matches!(
			err,
			SecretsError::Config(ConfigError::InvalidValue { ref key, .. }) if key == "crypto.derivation_provider"
		));
	}

	#[test]
	fn missing_material_is_a_config_error() {
		let err = build_cryptographer(
			&config("hmac-sha256", None),
			&KeyDerivationRegistry::with_defaults(),
		)
		.unwrap_err();
		assert!(matches!(err, SecretsError::Config(ConfigError::Validation(_))));
	}

	#[test]
	fn raw_provider_checks_key_length() {
		let err = build_cryptographer(
			&config("raw", Some("00ff")),
			&KeyDerivationRegistry::with_defaults(),
		)
		.unwrap_err();
		assert!(matches!(err, SecretsError::InvalidKeySize { actual: 2, .. }));
	}

	#[test]
	fn same_material_decrypts_across_instances() {
		let registry = KeyDerivationRegistry::with_defaults();
		let cfg = config("hmac-sha256", Some("0123456789abcdef"));
		let a = build_cryptographer(&cfg, &registry).unwrap();
		let b = build_cryptographer(&cfg, &registry).unwrap();
		let blob = a.encrypt(b"p@ss").unwrap();
		assert_eq!(b.decrypt(&blob).unwrap().expose().as_slice(), b"p@ss");
	}

	#[tokio::test]
	async fn connect_builds_working_engines() {
		let dir = tempfile::tempdir().unwrap();
		let mut cfg = config("hmac-sha256", Some("0123456789abcdef"));
		cfg.database.url = format!("sqlite:{}", dir.path().join("warden.db").display());
		cfg.database.max_connections = 2;

		let warden = Warden::connect(&cfg).await.unwrap();
		let names = warden
			.secrets()
			.list(crate::routing::Consistency::Strong)
			.await
			.unwrap();
		assert!(names.is_empty());
		warden.close().await;
	}
}
