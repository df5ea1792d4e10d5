// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Master-key derivation providers.
//!
//! A provider turns installation-level secret material into the 32-byte master
//! key used by the [`Cryptographer`](crate::Cryptographer). Providers are looked
//! up by name from a [`KeyDerivationRegistry`] built once at startup.

use std::collections::BTreeMap;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use warden_common_secret::SecretString;
use zeroize::Zeroizing;

use crate::encryption::KEY_SIZE;
use crate::error::{SecretsError, SecretsResult};

type HmacSha256 = Hmac<Sha256>;

/// Fixed context label mixed into HMAC derivation.
const HMAC_CONTEXT_LABEL: &[u8] = b"warden/content-encryption/master-key/v1";

/// Derives the master key from installation secret material.
pub trait KeyDerivationProvider: Send + Sync {
	/// Registry name, as used in `crypto.derivation_provider`.
	fn name(&self) -> &'static str;

	fn derive_master_key(&self, material: &[u8]) -> SecretsResult<Zeroizing<[u8; KEY_SIZE]>>;
}

/// HMAC-SHA256 over a fixed context label, keyed by the material.
#[derive(Debug, Clone, Copy, Default)]
pub struct HmacSha256Derivation;

impl KeyDerivationProvider for HmacSha256Derivation {
	fn name(&self) -> &'static str {
		"hmac-sha256"
	}

	fn derive_master_key(&self, material: &[u8]) -> SecretsResult<Zeroizing<[u8; KEY_SIZE]>> {
		if material.is_empty() {
			return Err(SecretsError::KeyDerivation(
				"key material must not be empty".to_string(),
			));
		}

		let mut mac = HmacSha256::new_from_slice(material)
			.map_err(|e| SecretsError::KeyDerivation(format!("HMAC init failed: {e}")))?;
		mac.update(HMAC_CONTEXT_LABEL);
		let digest = mac.finalize().into_bytes();

		let mut key = Zeroizing::new([0u8; KEY_SIZE]);
		key.copy_from_slice(digest.as_slice());
		Ok(key)
	}
}

/// Uses the material itself as the master key. It must be exactly 32 bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawKeyDerivation;

impl KeyDerivationProvider for RawKeyDerivation {
	fn name(&self) -> &'static str {
		"raw"
	}

	fn derive_master_key(&self, material: &[u8]) -> SecretsResult<Zeroizing<[u8; KEY_SIZE]>> {
		if material.len() != KEY_SIZE {
			return Err(SecretsError::InvalidKeySize {
				expected: KEY_SIZE,
				actual: material.len(),
			});
		}

		let mut key = Zeroizing::new([0u8; KEY_SIZE]);
		key.copy_from_slice(material);
		Ok(key)
	}
}

/// Name-keyed set of key-derivation providers.
#[derive(Clone, Default)]
pub struct KeyDerivationRegistry {
	providers: BTreeMap<&'static str, Arc<dyn KeyDerivationProvider>>,
}

impl KeyDerivationRegistry {
	/// An empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// A registry with `hmac-sha256` and `raw`.
	pub fn with_defaults() -> Self {
		let mut registry = Self::new();
		registry.register(Arc::new(HmacSha256Derivation));
		registry.register(Arc::new(RawKeyDerivation));
		registry
	}

	/// Add a provider, replacing any existing one with the same name.
	pub fn register(&mut self, provider: Arc<dyn KeyDerivationProvider>) {
		self.providers.insert(provider.name(), provider);
	}

	pub fn get(&self, name: &str) -> Option<Arc<dyn KeyDerivationProvider>> {
		self.providers.get(name).cloned()
	}

	pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
		self.providers.keys().copied()
	}
}

/// Decode hex-encoded key material from configuration.
pub fn decode_key_material(material: &SecretString) -> SecretsResult<Zeroizing<Vec<u8>>> {
	hex::decode(material.expose().trim())
		.map(Zeroizing::new)
		.map_err(|e| SecretsError::KeyDerivation(format!("key material is not valid hex: {e}")))
}
