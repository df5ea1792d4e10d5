// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Content encryption configuration.
//!
//! The master key material is never read from the config file; it comes from
//! `WARDEN_SERVER_MASTER_KEY` or the file named by `WARDEN_SERVER_MASTER_KEY_FILE`.

use serde::Deserialize;
use warden_common_secret::SecretString;

pub const DEFAULT_DERIVATION_PROVIDER: &str = "hmac-sha256";

/// Crypto configuration (runtime, fully resolved).
#[derive(Debug, Clone)]
pub struct CryptoConfig {
	/// Name of the registered key-derivation provider.
	pub derivation_provider: String,
	/// Hex-encoded installation secret material.
	pub master_key: Option<SecretString>,
}

impl Default for CryptoConfig {
	fn default() -> Self {
		Self {
			derivation_provider: DEFAULT_DERIVATION_PROVIDER.to_string(),
			master_key: None,
		}
	}
}

/// Crypto configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CryptoConfigLayer {
	#[serde(default)]
	pub derivation_provider: Option<String>,
}

impl CryptoConfigLayer {
	pub fn merge(&mut self, other: CryptoConfigLayer) {
		if other.derivation_provider.is_some() {
			self.derivation_provider = other.derivation_provider;
		}
	}

	pub fn finalize(self, master_key: Option<SecretString>) -> CryptoConfig {
		CryptoConfig {
			derivation_provider: self
				.derivation_provider
				.unwrap_or_else(|| DEFAULT_DERIVATION_PROVIDER.to_string()),
			master_key,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_provider() {
		let config = CryptoConfigLayer::default().finalize(None);
		assert_eq!(config.derivation_provider, "hmac-sha256");
		assert!(config.master_key.is_none());
	}

	#[test]
	fn test_master_key_is_redacted_in_debug() {
		let config = CryptoConfigLayer {
			derivation_provider: Some("raw".to_string()),
		}
		.finalize(Some(SecretString::new("00ff".to_string())));
		let rendered = format!("{config:?}");
		assert!(!rendered.contains("00ff"));
		assert_eq!(config.derivation_provider, "raw");
	}
}
