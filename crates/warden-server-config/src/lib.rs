// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Centralized configuration management for the Warden secret server.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`WARDEN_SERVER_*`)
//! - Secret loading with `*_FILE` indirection for the master key
//!
//! # Usage
//!
//! ```ignore
//! use warden_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("primary database: {}", config.database.url);
//! ```

pub mod env;
pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use env::{load_secret_env, SecretEnvError};
pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};
pub use warden_common_secret::{Secret, SecretString, REDACTED};

use tracing::{debug, info};

/// Environment variable holding the hex-encoded installation secret material.
pub const MASTER_KEY_ENV: &str = "WARDEN_SERVER_MASTER_KEY";

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub database: DatabaseConfig,
	pub crypto: CryptoConfig,
	pub logging: LoggingConfig,
}

impl ServerConfig {
	/// Log the resolved settings. Key material is never included.
	///
	/// Loading runs before any subscriber exists, so the binary calls this once
	/// logging is installed.
	pub fn log_summary(&self) {
		info!(
			database = %self.database.url,
			replica_configured = self.database.readonly_url.is_some(),
			max_connections = self.database.max_connections,
			derivation_provider = %self.crypto.derivation_provider,
			log_level = %self.logging.level,
			"server configuration loaded"
		);
	}
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`WARDEN_SERVER_*`)
/// 2. Config file (`/etc/warden/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration from environment only (for testing or simple deployments).
pub fn load_config_from_env() -> Result<ServerConfig, ConfigError> {
	let mut merged = ServerConfigLayer::default();
	merged.merge(EnvSource.load()?);
	finalize(merged)
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let master_key =
		load_secret_env(MASTER_KEY_ENV).map_err(|e| ConfigError::Secret(e.to_string()))?;

	let config = ServerConfig {
		database: layer.database.unwrap_or_default().finalize(),
		crypto: layer.crypto.unwrap_or_default().finalize(master_key),
		logging: layer.logging.unwrap_or_default().finalize(),
	};

	validate_config(&config)?;
	Ok(config)
}

/// Validate cross-field configuration rules.
fn validate_config(config: &ServerConfig) -> Result<(), ConfigError> {
	if config.database.max_connections == 0 {
		return Err(ConfigError::Validation(
			"WARDEN_SERVER_DATABASE_MAX_CONNECTIONS must be at least 1".to_string(),
		));
	}

	if config.crypto.master_key.is_none() {
		return Err(ConfigError::Validation(format!(
			"{MASTER_KEY_ENV} (or {MASTER_KEY_ENV}_FILE) must be set; \
			 secret contents cannot be encrypted without installation key material"
		)));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io;
	use std::sync::{Arc, Mutex};

	fn config_with_key() -> ServerConfig {
		ServerConfig {
			crypto: CryptoConfig {
				master_key: Some(SecretString::new("00".repeat(32))),
				..Default::default()
			},
			..Default::default()
		}
	}

	#[test]
	fn test_missing_master_key_is_rejected() {
		let result = validate_config(&ServerConfig::default());
		assert!(result.is_err());
		assert!(result
			.unwrap_err()
			.to_string()
			.contains("WARDEN_SERVER_MASTER_KEY"));
	}

	#[test]
	fn test_zero_connections_is_rejected() {
		let mut config = config_with_key();
		config.database.max_connections = 0;
		assert!(validate_config(&config).is_err());
	}

	#[test]
	fn test_valid_config_passes() {
		assert!(validate_config(&config_with_key()).is_ok());
	}

	#[derive(Clone, Default)]
	struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

	impl io::Write for CaptureWriter {
		fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
			self.0.lock().unwrap().extend_from_slice(buf);
			Ok(buf.len())
		}

		fn flush(&mut self) -> io::Result<()> {
			Ok(())
		}
	}

	#[test]
	fn test_log_summary_reaches_installed_subscriber_without_key() {
		let writer = CaptureWriter::default();
		let captured = writer.clone();
		let subscriber = tracing_subscriber::fmt()
			.with_writer(move || writer.clone())
			.with_ansi(false)
			.finish();

		let mut config = config_with_key();
		config.crypto.master_key = Some(SecretString::new("deadbeefcafe".to_string()));
		config.database.readonly_url = Some("sqlite:/srv/replica.db".to_string());
		tracing::subscriber::with_default(subscriber, || config.log_summary());

		let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
		assert!(output.contains("server configuration loaded"));
		assert!(output.contains("replica_configured=true"));
		assert!(output.contains("hmac-sha256"));
		assert!(!output.contains("deadbeefcafe"));
	}
}
