// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt;

use warden_server_config::ConfigError;
use warden_server_db::DbError;

/// One step of the ordered secret delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStep {
	Content,
	Grants,
	Series,
}

impl fmt::Display for DeleteStep {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			DeleteStep::Content => f.write_str("content"),
			DeleteStep::Grants => f.write_str("grants"),
			DeleteStep::Series => f.write_str("series"),
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum SecretsError {
	#[error("not found: {0}")]
	NotFound(String),

	#[error("conflict: {0}")]
	Conflict(String),

	#[error("integrity check failed: {0}")]
	Integrity(String),

	#[error("unknown ciphertext scheme: {0}")]
	UnknownScheme(String),

	#[error("referential integrity: {0}")]
	Referential(String),

	#[error("transient store failure: {0}")]
	TransientStore(#[source] DbError),

	#[error("permission denied: {0}")]
	PermissionDenied(String),

	#[error("encryption failed: {0}")]
	Encryption(String),

	#[error("invalid key size: expected {expected} bytes, got {actual}")]
	InvalidKeySize { expected: usize, actual: usize },

	#[error("key derivation failed: {0}")]
	KeyDerivation(String),

	#[error("transform '{name}' failed: {message}")]
	Transform { name: String, message: String },

	#[error("delete stopped at the {step} step: {source}")]
	CascadeDelete {
		step: DeleteStep,
		#[source]
		source: Box<SecretsError>,
	},

	#[error("database error: {0}")]
	Database(#[source] DbError),

	#[error("configuration error: {0}")]
	Config(#[from] ConfigError),
}

pub type SecretsResult<T> = std::result::Result<T, SecretsError>;

impl From<DbError> for SecretsError {
	fn from(e: DbError) -> Self {
		if e.is_transient() {
			return SecretsError::TransientStore(e);
		}
		match e {
			DbError::NotFound(msg) => SecretsError::NotFound(msg),
			DbError::Conflict(msg) => SecretsError::Conflict(msg),
			DbError::Referential(msg) => SecretsError::Referential(msg),
			other => SecretsError::Database(other),
		}
	}
}

impl SecretsError {
	/// Whether retrying the same call may succeed.
	pub fn is_transient(&self) -> bool {
		match self {
			SecretsError::TransientStore(_) => true,
			SecretsError::CascadeDelete { source, .. } => source.is_transient(),
			_ => false,
		}
	}
}
