// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Secret loading from environment variables with `*_FILE` indirection.

use std::path::PathBuf;

use warden_common_secret::SecretString;

#[derive(Debug, thiserror::Error)]
pub enum SecretEnvError {
	#[error("both {var} and {file_var} are set; use only one")]
	Ambiguous { var: String, file_var: String },

	#[error("failed to read secret file {path} (from {file_var}): {source}")]
	FileRead {
		file_var: String,
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}

/// Load a secret from `NAME` or from the file named by `NAME_FILE`.
///
/// Returns `Ok(None)` when neither is set. File contents have a single trailing
/// newline stripped so that files written by `echo` work as expected.
pub fn load_secret_env(name: &str) -> Result<Option<SecretString>, SecretEnvError> {
	let file_var = format!("{name}_FILE");
	let direct = std::env::var(name).ok().filter(|v| !v.is_empty());
	let file = std::env::var(&file_var).ok().filter(|v| !v.is_empty());

	match (direct, file) {
		(Some(_), Some(_)) => Err(SecretEnvError::Ambiguous {
			var: name.to_string(),
			file_var,
		}),
		(Some(value), None) => Ok(Some(SecretString::new(value))),
		(None, Some(path)) => {
			let path = PathBuf::from(path);
			let mut contents =
				std::fs::read_to_string(&path).map_err(|source| SecretEnvError::FileRead {
					file_var: file_var.clone(),
					path: path.clone(),
					source,
				})?;
			if contents.ends_with('\n') {
				contents.pop();
				if contents.ends_with('\r') {
					contents.pop();
				}
			}
			tracing::debug!(var = %file_var, "loaded secret from file");
			Ok(Some(SecretString::new(contents)))
		}
		(None, None) => Ok(None),
	}
}
