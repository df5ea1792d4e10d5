// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#[derive(Debug, thiserror::Error)]
pub enum DbError {
	#[error("Database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Conflict: {0}")]
	Conflict(String),

	#[error("Referential integrity: {0}")]
	Referential(String),

	#[error("Internal: {0}")]
	Internal(String),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

// SQLITE_BUSY and SQLITE_LOCKED primary result codes.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

impl DbError {
	/// Whether the failure is a connection/contention problem the caller may retry.
	pub fn is_transient(&self) -> bool {
		let DbError::Sqlx(e) = self else {
			return false;
		};
		match e {
			sqlx::Error::PoolTimedOut
			| sqlx::Error::PoolClosed
			| sqlx::Error::Io(_)
			| sqlx::Error::WorkerCrashed => true,
			sqlx::Error::Database(db_err) => db_err
				.code()
				.and_then(|code| code.parse::<i32>().ok())
				.map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
				.unwrap_or(false),
			_ => false,
		}
	}

	/// Classify a failed write: unique violations become `Conflict`, foreign-key
	/// violations become `Referential`, everything else stays `Sqlx`.
	pub(crate) fn from_constraint(
		e: sqlx::Error,
		conflict: impl FnOnce() -> String,
		referential: impl FnOnce() -> String,
	) -> Self {
		match e {
			sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
				DbError::Conflict(conflict())
			}
			sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
				DbError::Referential(referential())
			}
			_ => DbError::Sqlx(e),
		}
	}
}
