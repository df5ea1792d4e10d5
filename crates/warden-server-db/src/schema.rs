// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bootstrap schema.
//!
//! Relation rows owned by a principal (memberships, grants held by a group)
//! cascade when that principal is deleted. Rows that reference a secret series
//! do not: the secret engine removes content versions and grants explicitly
//! before the series, so a premature series delete fails instead of silently
//! fanning out.

use sqlx::sqlite::SqlitePool;

use crate::error::DbError;

const SCHEMA: &[&str] = &[
	r#"
	CREATE TABLE IF NOT EXISTS secrets (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		name TEXT NOT NULL UNIQUE,
		description TEXT,
		secret_type TEXT,
		generation_options TEXT NOT NULL DEFAULT '{}',
		created_by TEXT NOT NULL,
		created_at TEXT NOT NULL,
		updated_by TEXT NOT NULL,
		updated_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS secrets_content (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		secret_id INTEGER NOT NULL REFERENCES secrets(id),
		encrypted_content BLOB NOT NULL,
		version TEXT,
		metadata TEXT NOT NULL DEFAULT '{}',
		created_by TEXT NOT NULL,
		created_at TEXT NOT NULL,
		UNIQUE (secret_id, version)
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_secrets_content_current ON secrets_content(secret_id, created_at DESC, id DESC)",
	r#"
	CREATE TABLE IF NOT EXISTS clients (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		name TEXT NOT NULL UNIQUE,
		description TEXT,
		enabled INTEGER NOT NULL DEFAULT 1,
		created_by TEXT NOT NULL,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS access_groups (
		id INTEGER PRIMARY KEY AUTOINCREMENT,
		name TEXT NOT NULL UNIQUE,
		description TEXT,
		created_by TEXT NOT NULL,
		created_at TEXT NOT NULL,
		updated_at TEXT NOT NULL
	)
	"#,
	r#"
	CREATE TABLE IF NOT EXISTS memberships (
		client_id INTEGER NOT NULL REFERENCES clients(id) ON DELETE CASCADE,
		group_id INTEGER NOT NULL REFERENCES access_groups(id) ON DELETE CASCADE,
		created_at TEXT NOT NULL,
		PRIMARY KEY (client_id, group_id)
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_memberships_group ON memberships(group_id)",
	r#"
	CREATE TABLE IF NOT EXISTS access_grants (
		group_id INTEGER NOT NULL REFERENCES access_groups(id) ON DELETE CASCADE,
		secret_id INTEGER NOT NULL REFERENCES secrets(id),
		created_at TEXT NOT NULL,
		PRIMARY KEY (group_id, secret_id)
	)
	"#,
	"CREATE INDEX IF NOT EXISTS idx_access_grants_secret ON access_grants(secret_id)",
];

/// Create every table and index if missing. Safe to run on each start.
#[tracing::instrument(skip(pool))]
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), DbError> {
	let mut tx = pool.begin().await?;
	for statement in SCHEMA {
		sqlx::query(statement).execute(&mut *tx).await?;
	}
	tx.commit().await?;

	tracing::debug!(statements = SCHEMA.len(), "schema ensured");
	Ok(())
}
