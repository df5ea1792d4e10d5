// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use warden_server_db::testing::create_test_pool;
use warden_server_db::{
	create_pool, ensure_schema, ClientId, DbContext, GroupId, NewClient, NewGroup, SystemClock,
};
use warden_server_secrets::{
	generate_key, AccessControlEngine, Consistency, Cryptographer, SecretEngine, TransformRegistry,
	Warden,
};

pub struct TestWarden {
	pub warden: Warden,
	_dir: Option<TempDir>,
}

impl std::ops::Deref for TestWarden {
	type Target = Warden;

	fn deref(&self) -> &Warden {
		&self.warden
	}
}

pub fn cryptographer() -> Arc<Cryptographer> {
	Arc::new(Cryptographer::new(generate_key()))
}

/// A warden over a single in-memory database.
pub async fn memory_warden() -> TestWarden {
	let ctx = DbContext::single(create_test_pool().await);
	TestWarden {
		warden: Warden::from_parts(
			ctx,
			Arc::new(SystemClock),
			cryptographer(),
			Arc::new(TransformRegistry::with_defaults()),
		),
		_dir: None,
	}
}

pub fn sqlite_url(path: &Path) -> String {
	format!("sqlite:{}", path.display())
}

/// A warden over a file database that allows concurrent connections.
pub async fn file_warden() -> TestWarden {
	let dir = tempfile::tempdir().unwrap();
	let pool = create_pool(&sqlite_url(&dir.path().join("warden.db")), 4)
		.await
		.unwrap();
	ensure_schema(&pool).await.unwrap();
	TestWarden {
		warden: Warden::from_parts(
			DbContext::single(pool),
			Arc::new(SystemClock),
			cryptographer(),
			Arc::new(TransformRegistry::with_defaults()),
		),
		_dir: Some(dir),
	}
}

pub async fn client(access: &AccessControlEngine, name: &str) -> ClientId {
	access
		.create_client(NewClient {
			name: name.to_string(),
			description: None,
			enabled: true,
			creator: "admin".to_string(),
		})
		.await
		.unwrap()
		.id
}

pub async fn group(access: &AccessControlEngine, name: &str) -> GroupId {
	access
		.create_group(NewGroup {
			name: name.to_string(),
			description: None,
			creator: "admin".to_string(),
		})
		.await
		.unwrap()
		.id
}

pub async fn allowed(access: &AccessControlEngine, client: &str, secret: &str) -> bool {
	access
		.can_access_by_name(client, secret, Consistency::Strong)
		.await
		.unwrap()
}

pub fn engine_with_context(ctx: &DbContext) -> SecretEngine {
	SecretEngine::from_context(
		ctx,
		Arc::new(SystemClock),
		cryptographer(),
		Arc::new(TransformRegistry::with_defaults()),
	)
}
