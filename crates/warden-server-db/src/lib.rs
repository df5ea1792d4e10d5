// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite persistence for the Warden secret server.
//!
//! One repository per table family, each behind an `async_trait` store trait:
//!
//! - [`SeriesRepository`]: secret identities and metadata
//! - [`ContentRepository`]: immutable encrypted content versions
//! - [`ClientRepository`] and [`GroupRepository`]: principals
//! - [`AclRepository`]: memberships and grants
//!
//! Repositories never cascade across tables they do not own. Ordering deletes
//! across series, content and grants is left to the caller.

pub mod acl;
pub mod client;
pub mod clock;
pub mod content;
pub mod error;
pub mod group;
pub mod pool;
pub mod schema;
pub mod series;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod types;

pub use acl::{AclRepository, AclStore};
pub use client::{ClientRepository, ClientStore};
pub use clock::{Clock, SystemClock};
pub use content::{ContentRepository, ContentStore};
pub use error::{DbError, Result};
pub use group::{GroupRepository, GroupStore};
pub use pool::{create_pool, create_readonly_pool, DbContext};
pub use schema::ensure_schema;
pub use series::{SeriesRepository, SeriesStore};
pub use types::{
	Client, ClientId, ContentId, Group, GroupId, NewClient, NewContent, NewGroup, NewSeries,
	SecretContent, SecretSeries, SeriesId, StringMap,
};
