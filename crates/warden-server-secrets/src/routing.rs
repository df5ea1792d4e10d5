// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Read routing between the writable store and a read replica.

use sqlx::sqlite::SqlitePool;
use warden_server_db::DbContext;

/// Which execution context a read may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
	/// Read from the replica; the result may lag recent writes.
	Replica,
	/// Read from the writable store.
	Strong,
}

/// A store instance per execution context.
#[derive(Clone)]
pub struct Routed<T> {
	writable: T,
	replica: T,
}

impl<T> Routed<T> {
	pub fn new(writable: T, replica: T) -> Self {
		Self { writable, replica }
	}

	/// Build one store per pool of `ctx`.
	pub fn from_context(ctx: &DbContext, build: impl Fn(SqlitePool) -> T) -> Self {
		Self {
			writable: build(ctx.writable().clone()),
			replica: build(ctx.readonly().clone()),
		}
	}

	/// The store every mutation must use.
	pub fn writable(&self) -> &T {
		&self.writable
	}

	pub fn route(&self, consistency: Consistency) -> &T {
		match consistency {
			Consistency::Strong => &self.writable,
			Consistency::Replica => &self.replica,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strong_reads_use_writable() {
		let routed = Routed::new("primary", "replica");
		assert_eq!(*routed.route(Consistency::Strong), "primary");
		assert_eq!(*routed.route(Consistency::Replica), "replica");
		assert_eq!(*routed.writable(), "primary");
	}
}
