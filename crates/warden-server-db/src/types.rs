// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Row types persisted by the stores.
//!
//! All ids are store-assigned SQLite rowids wrapped in newtypes so a
//! [`ClientId`] can never be passed where a [`SeriesId`] is expected.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DbError;

macro_rules! define_id_type {
	($name:ident, $doc:expr) => {
		#[doc = $doc]
		#[derive(
			Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
		)]
		#[serde(transparent)]
		pub struct $name(i64);

		impl $name {
			/// Wrap a raw rowid.
			pub fn new(id: i64) -> Self {
				Self(id)
			}

			/// Get the raw rowid.
			pub fn get(self) -> i64 {
				self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl From<i64> for $name {
			fn from(id: i64) -> Self {
				Self(id)
			}
		}

		impl From<$name> for i64 {
			fn from(id: $name) -> Self {
				id.0
			}
		}
	};
}

define_id_type!(SeriesId, "Identifier of a secret series.");
define_id_type!(ContentId, "Identifier of one immutable content version.");
define_id_type!(ClientId, "Identifier of a client principal.");
define_id_type!(GroupId, "Identifier of a group principal.");

/// Free-form string metadata attached to series options and content versions.
pub type StringMap = BTreeMap<String, String>;

/// The named, persistent identity of a secret. Holds metadata only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretSeries {
	pub id: SeriesId,
	pub name: String,
	pub description: Option<String>,
	/// Classification hint used to pick a content transform.
	pub secret_type: Option<String>,
	/// Always present; an absent map on creation is stored as empty.
	pub generation_options: StringMap,
	pub created_by: String,
	pub created_at: DateTime<Utc>,
	pub updated_by: String,
	pub updated_at: DateTime<Utc>,
}

/// Input for creating a series.
#[derive(Debug, Clone, Default)]
pub struct NewSeries {
	pub name: String,
	pub creator: String,
	pub description: Option<String>,
	pub secret_type: Option<String>,
	pub generation_options: Option<StringMap>,
}

/// One immutable, encrypted version of a secret's content.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretContent {
	pub id: ContentId,
	pub series_id: SeriesId,
	pub encrypted_content: Vec<u8>,
	pub version: Option<String>,
	pub metadata: StringMap,
	pub created_by: String,
	pub created_at: DateTime<Utc>,
}

impl fmt::Debug for SecretContent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SecretContent")
			.field("id", &self.id)
			.field("series_id", &self.series_id)
			.field("encrypted_len", &self.encrypted_content.len())
			.field("version", &self.version)
			.field("metadata", &self.metadata)
			.field("created_by", &self.created_by)
			.field("created_at", &self.created_at)
			.finish()
	}
}

/// Input for appending a content version.
#[derive(Clone)]
pub struct NewContent {
	pub series_id: SeriesId,
	pub encrypted_content: Vec<u8>,
	pub version: Option<String>,
	pub metadata: StringMap,
	pub creator: String,
}

/// A machine principal that retrieves secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
	pub id: ClientId,
	pub name: String,
	pub description: Option<String>,
	pub enabled: bool,
	pub created_by: String,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// Input for creating a client.
#[derive(Debug, Clone)]
pub struct NewClient {
	pub name: String,
	pub description: Option<String>,
	pub enabled: bool,
	pub creator: String,
}

/// A named collection of clients sharing the same grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
	pub id: GroupId,
	pub name: String,
	pub description: Option<String>,
	pub created_by: String,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// Input for creating a group.
#[derive(Debug, Clone)]
pub struct NewGroup {
	pub name: String,
	pub description: Option<String>,
	pub creator: String,
}

/// Fixed-width RFC 3339 with microseconds, so text order equals time order.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
	ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, DbError> {
	DateTime::parse_from_rfc3339(value)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| DbError::Internal(format!("Invalid {column}: {e}")))
}

/// Serialize a string map to JSON text.
///
/// The value set is controlled internally, so a failure here is a bug rather
/// than a recoverable condition.
pub(crate) fn encode_string_map(map: &StringMap) -> String {
	serde_json::to_string(map).expect("serializing a string-to-string map cannot fail")
}

pub(crate) fn decode_string_map(value: &str) -> Result<StringMap, DbError> {
	Ok(serde_json::from_str(value)?)
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;
	use proptest::prelude::*;

	#[test]
	fn test_timestamp_roundtrip_keeps_micros() {
		let ts = Utc.timestamp_opt(1_700_000_000, 123_456_000).unwrap();
		let text = format_timestamp(ts);
		assert_eq!(text, "2023-11-14T22:13:20.123456Z");
		assert_eq!(parse_timestamp("created_at", &text).unwrap(), ts);
	}

	#[test]
	fn test_empty_map_encodes_as_empty_object() {
		assert_eq!(encode_string_map(&StringMap::new()), "{}");
	}

	#[test]
	fn test_secret_content_debug_hides_ciphertext() {
		let content = SecretContent {
			id: ContentId::new(1),
			series_id: SeriesId::new(2),
			encrypted_content: vec![0xAB; 8],
			version: None,
			metadata: StringMap::new(),
			created_by: "tester".into(),
			created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
		};
		let rendered = format!("{content:?}");
		assert!(rendered.contains("encrypted_len: 8"));
		assert!(!rendered.contains("encrypted_content"));
	}

	proptest! {
		#[test]
		fn timestamp_text_order_matches_time_order(a in 0i64..4_000_000_000, b in 0i64..4_000_000_000, na in 0u32..1_000_000, nb in 0u32..1_000_000) {
			let ta = Utc.timestamp_opt(a, na * 1000).unwrap();
			let tb = Utc.timestamp_opt(b, nb * 1000).unwrap();
			prop_assert_eq!(ta.cmp(&tb), format_timestamp(ta).cmp(&format_timestamp(tb)));
		}
	}
}
