// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Post-processing of decrypted content by declared secret type.
//!
//! The registry is built once and then only read. A type with no registered
//! transform, or no type at all, resolves to the identity transform.

use std::collections::HashMap;
use std::sync::Arc;

use warden_common_secret::SecretBytes;
use warden_server_db::StringMap;

use crate::error::{SecretsError, SecretsResult};

/// A named content transform.
pub trait Transform: Send + Sync {
	fn name(&self) -> &'static str;

	fn apply(&self, content: SecretBytes, options: &StringMap) -> SecretsResult<SecretBytes>;
}

/// Returns the content unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

impl Transform for IdentityTransform {
	fn name(&self) -> &'static str {
		"identity"
	}

	fn apply(&self, content: SecretBytes, _options: &StringMap) -> SecretsResult<SecretBytes> {
		Ok(content)
	}
}

/// Expands `{{key}}` placeholders in UTF-8 content from generation options.
///
/// Whitespace inside the braces is ignored. An unterminated `{{` is copied
/// through literally.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplatedTransform;

impl TemplatedTransform {
	pub const NAME: &'static str = "templated";
}

impl Transform for TemplatedTransform {
	fn name(&self) -> &'static str {
		Self::NAME
	}

	fn apply(&self, content: SecretBytes, options: &StringMap) -> SecretsResult<SecretBytes> {
		let text = std::str::from_utf8(content.expose()).map_err(|e| SecretsError::Transform {
			name: Self::NAME.to_string(),
			message: format!("content is not UTF-8: {e}"),
		})?;

		let mut out = String::with_capacity(text.len());
		let mut rest = text;
		while let Some(start) = rest.find("{{") {
			let Some(len) = rest[start + 2..].find("}}") else {
				break;
			};
			let key = rest[start + 2..start + 2 + len].trim();
			let value = options.get(key).ok_or_else(|| SecretsError::Transform {
				name: Self::NAME.to_string(),
				message: format!("no generation option named '{key}'"),
			})?;

			out.push_str(&rest[..start]);
			out.push_str(value);
			rest = &rest[start + 2 + len + 2..];
		}
		out.push_str(rest);

		Ok(SecretBytes::new(out.into_bytes()))
	}
}

/// Name-keyed transform lookup.
#[derive(Clone)]
pub struct TransformRegistry {
	transforms: HashMap<&'static str, Arc<dyn Transform>>,
	identity: Arc<dyn Transform>,
}

impl TransformRegistry {
	pub fn builder() -> TransformRegistryBuilder {
		TransformRegistryBuilder::default()
	}

	/// A registry with `templated` registered.
	pub fn with_defaults() -> Self {
		Self::builder().register(Arc::new(TemplatedTransform)).build()
	}

	/// Find the transform for a secret type, falling back to identity.
	pub fn resolve(&self, secret_type: Option<&str>) -> Arc<dyn Transform> {
		secret_type
			.and_then(|t| self.transforms.get(t))
			.cloned()
			.unwrap_or_else(|| self.identity.clone())
	}

	pub fn apply(
		&self,
		secret_type: Option<&str>,
		content: SecretBytes,
		options: &StringMap,
	) -> SecretsResult<SecretBytes> {
		let transform = self.resolve(secret_type);
		tracing::trace!(transform = transform.name(), "applying content transform");
		transform.apply(content, options)
	}
}

impl Default for TransformRegistry {
	fn default() -> Self {
		Self::with_defaults()
	}
}

#[derive(Default)]
pub struct TransformRegistryBuilder {
	transforms: HashMap<&'static str, Arc<dyn Transform>>,
}

impl TransformRegistryBuilder {
	/// Add a transform under its own name, replacing any earlier one.
	pub fn register(mut self, transform: Arc<dyn Transform>) -> Self {
		self.transforms.insert(transform.name(), transform);
		self
	}

	pub fn build(self) -> TransformRegistry {
		TransformRegistry {
			transforms: self.transforms,
			identity: Arc::new(IdentityTransform),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn options(pairs: &[(&str, &str)]) -> StringMap {
		pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect()
	}

	fn bytes(s: &str) -> SecretBytes {
		SecretBytes::new(s.as_bytes().to_vec())
	}

	#[test]
	fn absent_or_unknown_type_is_identity() {
		let registry = TransformRegistry::with_defaults();
		assert_eq!(registry.resolve(None).name(), "identity");
		assert_eq!(registry.resolve(Some("password")).name(), "identity");

		let out = registry
			.apply(Some("password"), bytes("{{x}}"), &StringMap::new())
			.unwrap();
		assert_eq!(out.expose().as_slice(), b"{{x}}");
	}

	#[test]
	fn identity_passes_non_utf8_through() {
		let registry = TransformRegistry::with_defaults();
		let out = registry
			.apply(None, SecretBytes::new(vec![0xff, 0x00, 0xfe]), &StringMap::new())
			.unwrap();
		assert_eq!(out.expose().as_slice(), &[0xff, 0x00, 0xfe]);
	}

	#[test]
	fn templated_expands_placeholders() {
		let registry = TransformRegistry::with_defaults();
		let out = registry
			.apply(
				Some("templated"),
				bytes("postgres://{{ user }}:{{password}}@{{host}}/app"),
				&options(&[("user", "app"), ("password", "p@ss"), ("host", "db")]),
			)
			.unwrap();
		assert_eq!(out.expose().as_slice(), b"postgres://app:p@ss@db/app");
	}

	#[test]
	fn templated_missing_option_fails() {
		let err = TemplatedTransform
			.apply(bytes("{{missing}}"), &StringMap::new())
			.unwrap_err();
		assert!(matches!(err, SecretsError::Transform { ref name, .. } if name == "templated"));
	}

	#[test]
	fn templated_rejects_non_utf8() {
		let err = TemplatedTransform
			.apply(SecretBytes::new(vec![0xff, 0xfe]), &StringMap::new())
			.unwrap_err();
		assert!(matches!(err, SecretsError::Transform { .. }));
	}

	#[test]
	fn templated_keeps_unterminated_braces() {
		let out = TemplatedTransform
			.apply(bytes("a {{b}} {{c"), &options(&[("b", "B")]))
			.unwrap();
		assert_eq!(out.expose().as_slice(), b"a B {{c");
	}

	#[test]
	fn builder_registers_custom_transform() {
		struct Upper;
		impl Transform for Upper {
			fn name(&self) -> &'static str {
				"upper"
			}
			fn apply(&self, content: SecretBytes, _: &StringMap) -> SecretsResult<SecretBytes> {
				Ok(SecretBytes::new(content.expose().to_ascii_uppercase()))
			}
		}

		let registry = TransformRegistry::builder().register(Arc::new(Upper)).build();
		let out = registry
			.apply(Some("upper"), bytes("abc"), &StringMap::new())
			.unwrap();
		assert_eq!(out.expose().as_slice(), b"ABC");
		assert_eq!(registry.resolve(Some("templated")).name(), "identity");
	}
}
