// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wrapper types for sensitive values.
//!
//! [`Secret<T>`] keeps master-key material, configuration secrets and decrypted
//! secret contents out of logs: `Debug`, `Display` and `Serialize` all render
//! [`REDACTED`], and the inner value is zeroized when the wrapper is dropped.
//! Reading the value requires an explicit call to [`Secret::expose`].

use std::fmt;

use zeroize::Zeroize;

/// Placeholder rendered in place of any secret value.
pub const REDACTED: &str = "[REDACTED]";

/// A value that must never be printed and is wiped from memory on drop.
pub struct Secret<T: Zeroize> {
	inner: T,
}

/// Secret text, such as a hex-encoded master key read from the environment.
pub type SecretString = Secret<String>;

/// Secret binary data, such as decrypted secret contents.
pub type SecretBytes = Secret<Vec<u8>>;

impl<T: Zeroize> Secret<T> {
	pub fn new(inner: T) -> Self {
		Self { inner }
	}

	/// Borrow the wrapped value.
	///
	/// Call sites are the places where a secret leaves the wrapper, so keep them
	/// narrow and never pass the result to a logging macro.
	pub fn expose(&self) -> &T {
		&self.inner
	}
}

impl<T: Zeroize> Drop for Secret<T> {
	fn drop(&mut self) {
		self.inner.zeroize();
	}
}

impl<T: Zeroize> From<T> for Secret<T> {
	fn from(inner: T) -> Self {
		Self::new(inner)
	}
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
	fn clone(&self) -> Self {
		Self::new(self.inner.clone())
	}
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

impl<T: Zeroize> fmt::Display for Secret<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

#[cfg(feature = "serde")]
impl<T: Zeroize> serde::Serialize for Secret<T> {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(REDACTED)
	}
}

#[cfg(feature = "serde")]
impl<'de, T> serde::Deserialize<'de> for Secret<T>
where
	T: Zeroize + serde::Deserialize<'de>,
{
	fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		T::deserialize(deserializer).map(Secret::new)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use std::io;
	use std::sync::{Arc, Mutex};

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
	fn debug_and_display_are_redacted() {
		let secret = SecretString::new("hunter2".to_string());
		assert_eq!(format!("{secret:?}"), REDACTED);
		assert_eq!(format!("{secret}"), REDACTED);
	}

	#[test]
	fn expose_returns_inner_value() {
		let secret = SecretBytes::new(b"p@ss".to_vec());
		assert_eq!(secret.expose().as_slice(), b"p@ss");
	}

	#[test]
	fn serialize_is_redacted() {
		let secret = SecretString::new("hunter2".to_string());
		let json = serde_json::to_string(&secret).unwrap();
		assert_eq!(json, format!("\"{REDACTED}\""));
	}

	#[test]
	fn deserialize_wraps_value() {
		let secret: SecretString = serde_json::from_str("\"abc123\"").unwrap();
		assert_eq!(secret.expose(), "abc123");
	}

	#[test]
	fn tracing_fields_never_contain_the_value() {
		let writer = CaptureWriter::default();
		let captured = writer.clone();
		let subscriber = tracing_subscriber::fmt()
			.with_writer(move || writer.clone())
			.with_ansi(false)
			.finish();

		let secret = SecretString::new("very-sensitive".to_string());
		tracing::subscriber::with_default(subscriber, || {
			tracing::info!(master_key = ?secret, "loaded key");
		});

		let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
		assert!(output.contains(REDACTED));
		assert!(!output.contains("very-sensitive"));
	}

	proptest! {
		#[test]
		fn redaction_holds_for_any_string(value in "\\PC{1,64}") {
			let secret = SecretString::new(value);
			let rendered = format!("{secret:?} {secret}");
			prop_assert_eq!(rendered, format!("{REDACTED} {REDACTED}"));
		}
	}
}
