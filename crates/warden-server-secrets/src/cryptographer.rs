// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Envelope encryption of secret contents.
//!
//! Each payload is encrypted under a fresh data key (DEK); the DEK is wrapped
//! under the installation master key and stored beside the ciphertext. Blob
//! layout for scheme `0x01`:
//!
//! ```text
//! offset  len  field
//! 0       1    scheme id
//! 1       1    !scheme id
//! 2       12   DEK nonce
//! 14      32   wrapped DEK
//! 46      16   DEK tag
//! 62      12   payload nonce
//! 74      16   payload tag
//! 90      n    payload ciphertext
//! ```
//!
//! The two header bytes are authenticated as associated data by both
//! encryptions, so every byte of a stored blob is covered by a tag or by the
//! header check.

use std::fmt;
use std::ops::Range;

use warden_common_secret::SecretBytes;
use zeroize::Zeroizing;

use crate::encryption::{
	generate_dek, generate_nonce, open_in_place, seal_in_place, KEY_SIZE, NONCE_SIZE, TAG_SIZE,
};
use crate::error::{SecretsError, SecretsResult};

/// AES-256-GCM envelope: wrapped DEK plus payload, both AES-256-GCM.
pub const SCHEME_AES256_GCM_ENVELOPE: u8 = 0x01;

const HEADER_LEN: usize = 2;
const DEK_NONCE: Range<usize> = HEADER_LEN..HEADER_LEN + NONCE_SIZE;
const WRAPPED_DEK: Range<usize> = DEK_NONCE.end..DEK_NONCE.end + KEY_SIZE;
const DEK_TAG: Range<usize> = WRAPPED_DEK.end..WRAPPED_DEK.end + TAG_SIZE;
const PAYLOAD_NONCE: Range<usize> = DEK_TAG.end..DEK_TAG.end + NONCE_SIZE;
const PAYLOAD_TAG: Range<usize> = PAYLOAD_NONCE.end..PAYLOAD_NONCE.end + TAG_SIZE;

/// Bytes a scheme `0x01` blob adds on top of the plaintext length.
pub const ENVELOPE_OVERHEAD: usize = PAYLOAD_TAG.end;

/// Encrypts and decrypts secret contents under one master key.
pub struct Cryptographer {
	master_key: Zeroizing<[u8; KEY_SIZE]>,
}

impl fmt::Debug for Cryptographer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Cryptographer")
			.field("master_key", &warden_common_secret::REDACTED)
			.finish()
	}
}

impl Cryptographer {
	pub fn new(master_key: Zeroizing<[u8; KEY_SIZE]>) -> Self {
		Self { master_key }
	}

	/// Encrypt `plaintext` into a self-describing blob.
	pub fn encrypt(&self, plaintext: &[u8]) -> SecretsResult<Vec<u8>> {
		let header = header_for(SCHEME_AES256_GCM_ENVELOPE);
		let dek = generate_dek();
		let dek_nonce = generate_nonce();
		let payload_nonce = generate_nonce();

		let mut blob = Vec::with_capacity(ENVELOPE_OVERHEAD + plaintext.len());
		blob.extend_from_slice(&header);
		blob.extend_from_slice(&dek_nonce);
		blob.extend_from_slice(dek.as_slice());
		blob.resize(PAYLOAD_TAG.end, 0);
		blob.extend_from_slice(plaintext);

		let dek_tag = seal_in_place(&self.master_key, &dek_nonce, &header, &mut blob[WRAPPED_DEK])?;
		blob[DEK_TAG].copy_from_slice(&dek_tag);
		blob[PAYLOAD_NONCE].copy_from_slice(&payload_nonce);

		let payload_tag =
			seal_in_place(&dek, &payload_nonce, &header, &mut blob[ENVELOPE_OVERHEAD..])?;
		blob[PAYLOAD_TAG].copy_from_slice(&payload_tag);

		tracing::trace!(size = blob.len(), "content encrypted");
		Ok(blob)
	}

	/// Decrypt a blob produced by [`Cryptographer::encrypt`].
	///
	/// # Errors
	/// - `SecretsError::UnknownScheme` if the blob has no header or names a
	///   scheme this build does not know.
	/// - `SecretsError::Integrity` on any inconsistency or failed tag.
	pub fn decrypt(&self, blob: &[u8]) -> SecretsResult<SecretBytes> {
		if blob.len() < HEADER_LEN {
			return Err(SecretsError::UnknownScheme(format!(
				"blob of {} bytes has no scheme header",
				blob.len()
			)));
		}

		let header = &blob[..HEADER_LEN];
		if header[1] != !header[0] {
			return Err(SecretsError::Integrity(
				"scheme header check byte does not match".to_string(),
			));
		}

		match header[0] {
			SCHEME_AES256_GCM_ENVELOPE => self.decrypt_envelope(blob),
			other => Err(SecretsError::UnknownScheme(format!("{other:#04x}"))),
		}
	}

	fn decrypt_envelope(&self, blob: &[u8]) -> SecretsResult<SecretBytes> {
		if blob.len() < ENVELOPE_OVERHEAD {
			return Err(SecretsError::Integrity(format!(
				"envelope truncated to {} bytes",
				blob.len()
			)));
		}
		let header = &blob[..HEADER_LEN];

		let mut dek = Zeroizing::new([0u8; KEY_SIZE]);
		dek.copy_from_slice(&blob[WRAPPED_DEK]);
		open_in_place(
			&self.master_key,
			&blob[DEK_NONCE],
			header,
			dek.as_mut_slice(),
			&blob[DEK_TAG],
			"data key",
		)?;

		let mut plaintext = blob[ENVELOPE_OVERHEAD..].to_vec();
		open_in_place(
			&dek,
			&blob[PAYLOAD_NONCE],
			header,
			&mut plaintext,
			&blob[PAYLOAD_TAG],
			"payload",
		)?;

		Ok(SecretBytes::new(plaintext))
	}
}

fn header_for(scheme: u8) -> [u8; HEADER_LEN] {
	[scheme, !scheme]
}
