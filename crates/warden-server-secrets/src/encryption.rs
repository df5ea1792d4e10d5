// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! AES-256-GCM primitives used by the envelope scheme.
//!
//! Encryption works in place with a detached tag so the caller controls where
//! nonce, tag and ciphertext land in the stored blob.

use aes_gcm::{
	aead::{AeadInPlace, KeyInit, OsRng},
	Aes256Gcm, Key, Nonce, Tag,
};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{SecretsError, SecretsResult};

/// Size of encryption keys in bytes (256 bits for AES-256).
pub const KEY_SIZE: usize = 32;

/// Size of AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Generate a random encryption key.
pub fn generate_key() -> Zeroizing<[u8; KEY_SIZE]> {
	let mut key = Zeroizing::new([0u8; KEY_SIZE]);
	OsRng.fill_bytes(key.as_mut());
	key
}

/// Generate a new Data Encryption Key (DEK).
///
/// Every payload gets its own DEK, and each DEK encrypts exactly one payload.
pub fn generate_dek() -> Zeroizing<[u8; KEY_SIZE]> {
	generate_key()
}

/// Generate a random 96-bit nonce.
///
/// Random nonces are safe here because a DEK is never used twice, and the
/// master key only ever wraps 32-byte DEKs. The AES-GCM bound of roughly 2^32
/// random nonces per key applies to master-key wraps alone.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
	let mut nonce = [0u8; NONCE_SIZE];
	OsRng.fill_bytes(&mut nonce);
	nonce
}

/// Encrypt `buffer` in place and return the detached authentication tag.
pub fn seal_in_place(
	key: &[u8; KEY_SIZE],
	nonce: &[u8; NONCE_SIZE],
	aad: &[u8],
	buffer: &mut [u8],
) -> SecretsResult<[u8; TAG_SIZE]> {
	let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

	let tag = cipher
		.encrypt_in_place_detached(Nonce::from_slice(nonce), aad, buffer)
		.map_err(|e| SecretsError::Encryption(format!("AES-GCM seal failed: {e}")))?;

	let mut detached = [0u8; TAG_SIZE];
	detached.copy_from_slice(tag.as_slice());
	Ok(detached)
}

/// Verify `tag` and decrypt `buffer` in place.
///
/// On failure the buffer is left as ciphertext and `SecretsError::Integrity`
/// is returned; `what` names the field for the error message.
pub fn open_in_place(
	key: &[u8; KEY_SIZE],
	nonce: &[u8],
	aad: &[u8],
	buffer: &mut [u8],
	tag: &[u8],
	what: &str,
) -> SecretsResult<()> {
	if nonce.len() != NONCE_SIZE || tag.len() != TAG_SIZE {
		return Err(SecretsError::Integrity(format!("{what}: malformed nonce or tag")));
	}
	let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

	cipher
		.decrypt_in_place_detached(Nonce::from_slice(nonce), aad, buffer, Tag::from_slice(tag))
		.map_err(|_| SecretsError::Integrity(format!("{what}: authentication failed")))
}
