// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Secret storage and authorization for Warden.
//!
//! This crate provides:
//! - [`Cryptographer`]: envelope encryption of secret content under a master key
//! - [`SecretEngine`]: secret lifecycle with versioned, immutable content
//! - [`AccessControlEngine`]: group-based authorization over clients and secrets
//! - [`TransformRegistry`]: type-driven post-processing of decrypted content
//! - [`Warden`]: startup wiring from [`ServerConfig`](warden_server_config::ServerConfig)
//!
//! # Envelope encryption
//!
//! ```text
//! master key (derived once at startup)
//!   └── wraps a fresh DEK per content version
//!         └── encrypts the content
//! ```
//!
//! The blob stored per version is self-describing: a scheme byte selects the
//! layout, and both AES-GCM operations authenticate the header. Plaintext
//! never reaches the stores.
//!
//! # Read routing
//!
//! Reads take a [`Consistency`]. `Replica` reads may lag writes; `Strong` reads
//! go to the writable store. Mutations always use the writable store.

pub mod access;
pub mod cryptographer;
pub mod encryption;
pub mod engine;
pub mod error;
pub mod key;
pub mod routing;
pub mod service;
pub mod transform;

pub use access::AccessControlEngine;
pub use cryptographer::{Cryptographer, ENVELOPE_OVERHEAD, SCHEME_AES256_GCM_ENVELOPE};
pub use encryption::{generate_key, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use engine::{ContentVersion, NewSecret, NewVersion, Secret, SecretEngine};
pub use error::{DeleteStep, SecretsError, SecretsResult};
pub use key::{
	decode_key_material, HmacSha256Derivation, KeyDerivationProvider, KeyDerivationRegistry,
	RawKeyDerivation,
};
pub use routing::{Consistency, Routed};
pub use service::{build_cryptographer, Warden};
pub use transform::{
	IdentityTransform, TemplatedTransform, Transform, TransformRegistry, TransformRegistryBuilder,
};
