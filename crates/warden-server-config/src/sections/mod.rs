// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

mod crypto;
mod database;
mod logging;

pub use crypto::{CryptoConfig, CryptoConfigLayer, DEFAULT_DERIVATION_PROVIDER};
pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use logging::{LoggingConfig, LoggingConfigLayer};
