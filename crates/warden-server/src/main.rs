// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Warden secret-management server binary.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warden_server_secrets::{Consistency, Warden};

/// Warden server - secret storage with envelope encryption and group-based access.
#[derive(Parser, Debug)]
#[command(name = "warden-server", about = "Warden secret-management server", version)]
struct Args {
	/// Config file to use instead of /etc/warden/server.toml
	#[arg(long, env = "WARDEN_SERVER_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Show version information
	Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	if let Some(Command::Version) = args.command {
		println!("warden-server version: {}", env!("CARGO_PKG_VERSION"));
		return Ok(());
	}

	dotenvy::dotenv().ok();

	let config = match &args.config {
		Some(path) => warden_server_config::load_config_with_file(path),
		None => warden_server_config::load_config(),
	}
	.context("failed to load configuration")?;

	tracing_subscriber::registry()
		.with(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| config.logging.level.clone().into()),
		)
		.with(tracing_subscriber::fmt::layer())
		.init();

	tracing::info!("starting warden-server");
	config.log_summary();

	let warden = Warden::connect(&config)
		.await
		.context("failed to start warden")?;

	let secrets = warden
		.secrets()
		.list(Consistency::Replica)
		.await
		.context("failed to read secret series")?;
	tracing::info!(secrets = secrets.len(), "warden-server ready");

	tokio::signal::ctrl_c()
		.await
		.context("failed to listen for shutdown signal")?;
	tracing::info!("Received shutdown signal");

	warden.close().await;
	tracing::info!("Server shutdown complete");
	Ok(())
}
