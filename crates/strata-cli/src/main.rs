// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Strata operator CLI.

use std::path::PathBuf;

use clap::Parser;
use strata_config::CliOverrides;
use strata_sync::{force_push, SyncRegistry, SyncSettings};

mod commands;
mod logging;

use commands::Command;

/// Strata - local-first SQLite with opportunistic remote sync.
#[derive(Parser, Debug)]
#[command(name = "strata", about = "Local-first SQLite with remote sync", version)]
struct Args {
	/// Configuration file layered over the system and user files
	#[arg(long, global = true, env = "STRATA_CONFIG")]
	config: Option<PathBuf>,

	/// Local database file
	#[arg(long, global = true)]
	database: Option<PathBuf>,

	/// Log level (error, warn, info, debug, trace)
	#[arg(long, global = true)]
	log_level: Option<String>,

	/// Log format (pretty, json)
	#[arg(long, global = true)]
	log_format: Option<String>,

	#[command(subcommand)]
	command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	let config = strata_config::load_config_with_cli(CliOverrides {
		config_file: args.config,
		database_path: args.database,
		log_level: args.log_level,
		log_format: args.log_format,
	})?;
	logging::init(&config.logging);

	tracing::debug!(
		database = %config.database.path.display(),
		remote = config.remote.is_some(),
		"configuration loaded"
	);

	let registry = SyncRegistry::new(SyncSettings::from_config(&config));
	let result = commands::dispatch(&registry, args.command).await;

	// Writes made by this process must reach the remote before it exits.
	force_push(&registry).await;
	registry.close().await;

	let output = result?;
	println!("{}", serde_json::to_string_pretty(&output)?);
	Ok(())
}
