// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use anyhow::Context;
use clap::Subcommand;
use serde_json::json;
use strata_sync::{force_pull, force_push, AccessMode, SyncRegistry, Value};
use tracing::instrument;

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Run schema statements locally (never replicated)
	Exec {
		/// One or more SQL statements without parameters
		sql: String,
	},
	/// Run a statement locally and queue it for the remote if it mutates
	Run {
		sql: String,
		/// Positional parameters: integers, reals, `null`, or text
		params: Vec<String>,
	},
	/// Print query results as JSON
	Query { sql: String, params: Vec<String> },
	/// Compare clocks and pull from the remote if it is newer
	Pull,
	/// Push queued writes and replay the dead-letter file
	Push,
	/// Show clocks, queue depth and sync counters
	Status,
}

/// Interpret a command-line parameter: integer, then real, then `null`,
/// otherwise text.
pub fn parse_param(raw: &str) -> Value {
	if let Ok(i) = raw.parse::<i64>() {
		return Value::Integer(i);
	}
	if let Ok(f) = raw.parse::<f64>() {
		if f.is_finite() {
			return Value::Real(f);
		}
	}
	if raw.eq_ignore_ascii_case("null") {
		return Value::Null;
	}
	Value::Text(raw.to_string())
}

fn parse_params(raw: &[String]) -> Vec<Value> {
	raw.iter().map(|p| parse_param(p)).collect()
}

#[instrument(skip(registry))]
pub async fn dispatch(registry: &SyncRegistry, command: Command) -> anyhow::Result<serde_json::Value> {
	match command {
		Command::Exec { sql } => {
			let db = registry.get(AccessMode::ReadWrite).await?;
			db.exec(&sql).await.context("exec failed")?;
			Ok(json!({ "ok": true }))
		}
		Command::Run { sql, params } => {
			let db = registry.get(AccessMode::ReadWrite).await?;
			let result = db
				.run(&sql, &parse_params(&params))
				.await
				.context("statement failed")?;
			Ok(serde_json::to_value(result)?)
		}
		Command::Query { sql, params } => {
			let db = registry.get(AccessMode::ReadOnly).await?;
			let rows = db
				.all(&sql, &parse_params(&params))
				.await
				.context("query failed")?;
			Ok(serde_json::Value::Array(
				rows.iter().map(|row| row.to_json()).collect(),
			))
		}
		Command::Pull => {
			let outcome = force_pull(registry).await?;
			Ok(serde_json::to_value(outcome)?)
		}
		Command::Push => {
			registry.get(AccessMode::ReadWrite).await?;
			let report = force_push(registry).await;
			Ok(serde_json::to_value(report)?)
		}
		Command::Status => {
			let db = registry.get(AccessMode::ReadWrite).await?;
			let status = db.status().await?;
			Ok(serde_json::to_value(status)?)
		}
	}
}
