// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Whole-table pull from the remote replica into the local store.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::catalog::{list_tables, paging_order, primary_key_columns, quote_ident};
use crate::error::{LocalStoreError, RemoteError, SyncError};
use crate::local::LocalStore;
use crate::remote::RemoteReplica;
use crate::settings::SyncSettings;
use crate::telemetry::Telemetry;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableFailure {
	pub table: String,
	pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PullReport {
	pub tables_pulled: usize,
	pub rows_applied: u64,
	pub pages_fetched: usize,
	pub failures: Vec<TableFailure>,
}

/// Result of one freshness check. Never an error: failures are folded in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PullOutcome {
	/// No remote is configured for this instance.
	Disabled,
	/// The remote is not newer than the local store.
	Skipped {
		local: Option<Value>,
		remote: Option<Value>,
	},
	/// The remote clock could not be read in time.
	RemoteUnknown,
	Pulled(PullReport),
	Failed { error: String },
}

struct Fetched {
	columns: Vec<String>,
	rows: Vec<Vec<Value>>,
	pages: usize,
}

/// Pull every non-system remote table into the local store. One table's
/// failure is recorded in the report and does not stop the others.
#[instrument(skip_all)]
pub(crate) async fn pull_all_tables(
	local: &LocalStore,
	remote: &Arc<dyn RemoteReplica>,
	settings: &SyncSettings,
	telemetry: &Telemetry,
) -> Result<PullReport, RemoteError> {
	let tables = list_tables(remote, &settings.system_table_prefixes).await?;
	debug!(count = tables.len(), "pulling remote tables");

	let mut report = PullReport::default();
	for table in tables {
		match pull_table(local, remote, settings, &table).await {
			Ok((rows, pages)) => {
				report.tables_pulled += 1;
				report.rows_applied += rows;
				report.pages_fetched += pages;
			}
			Err(e) => {
				warn!(table = %table, error = %e, "failed to pull table");
				telemetry.table_failed(&table, e.to_string());
				report.failures.push(TableFailure {
					table,
					error: e.to_string(),
				});
			}
		}
	}

	info!(
		tables = report.tables_pulled,
		rows = report.rows_applied,
		failures = report.failures.len(),
		"pull complete"
	);
	telemetry.pull_completed(
		report.tables_pulled,
		report.rows_applied,
		report.failures.len(),
	);
	Ok(report)
}

async fn pull_table(
	local: &LocalStore,
	remote: &Arc<dyn RemoteReplica>,
	settings: &SyncSettings,
	table: &str,
) -> Result<(u64, usize), SyncError> {
	let local_columns = local.table_columns(table).await?;
	if local_columns.is_empty() {
		return Err(LocalStoreError::SchemaMismatch(format!(
			"table {table} does not exist locally"
		))
		.into());
	}

	let fetched = if settings.is_large_table(table) {
		fetch_paged(remote, table, settings).await?
	} else {
		fetch_whole(remote, table).await?
	};
	if fetched.rows.is_empty() {
		debug!(table = %table, "remote table is empty");
		return Ok((0, fetched.pages));
	}

	let manifest = column_manifest(table, &fetched.columns, &local_columns);
	if manifest.is_empty() {
		return Err(LocalStoreError::SchemaMismatch(format!(
			"table {table} shares no columns with the remote"
		))
		.into());
	}

	let names: Vec<String> = manifest.iter().map(|(_, name)| name.clone()).collect();
	let rows: Vec<Vec<Value>> = fetched
		.rows
		.into_iter()
		.map(|row| {
			manifest
				.iter()
				.map(|(index, _)| row.get(*index).cloned().unwrap_or(Value::Null))
				.collect()
		})
		.collect();

	local.apply_rows(table, &names, &rows).await?;
	debug!(table = %table, rows = rows.len(), pages = fetched.pages, "table pulled");
	Ok((rows.len() as u64, fetched.pages))
}

async fn fetch_whole(
	remote: &Arc<dyn RemoteReplica>,
	table: &str,
) -> Result<Fetched, RemoteError> {
	let result = remote
		.execute(&format!("SELECT * FROM {}", quote_ident(table)), &[])
		.await?;
	Ok(Fetched {
		columns: result.columns,
		rows: result.rows,
		pages: 1,
	})
}

/// Fetch `table` in `page_size` pages ordered by its primary key (rowid
/// when it has none), sleeping
/// `page_delay` between requests. Issues exactly `ceil(count / page_size)`
/// page requests.
async fn fetch_paged(
	remote: &Arc<dyn RemoteReplica>,
	table: &str,
	settings: &SyncSettings,
) -> Result<Fetched, RemoteError> {
	let quoted = quote_ident(table);
	let count = remote
		.execute(&format!("SELECT COUNT(*) AS n FROM {quoted}"), &[])
		.await?
		.rows
		.first()
		.and_then(|row| row.first())
		.and_then(Value::as_i64)
		.unwrap_or(0);

	let mut fetched = Fetched {
		columns: Vec::new(),
		rows: Vec::new(),
		pages: 0,
	};
	if count <= 0 {
		return Ok(fetched);
	}

	let page_size = i64::from(settings.page_size.max(1));
	let pages = (count + page_size - 1) / page_size;
	let order = paging_order(&primary_key_columns(remote, table).await?);
	let sql = format!("SELECT * FROM {quoted} ORDER BY {order} LIMIT ? OFFSET ?");
	debug!(table = %table, rows = count, pages, "fetching large table in pages");

	for page in 0..pages {
		if page > 0 {
			tokio::time::sleep(settings.page_delay).await;
		}
		let result = remote
			.execute(
				&sql,
				&[Value::Integer(page_size), Value::Integer(page * page_size)],
			)
			.await?;
		if fetched.columns.is_empty() {
			fetched.columns = result.columns;
		}
		fetched.rows.extend(result.rows);
		fetched.pages += 1;
	}
	Ok(fetched)
}

/// Pair each remote result column that the local table also declares with
/// the local spelling of its name.
fn column_manifest(
	table: &str,
	remote_columns: &[String],
	local_columns: &[String],
) -> Vec<(usize, String)> {
	let mut manifest: Vec<(usize, String)> = Vec::new();
	let mut remote_only = Vec::new();

	for (index, column) in remote_columns.iter().enumerate() {
		match local_columns.iter().find(|c| c.eq_ignore_ascii_case(column)) {
			Some(local) if !manifest.iter().any(|(_, name)| name == local) => {
				manifest.push((index, local.clone()));
			}
			Some(_) => {}
			None => remote_only.push(column.as_str()),
		}
	}

	if !remote_only.is_empty() {
		debug!(table = %table, columns = ?remote_only, "skipping remote-only columns");
	}
	manifest
}
