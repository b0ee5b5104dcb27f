// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Modification clocks: the newest timestamp-like value found in a store.
//!
//! A table's clock is `MAX(COALESCE(<clock columns>, 0))` over the clock
//! columns it actually has, in [`CLOCK_COLUMNS`] order. Tables without any
//! clock column and empty tables contribute nothing. Clocks are recomputed on
//! every check and never stored.

use std::cmp::Ordering;

use tracing::trace;

use crate::catalog::{list_tables, quote_ident, table_columns, Catalog};
use crate::value::Value;

pub const CLOCK_COLUMNS: [&str; 5] = [
	"updated_at",
	"created_at",
	"last_synced",
	"cached_at",
	"completed_at",
];

/// The clock query for `table`, or `None` when it has no clock column.
pub fn clock_expression(table: &str, columns: &[String]) -> Option<String> {
	let present: Vec<String> = CLOCK_COLUMNS
		.iter()
		.filter_map(|clock| {
			columns
				.iter()
				.find(|c| c.eq_ignore_ascii_case(clock))
				.map(|c| quote_ident(c))
		})
		.collect();

	if present.is_empty() {
		return None;
	}

	Some(format!(
		"SELECT MAX(COALESCE({}, 0)) AS clock FROM {}",
		present.join(", "),
		quote_ident(table)
	))
}

pub async fn table_clock<C: Catalog + ?Sized>(
	catalog: &C,
	table: &str,
) -> Result<Option<Value>, C::Error> {
	let columns = table_columns(catalog, table).await?;
	let Some(sql) = clock_expression(table, &columns) else {
		trace!(table = %table, "table has no clock columns");
		return Ok(None);
	};

	let rows = catalog.select(&sql, &[]).await?;
	Ok(rows
		.into_iter()
		.next()
		.and_then(|row| row.into_values().into_iter().next())
		.filter(|v| !v.is_null()))
}

/// The store-wide clock: the greatest per-table clock under SQLite ordering.
pub async fn modification_clock<C: Catalog + ?Sized>(
	catalog: &C,
	system_prefixes: &[String],
) -> Result<Option<Value>, C::Error> {
	let mut newest: Option<Value> = None;
	for table in list_tables(catalog, system_prefixes).await? {
		if let Some(clock) = table_clock(catalog, &table).await? {
			newest = match newest {
				Some(current) if current.sqlite_cmp(&clock) != Ordering::Less => Some(current),
				_ => Some(clock),
			};
		}
	}
	Ok(newest)
}
