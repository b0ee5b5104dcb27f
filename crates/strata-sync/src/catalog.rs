// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Table discovery that works the same against either store.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{LocalStoreError, RemoteError};
use crate::local::LocalStore;
use crate::remote::RemoteReplica;
use crate::value::{Row, Value};

/// Anything that can answer a read query with rows.
#[async_trait]
pub trait Catalog: Send + Sync {
	type Error: std::error::Error + Send + Sync + 'static;

	async fn select(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>, Self::Error>;
}

#[async_trait]
impl Catalog for LocalStore {
	type Error = LocalStoreError;

	async fn select(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>, Self::Error> {
		self.all(sql, args).await
	}
}

#[async_trait]
impl<R: RemoteReplica + ?Sized> Catalog for Arc<R> {
	type Error = RemoteError;

	async fn select(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>, Self::Error> {
		Ok(self.execute(sql, args).await?.into_rows())
	}
}

/// Quote an identifier for interpolation into SQL.
pub fn quote_ident(name: &str) -> String {
	format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn is_system_table(name: &str, prefixes: &[String]) -> bool {
	prefixes.iter().any(|p| name.starts_with(p.as_str()))
}

/// Names of user tables, sorted, with system-prefixed tables removed.
pub async fn list_tables<C: Catalog + ?Sized>(
	catalog: &C,
	system_prefixes: &[String],
) -> Result<Vec<String>, C::Error> {
	let rows = catalog
		.select(
			"SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
			&[],
		)
		.await?;

	Ok(rows
		.iter()
		.filter_map(|row| row.get_index(0).and_then(Value::as_str))
		.filter(|name| !is_system_table(name, system_prefixes))
		.map(String::from)
		.collect())
}

pub async fn table_columns<C: Catalog + ?Sized>(
	catalog: &C,
	table: &str,
) -> Result<Vec<String>, C::Error> {
	let rows = catalog
		.select(
			"SELECT name FROM pragma_table_info(?)",
			&[Value::from(table)],
		)
		.await?;

	Ok(rows
		.iter()
		.filter_map(|row| row.get_index(0).and_then(Value::as_str))
		.map(String::from)
		.collect())
}

/// Primary-key columns in key order; empty when the table has none.
pub async fn primary_key_columns<C: Catalog + ?Sized>(
	catalog: &C,
	table: &str,
) -> Result<Vec<String>, C::Error> {
	let rows = catalog
		.select(
			"SELECT name FROM pragma_table_info(?) WHERE pk > 0 ORDER BY pk",
			&[Value::from(table)],
		)
		.await?;

	Ok(rows
		.iter()
		.filter_map(|row| row.get_index(0).and_then(Value::as_str))
		.map(String::from)
		.collect())
}

/// A stable `ORDER BY` list for paging: the primary key, else `rowid`.
/// `WITHOUT ROWID` tables always declare a primary key.
pub fn paging_order(primary_key: &[String]) -> String {
	if primary_key.is_empty() {
		return "rowid".to_string();
	}
	primary_key
		.iter()
		.map(|c| quote_ident(c))
		.collect::<Vec<_>>()
		.join(", ")
}
