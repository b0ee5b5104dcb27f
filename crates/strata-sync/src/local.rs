// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! The embedded SQLite store every read and write goes through first.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sqlx::query::Query;
use sqlx::sqlite::{
	SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
	SqliteRow, SqliteSynchronous,
};
use sqlx::{Column, Executor, Row as _, Sqlite, Statement, TypeInfo, ValueRef};
use tracing::{debug, instrument};

use crate::catalog::quote_ident;
use crate::error::LocalStoreError;
use crate::value::{Row, RunResult, Value};

const MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
	ReadWrite,
	ReadOnly,
}

/// Pool-backed handle to one SQLite file. Cloning shares the pool.
#[derive(Debug, Clone)]
pub struct LocalStore {
	pool: SqlitePool,
	path: PathBuf,
	mode: AccessMode,
}

impl LocalStore {
	/// Open (creating if needed) the database at `path` in WAL mode with
	/// `synchronous=NORMAL`. Read-only stores set `query_only` on every
	/// connection so writes fail locally.
	#[instrument(skip_all, fields(path = %path.display(), mode = ?mode))]
	pub async fn open(
		path: &Path,
		mode: AccessMode,
		busy_timeout: Duration,
	) -> Result<Self, LocalStoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			tokio::fs::create_dir_all(parent).await?;
		}

		let mut options = SqliteConnectOptions::new()
			.filename(path)
			.create_if_missing(true)
			.journal_mode(SqliteJournalMode::Wal)
			.synchronous(SqliteSynchronous::Normal)
			.busy_timeout(busy_timeout);
		if mode == AccessMode::ReadOnly {
			options = options.pragma("query_only", "ON");
		}

		let pool = SqlitePoolOptions::new()
			.max_connections(MAX_CONNECTIONS)
			.connect_with(options)
			.await?;

		debug!("local store opened");
		Ok(Self {
			pool,
			path: path.to_path_buf(),
			mode,
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn mode(&self) -> AccessMode {
		self.mode
	}

	/// Compile `sql` without running it. Syntax errors surface here.
	pub async fn prepare(&self, sql: &str) -> Result<LocalStatement<'_>, LocalStoreError> {
		let statement = (&self.pool).prepare(sql).await?;
		let columns = statement
			.columns()
			.iter()
			.map(|c| c.name().to_string())
			.collect();

		Ok(LocalStatement {
			store: self,
			sql: sql.to_string(),
			columns,
		})
	}

	pub async fn run(&self, sql: &str, args: &[Value]) -> Result<RunResult, LocalStoreError> {
		let result = bind_all(sqlx::query(sql), args)
			.execute(&self.pool)
			.await?;
		Ok(RunResult {
			rows_affected: result.rows_affected(),
			last_insert_rowid: result.last_insert_rowid(),
		})
	}

	pub async fn get(&self, sql: &str, args: &[Value]) -> Result<Option<Row>, LocalStoreError> {
		let row = bind_all(sqlx::query(sql), args)
			.fetch_optional(&self.pool)
			.await?;
		row.map(|r| decode_row(&r, &column_names(&r))).transpose()
	}

	pub async fn all(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>, LocalStoreError> {
		let rows = bind_all(sqlx::query(sql), args)
			.fetch_all(&self.pool)
			.await?;

		let Some(first) = rows.first() else {
			return Ok(Vec::new());
		};
		let columns = column_names(first);
		rows.iter().map(|r| decode_row(r, &columns)).collect()
	}

	/// Run one or more argument-less statements, typically DDL.
	pub async fn exec(&self, sql: &str) -> Result<(), LocalStoreError> {
		sqlx::raw_sql(sql).execute(&self.pool).await?;
		Ok(())
	}

	/// Upsert `rows` into `table` with `INSERT OR REPLACE`, all in one
	/// transaction. Each row holds one value per entry of `columns`.
	pub async fn apply_rows(
		&self,
		table: &str,
		columns: &[String],
		rows: &[Vec<Value>],
	) -> Result<u64, LocalStoreError> {
		if rows.is_empty() {
			return Ok(0);
		}
		if columns.is_empty() {
			return Err(LocalStoreError::SchemaMismatch(format!(
				"no columns to apply for table {table}"
			)));
		}

		let column_list = columns
			.iter()
			.map(|c| quote_ident(c))
			.collect::<Vec<_>>()
			.join(", ");
		let placeholders = vec!["?"; columns.len()].join(", ");
		let sql = format!(
			"INSERT OR REPLACE INTO {} ({column_list}) VALUES ({placeholders})",
			quote_ident(table)
		);

		let mut tx = self.pool.begin().await?;
		let mut applied = 0;
		for row in rows {
			if row.len() != columns.len() {
				return Err(LocalStoreError::SchemaMismatch(format!(
					"row for {table} has {} values, expected {}",
					row.len(),
					columns.len()
				)));
			}
			applied += bind_all(sqlx::query(&sql), row)
				.execute(&mut *tx)
				.await?
				.rows_affected();
		}
		tx.commit().await?;

		debug!(table = %table, rows = rows.len(), "applied rows");
		Ok(applied)
	}

	pub async fn table_names(&self) -> Result<Vec<String>, LocalStoreError> {
		let names = sqlx::query_scalar::<_, String>(
			"SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
		)
		.fetch_all(&self.pool)
		.await?;
		Ok(names)
	}

	/// Declared column names of `table`, empty if the table does not exist.
	pub async fn table_columns(&self, table: &str) -> Result<Vec<String>, LocalStoreError> {
		let names = sqlx::query_scalar::<_, String>("SELECT name FROM pragma_table_info(?)")
			.bind(table)
			.fetch_all(&self.pool)
			.await?;
		Ok(names)
	}

	pub async fn close(&self) {
		self.pool.close().await;
		debug!(path = %self.path.display(), "local store closed");
	}

	pub fn is_closed(&self) -> bool {
		self.pool.is_closed()
	}
}

/// A compiled statement bound to its store.
#[derive(Debug)]
pub struct LocalStatement<'s> {
	store: &'s LocalStore,
	sql: String,
	columns: Vec<String>,
}

impl LocalStatement<'_> {
	pub fn sql(&self) -> &str {
		&self.sql
	}

	/// Result columns; empty for statements that return no rows.
	pub fn columns(&self) -> &[String] {
		&self.columns
	}

	pub async fn run(&self, args: &[Value]) -> Result<RunResult, LocalStoreError> {
		self.store.run(&self.sql, args).await
	}

	pub async fn get(&self, args: &[Value]) -> Result<Option<Row>, LocalStoreError> {
		self.store.get(&self.sql, args).await
	}

	pub async fn all(&self, args: &[Value]) -> Result<Vec<Row>, LocalStoreError> {
		self.store.all(&self.sql, args).await
	}
}

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

fn bind_all<'q>(mut query: SqliteQuery<'q>, args: &'q [Value]) -> SqliteQuery<'q> {
	for value in args {
		query = match value {
			Value::Null => query.bind(None::<i64>),
			Value::Integer(i) => query.bind(*i),
			Value::Real(f) => query.bind(*f),
			Value::Text(s) => query.bind(s.as_str()),
			Value::Blob(b) => query.bind(b.as_slice()),
		};
	}
	query
}

fn column_names(row: &SqliteRow) -> Arc<[String]> {
	row.columns().iter().map(|c| c.name().to_string()).collect()
}

fn decode_row(row: &SqliteRow, columns: &Arc<[String]>) -> Result<Row, LocalStoreError> {
	let mut values = Vec::with_capacity(columns.len());
	for index in 0..row.len() {
		let raw = row.try_get_raw(index)?;
		let value = if raw.is_null() {
			Value::Null
		} else {
			let type_name = raw.type_info().name().to_string();
			match type_name.as_str() {
				"INTEGER" | "BOOLEAN" => Value::Integer(row.try_get_unchecked(index)?),
				"REAL" | "NUMERIC" => Value::Real(row.try_get_unchecked(index)?),
				"BLOB" => Value::Blob(row.try_get_unchecked(index)?),
				_ => Value::Text(row.try_get_unchecked(index)?),
			}
		};
		values.push(value);
	}
	Ok(Row::new(Arc::clone(columns), values))
}
