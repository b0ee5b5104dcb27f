// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! The networked replica the local store converges with.

mod hrana;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::value::{Row, Value};

pub use hrana::HranaClient;

/// Rows and counters returned by one remote statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
	pub columns: Vec<String>,
	pub rows: Vec<Vec<Value>>,
	pub rows_affected: u64,
	pub last_insert_rowid: Option<i64>,
}

impl ResultSet {
	pub fn into_rows(self) -> Vec<Row> {
		let columns: Arc<[String]> = self.columns.into();
		self.rows
			.into_iter()
			.map(|values| Row::new(Arc::clone(&columns), values))
			.collect()
	}
}

/// A remote relational store that executes one statement at a time.
#[async_trait]
pub trait RemoteReplica: Send + Sync {
	async fn execute(&self, sql: &str, args: &[Value]) -> Result<ResultSet, RemoteError>;
}
