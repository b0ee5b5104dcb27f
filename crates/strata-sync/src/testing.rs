// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Test doubles shared across the crate's unit tests.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tempfile::TempDir;

use crate::error::{LocalStoreError, RemoteError};
use crate::local::{AccessMode, LocalStore};
use crate::remote::{RemoteReplica, ResultSet};
use crate::settings::SyncSettings;
use crate::value::Value;

/// A remote replica backed by its own SQLite file. Records every statement it
/// receives and can be told to fail, answer garbage, or stall.
pub(crate) struct ScriptedReplica {
	_dir: TempDir,
	store: LocalStore,
	log: Mutex<Vec<String>>,
	failing: AtomicBool,
	malformed: AtomicBool,
	delay: Mutex<Option<Duration>>,
}

impl ScriptedReplica {
	pub(crate) async fn new() -> Self {
		let dir = TempDir::new().unwrap();
		let store = LocalStore::open(
			&dir.path().join("remote.db"),
			AccessMode::ReadWrite,
			Duration::from_secs(5),
		)
		.await
		.unwrap();
		Self {
			_dir: dir,
			store,
			log: Mutex::new(Vec::new()),
			failing: AtomicBool::new(false),
			malformed: AtomicBool::new(false),
			delay: Mutex::new(None),
		}
	}

	pub(crate) fn store(&self) -> &LocalStore {
		&self.store
	}

	pub(crate) fn set_failing(&self, failing: bool) {
		self.failing.store(failing, Ordering::SeqCst);
	}

	/// Answer every statement as if the server sent an undecodable pipeline body.
	pub(crate) fn set_malformed(&self, malformed: bool) {
		self.malformed.store(malformed, Ordering::SeqCst);
	}

	pub(crate) fn set_delay(&self, delay: Option<Duration>) {
		*self.delay.lock().unwrap() = delay;
	}

	pub(crate) fn statements(&self) -> Vec<String> {
		self.log.lock().unwrap().clone()
	}

	pub(crate) fn count_matching(&self, needle: &str) -> usize {
		self.log
			.lock()
			.unwrap()
			.iter()
			.filter(|sql| sql.contains(needle))
			.count()
	}

	pub(crate) fn clear_log(&self) {
		self.log.lock().unwrap().clear();
	}
}

fn statement_error(err: LocalStoreError) -> RemoteError {
	match err {
		LocalStoreError::Database(sqlx::Error::Database(db)) => RemoteError::Statement {
			code: db.code().map(|c| c.into_owned()),
			message: db.message().to_string(),
		},
		other => RemoteError::Statement {
			code: None,
			message: other.to_string(),
		},
	}
}

#[async_trait]
impl RemoteReplica for ScriptedReplica {
	async fn execute(&self, sql: &str, args: &[Value]) -> Result<ResultSet, RemoteError> {
		self.log.lock().unwrap().push(sql.to_string());

		let delay = *self.delay.lock().unwrap();
		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}

		if self.failing.load(Ordering::SeqCst) {
			return Err(RemoteError::Server {
				status: StatusCode::SERVICE_UNAVAILABLE,
				message: "scripted outage".to_string(),
			});
		}
		if self.malformed.load(Ordering::SeqCst) {
			return Err(RemoteError::Protocol(
				"invalid pipeline response: expected value at line 1 column 1".to_string(),
			));
		}

		let statement = self.store.prepare(sql).await.map_err(statement_error)?;
		if statement.columns().is_empty() {
			let result = statement.run(args).await.map_err(statement_error)?;
			return Ok(ResultSet {
				columns: Vec::new(),
				rows: Vec::new(),
				rows_affected: result.rows_affected,
				last_insert_rowid: Some(result.last_insert_rowid),
			});
		}

		let columns = statement.columns().to_vec();
		let rows = statement
			.all(args)
			.await
			.map_err(statement_error)?
			.into_iter()
			.map(|row| row.into_values())
			.collect();
		Ok(ResultSet {
			columns,
			rows,
			rows_affected: 0,
			last_insert_rowid: None,
		})
	}
}

/// Settings for a coordinator under test: short debounce, no timer ticks
/// during the test, dead-letter file inside `dir`.
pub(crate) fn test_settings(dir: &Path) -> SyncSettings {
	let mut settings = SyncSettings::local_only(dir.join("local.db"));
	settings.busy_timeout = Duration::from_secs(5);
	settings.pull_interval = Duration::from_secs(3600);
	settings.freshness_timeout = Duration::from_millis(500);
	settings.page_delay = Duration::from_millis(1);
	settings.push_debounce = Duration::from_millis(100);
	settings.pending_file = Some(dir.join("pending-push.json"));
	settings
}
