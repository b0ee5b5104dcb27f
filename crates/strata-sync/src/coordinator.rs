// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! The sync coordinator: local-first reads and writes with opportunistic
//! convergence against the remote replica.
//!
//! Callers only ever talk to the local store. A read-write instance with a
//! remote also runs two background tasks:
//!
//! - a pull-check loop that compares modification clocks every
//!   `pull_interval` and pulls all remote tables when the remote is newer;
//! - a push worker that sends captured mutations once the debounce window
//!   goes quiet.
//!
//! Remote failures are logged, counted and broadcast as [`SyncEvent`]s. They
//! never surface from [`SyncCoordinator::run`], [`SyncCoordinator::get`],
//! [`SyncCoordinator::all`] or [`SyncCoordinator::exec`].

use std::cmp::Ordering as ValueOrdering;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::clock::modification_clock;
use crate::error::{LocalStoreError, SyncError};
use crate::local::{AccessMode, LocalStatement, LocalStore};
use crate::pending::PendingPushStore;
use crate::pull::{self, PullOutcome, PullReport};
use crate::push::{PushEntry, PushHandle, PushReport, PushWorker};
use crate::remote::{HranaClient, RemoteReplica};
use crate::settings::SyncSettings;
use crate::statement::StatementKind;
use crate::telemetry::{SyncEvent, SyncStatsSnapshot, Telemetry};
use crate::value::{Row, RunResult, Value};

const MIN_PULL_INTERVAL: Duration = Duration::from_secs(1);

struct Inner {
	local: LocalStore,
	remote: Option<Arc<dyn RemoteReplica>>,
	pending: Option<PendingPushStore>,
	settings: SyncSettings,
	telemetry: Arc<Telemetry>,
}

impl Inner {
	async fn check_and_pull(&self) -> PullOutcome {
		let Some(remote) = &self.remote else {
			return PullOutcome::Disabled;
		};
		self.telemetry.pull_check();
		let prefixes = &self.settings.system_table_prefixes;

		let local_clock = match modification_clock(&self.local, prefixes).await {
			Ok(clock) => clock,
			Err(e) => {
				warn!(error = %e, "failed to read local modification clock");
				return self.pull_failed(e.to_string());
			}
		};

		let remote_clock = match tokio::time::timeout(
			self.settings.freshness_timeout,
			modification_clock(remote, prefixes),
		)
		.await
		{
			Ok(Ok(clock)) => Some(clock),
			Ok(Err(e)) => {
				warn!(error = %e, "remote modification clock unavailable");
				self.telemetry.remote_unknown(e.to_string());
				None
			}
			Err(_) => {
				warn!(
					timeout_ms = self.settings.freshness_timeout.as_millis() as u64,
					"remote modification clock timed out"
				);
				self.telemetry.remote_unknown("timed out".to_string());
				None
			}
		};

		match remote_clock {
			None if !self.settings.pull_on_unknown_remote => return PullOutcome::RemoteUnknown,
			None => info!("remote freshness unknown, pulling anyway"),
			Some(remote_clock) => {
				let newer = matches!(
					(&local_clock, &remote_clock),
					(Some(l), Some(r)) if r.sqlite_cmp(l) == ValueOrdering::Greater
				);
				if !newer {
					debug!(local = ?local_clock, remote = ?remote_clock, "remote not newer, skipping pull");
					self.telemetry.emit(SyncEvent::PullSkipped {
						local: local_clock.clone(),
						remote: remote_clock.clone(),
					});
					return PullOutcome::Skipped {
						local: local_clock,
						remote: remote_clock,
					};
				}
				info!(local = ?local_clock, remote = ?remote_clock, "remote is newer, pulling");
			}
		}

		match pull::pull_all_tables(&self.local, remote, &self.settings, &self.telemetry).await {
			Ok(report) => PullOutcome::Pulled(report),
			Err(e) => {
				warn!(error = %e, "pull failed");
				self.pull_failed(e.to_string())
			}
		}
	}

	fn pull_failed(&self, error: String) -> PullOutcome {
		self.telemetry.emit(SyncEvent::PullFailed {
			error: error.clone(),
		});
		PullOutcome::Failed { error }
	}
}

/// Point-in-time view of one coordinator, as reported by `strata status`.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
	pub mode: AccessMode,
	pub database: String,
	pub remote: bool,
	pub local_clock: Option<Value>,
	/// `None` when there is no remote or it did not answer in time.
	pub remote_clock: Option<Value>,
	pub queued_pushes: usize,
	pub dead_lettered: usize,
	pub stats: SyncStatsSnapshot,
}

pub struct SyncCoordinator {
	inner: Arc<Inner>,
	mode: AccessMode,
	push: Option<PushHandle>,
	push_task: Mutex<Option<JoinHandle<()>>>,
	pull_task: Mutex<Option<JoinHandle<()>>>,
	shutdown_tx: broadcast::Sender<()>,
	closed: AtomicBool,
}

impl std::fmt::Debug for SyncCoordinator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SyncCoordinator")
			.field("database", &self.inner.local.path())
			.field("mode", &self.mode)
			.field("remote", &self.inner.remote.is_some())
			.field("closed", &self.closed.load(Ordering::SeqCst))
			.finish()
	}
}

impl SyncCoordinator {
	/// Open the local store and, for a read-write instance with remote
	/// credentials, start the pull-check loop and push worker.
	pub async fn open(settings: SyncSettings, mode: AccessMode) -> Result<Self, SyncError> {
		let remote = match (&settings.remote, mode) {
			(Some(config), AccessMode::ReadWrite) => {
				let client = HranaClient::from_config(config, &settings.retry)?;
				Some(Arc::new(client) as Arc<dyn RemoteReplica>)
			}
			_ => None,
		};
		Self::start(settings, mode, remote).await
	}

	/// Like [`SyncCoordinator::open`] but with a caller-supplied replica.
	/// Read-only instances ignore it.
	pub async fn open_with_replica(
		settings: SyncSettings,
		mode: AccessMode,
		replica: Arc<dyn RemoteReplica>,
	) -> Result<Self, SyncError> {
		Self::start(settings, mode, Some(replica)).await
	}

	#[instrument(skip_all, fields(path = %settings.database_path.display(), mode = ?mode))]
	async fn start(
		settings: SyncSettings,
		mode: AccessMode,
		remote: Option<Arc<dyn RemoteReplica>>,
	) -> Result<Self, SyncError> {
		let local = LocalStore::open(&settings.database_path, mode, settings.busy_timeout).await?;
		let remote = remote.filter(|_| mode == AccessMode::ReadWrite);
		let pending = match (&remote, &settings.pending_file) {
			(Some(_), Some(path)) => Some(PendingPushStore::new(path)),
			_ => None,
		};
		let telemetry = Arc::new(Telemetry::new(settings.event_capacity));
		let (shutdown_tx, _) = broadcast::channel(1);

		let (push, push_task) = match &remote {
			Some(remote) => {
				let (handle, task) = PushWorker::new(
					Arc::clone(remote),
					pending.clone(),
					Arc::clone(&telemetry),
					settings.push_debounce,
					settings.max_pending_attempts,
				)
				.spawn();
				(Some(handle), Some(task))
			}
			None => {
				info!("no remote configured, running local-only");
				(None, None)
			}
		};

		let inner = Arc::new(Inner {
			local,
			remote,
			pending,
			settings,
			telemetry,
		});

		let pull_task = inner.remote.is_some().then(|| {
			spawn_pull_loop(
				Arc::clone(&inner),
				push.clone(),
				shutdown_tx.subscribe(),
			)
		});

		Ok(Self {
			inner,
			mode,
			push,
			push_task: Mutex::new(push_task),
			pull_task: Mutex::new(pull_task),
			shutdown_tx,
			closed: AtomicBool::new(false),
		})
	}

	pub fn mode(&self) -> AccessMode {
		self.mode
	}

	pub fn has_remote(&self) -> bool {
		self.inner.remote.is_some()
	}

	pub fn local(&self) -> &LocalStore {
		&self.inner.local
	}

	pub fn settings(&self) -> &SyncSettings {
		&self.inner.settings
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	/// Run a statement locally. Inserts, updates and deletes are also queued
	/// for the remote once the local write has succeeded.
	pub async fn run(&self, sql: &str, args: &[Value]) -> Result<RunResult, LocalStoreError> {
		let result = self.inner.local.run(sql, args).await?;
		self.capture(sql, args);
		Ok(result)
	}

	pub async fn get(&self, sql: &str, args: &[Value]) -> Result<Option<Row>, LocalStoreError> {
		self.inner.local.get(sql, args).await
	}

	pub async fn all(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>, LocalStoreError> {
		self.inner.local.all(sql, args).await
	}

	/// Run schema statements locally. Never replicated.
	pub async fn exec(&self, sql: &str) -> Result<(), LocalStoreError> {
		self.inner.local.exec(sql).await
	}

	pub async fn prepare(&self, sql: &str) -> Result<PreparedStatement<'_>, LocalStoreError> {
		let statement = self.inner.local.prepare(sql).await?;
		Ok(PreparedStatement {
			coordinator: self,
			statement,
		})
	}

	fn capture(&self, sql: &str, args: &[Value]) {
		let Some(push) = &self.push else {
			return;
		};
		if !StatementKind::classify(sql).is_mutation() {
			return;
		}
		if !push.enqueue(PushEntry::new(sql, args.to_vec())) {
			warn!(sql = %sql, "push worker stopped, mutation not queued");
		}
	}

	/// Compare clocks and pull if the remote is newer.
	pub async fn check_and_pull(&self) -> PullOutcome {
		self.inner.check_and_pull().await
	}

	/// Pull every remote table regardless of clocks.
	pub async fn pull_all_tables(&self) -> Result<PullReport, SyncError> {
		let remote = self.inner.remote.as_ref().ok_or(SyncError::RemoteDisabled)?;
		Ok(pull::pull_all_tables(
			&self.inner.local,
			remote,
			&self.inner.settings,
			&self.inner.telemetry,
		)
		.await?)
	}

	/// Push everything queued now. `None` without a remote.
	pub async fn flush_push(&self, replay_pending: bool) -> Option<PushReport> {
		self.push.as_ref()?.flush(replay_pending).await
	}

	pub fn queued_push_count(&self) -> usize {
		self.push.as_ref().map(PushHandle::queued).unwrap_or(0)
	}

	pub async fn dead_letter_count(&self) -> Result<usize, SyncError> {
		match &self.inner.pending {
			Some(pending) => Ok(pending.count().await?),
			None => Ok(0),
		}
	}

	pub async fn local_clock(&self) -> Result<Option<Value>, SyncError> {
		Ok(modification_clock(&self.inner.local, &self.inner.settings.system_table_prefixes).await?)
	}

	pub async fn remote_clock(&self) -> Result<Option<Value>, SyncError> {
		let remote = self.inner.remote.as_ref().ok_or(SyncError::RemoteDisabled)?;
		Ok(modification_clock(remote, &self.inner.settings.system_table_prefixes).await?)
	}

	pub async fn status(&self) -> Result<SyncStatus, SyncError> {
		let remote_clock = match &self.inner.remote {
			Some(_) => tokio::time::timeout(self.inner.settings.freshness_timeout, self.remote_clock())
				.await
				.ok()
				.and_then(Result::ok)
				.flatten(),
			None => None,
		};

		Ok(SyncStatus {
			mode: self.mode,
			database: self.inner.local.path().display().to_string(),
			remote: self.has_remote(),
			local_clock: self.local_clock().await?,
			remote_clock,
			queued_pushes: self.queued_push_count(),
			dead_lettered: self.dead_letter_count().await?,
			stats: self.stats(),
		})
	}

	pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
		self.inner.telemetry.subscribe()
	}

	pub fn stats(&self) -> SyncStatsSnapshot {
		self.inner.telemetry.snapshot()
	}

	/// Stop the pull-check loop, drain the push queue, then close the local
	/// store. Later calls do nothing.
	pub async fn close(&self) {
		if self.closed.swap(true, Ordering::SeqCst) {
			return;
		}

		let _ = self.shutdown_tx.send(());
		if let Some(task) = self.pull_task.lock().await.take() {
			if let Err(e) = task.await {
				warn!(error = %e, "pull-check loop ended abnormally");
			}
		}

		if let Some(push) = &self.push {
			if let Some(report) = push.shutdown().await {
				debug!(?report, "final push flush");
			}
		}
		if let Some(task) = self.push_task.lock().await.take() {
			if let Err(e) = task.await {
				warn!(error = %e, "push worker ended abnormally");
			}
		}

		self.inner.local.close().await;
		info!(mode = ?self.mode, "sync coordinator closed");
	}
}

/// A compiled statement whose `run` is captured for push like
/// [`SyncCoordinator::run`].
#[derive(Debug)]
pub struct PreparedStatement<'c> {
	coordinator: &'c SyncCoordinator,
	statement: LocalStatement<'c>,
}

impl PreparedStatement<'_> {
	pub fn sql(&self) -> &str {
		self.statement.sql()
	}

	pub fn columns(&self) -> &[String] {
		self.statement.columns()
	}

	pub async fn run(&self, args: &[Value]) -> Result<RunResult, LocalStoreError> {
		let result = self.statement.run(args).await?;
		self.coordinator.capture(self.statement.sql(), args);
		Ok(result)
	}

	pub async fn get(&self, args: &[Value]) -> Result<Option<Row>, LocalStoreError> {
		self.statement.get(args).await
	}

	pub async fn all(&self, args: &[Value]) -> Result<Vec<Row>, LocalStoreError> {
		self.statement.all(args).await
	}
}

fn spawn_pull_loop(
	inner: Arc<Inner>,
	push: Option<PushHandle>,
	mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
	tokio::spawn(async move {
		let period = inner.settings.pull_interval.max(MIN_PULL_INTERVAL);
		let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		info!(interval_secs = period.as_secs(), "pull-check loop started");

		loop {
			tokio::select! {
				_ = ticker.tick() => {
					let outcome = inner.check_and_pull().await;
					debug!(?outcome, "pull check finished");
					if let Some(push) = &push {
						push.replay_pending();
					}
				}
				_ = shutdown_rx.recv() => {
					info!("pull-check loop stopping");
					break;
				}
			}
		}
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{test_settings, ScriptedReplica};
	use std::path::Path;
	use tempfile::TempDir;

	const NOTES: &str =
		"CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT, updated_at TEXT)";

	async fn replica(schema: &str) -> Arc<ScriptedReplica> {
		let replica = ScriptedReplica::new().await;
		replica.store().exec(schema).await.unwrap();
		Arc::new(replica)
	}

	async fn open(dir: &Path, replica: &Arc<ScriptedReplica>) -> SyncCoordinator {
		open_with(test_settings(dir), replica).await
	}

	async fn open_with(settings: SyncSettings, replica: &Arc<ScriptedReplica>) -> SyncCoordinator {
		let remote: Arc<dyn RemoteReplica> = replica.clone();
		SyncCoordinator::open_with_replica(settings, AccessMode::ReadWrite, remote)
			.await
			.unwrap()
	}

	#[tokio::test]
	async fn reads_own_writes_while_remote_rejects_everything() {
		let dir = TempDir::new().unwrap();
		let replica = replica(NOTES).await;
		replica.set_failing(true);
		let coordinator = open(dir.path(), &replica).await;

		coordinator.exec(NOTES).await.unwrap();
		coordinator
			.run(
				"INSERT INTO notes (id, body) VALUES (?, ?)",
				&[Value::Integer(1), Value::from("hello")],
			)
			.await
			.unwrap();

		let row = coordinator
			.get("SELECT body FROM notes WHERE id = ?", &[Value::Integer(1)])
			.await
			.unwrap()
			.unwrap();
		assert_eq!(row.get("body"), Some(&Value::from("hello")));

		let report = coordinator.flush_push(false).await.unwrap();
		assert_eq!(report.failed, 1);
		assert_eq!(report.dead_lettered, 1);
		assert_eq!(coordinator.dead_letter_count().await.unwrap(), 1);

		coordinator.close().await;
	}

	#[tokio::test]
	async fn slow_remote_never_blocks_local_calls() {
		let dir = TempDir::new().unwrap();
		let replica = replica(NOTES).await;
		replica.set_delay(Some(Duration::from_millis(800)));
		let coordinator = open(dir.path(), &replica).await;
		let budget = Duration::from_millis(400);

		tokio::time::timeout(budget, coordinator.exec(NOTES))
			.await
			.unwrap()
			.unwrap();
		tokio::time::timeout(
			budget,
			coordinator.run("INSERT INTO notes (id, body) VALUES (1, 'a')", &[]),
		)
		.await
		.unwrap()
		.unwrap();
		tokio::time::timeout(budget, coordinator.all("SELECT * FROM notes", &[]))
			.await
			.unwrap()
			.unwrap();
		tokio::time::timeout(budget, coordinator.get("SELECT * FROM notes", &[]))
			.await
			.unwrap()
			.unwrap();

		replica.set_delay(None);
		coordinator.close().await;
	}

	#[tokio::test]
	async fn malformed_remote_responses_stay_contained() {
		let dir = TempDir::new().unwrap();
		let replica = replica(NOTES).await;
		replica.set_malformed(true);
		let coordinator = open(dir.path(), &replica).await;

		coordinator.exec(NOTES).await.unwrap();
		coordinator
			.run(
				"INSERT INTO notes (id, body) VALUES (?, ?)",
				&[Value::Integer(1), Value::from("hello")],
			)
			.await
			.unwrap();
		let row = coordinator
			.get("SELECT body FROM notes WHERE id = ?", &[Value::Integer(1)])
			.await
			.unwrap()
			.unwrap();
		assert_eq!(row.get("body"), Some(&Value::from("hello")));
		assert_eq!(coordinator.all("SELECT * FROM notes", &[]).await.unwrap().len(), 1);

		assert_eq!(coordinator.check_and_pull().await, PullOutcome::RemoteUnknown);
		assert_eq!(coordinator.stats().remote_unknown, 1);

		let report = coordinator.flush_push(false).await.unwrap();
		assert_eq!(report.attempted, 1);
		assert_eq!(report.failed, 1);
		assert_eq!(report.dead_lettered, 1);

		replica.set_malformed(false);
		coordinator.close().await;
	}

	#[tokio::test]
	async fn equal_clocks_skip_the_pull() {
		let dir = TempDir::new().unwrap();
		let row = "INSERT INTO notes VALUES (1, 'same', '2024-01-01')";
		let replica = replica(NOTES).await;
		replica.store().exec(row).await.unwrap();
		let coordinator = open(dir.path(), &replica).await;
		coordinator.exec(NOTES).await.unwrap();
		coordinator.exec(row).await.unwrap();

		let outcome = coordinator.check_and_pull().await;

		assert!(matches!(outcome, PullOutcome::Skipped { .. }));
		assert_eq!(coordinator.stats().pulls, 0);
		assert_eq!(replica.count_matching("SELECT * FROM"), 0);
		coordinator.close().await;
	}

	#[tokio::test]
	async fn newer_remote_pulls_exactly_once() {
		let dir = TempDir::new().unwrap();
		let replica = replica(NOTES).await;
		replica
			.store()
			.exec("INSERT INTO notes VALUES (1, 'remote', '2024-02-01')")
			.await
			.unwrap();
		let coordinator = open(dir.path(), &replica).await;
		coordinator.exec(NOTES).await.unwrap();
		coordinator
			.exec("INSERT INTO notes VALUES (1, 'local', '2024-01-01')")
			.await
			.unwrap();

		let outcome = coordinator.check_and_pull().await;

		let PullOutcome::Pulled(report) = outcome else {
			panic!("expected a pull, got {outcome:?}");
		};
		assert_eq!(report.rows_applied, 1);
		assert_eq!(coordinator.stats().pulls, 1);
		assert_eq!(replica.count_matching("SELECT * FROM \"notes\""), 1);

		let row = coordinator
			.get("SELECT body FROM notes WHERE id = 1", &[])
			.await
			.unwrap()
			.unwrap();
		assert_eq!(row.get("body"), Some(&Value::from("remote")));

		let again = coordinator.check_and_pull().await;
		assert!(matches!(again, PullOutcome::Skipped { .. }));
		assert_eq!(coordinator.stats().pulls, 1);
		coordinator.close().await;
	}

	#[tokio::test]
	async fn empty_local_store_does_not_pull_on_check() {
		let dir = TempDir::new().unwrap();
		let replica = replica(NOTES).await;
		replica
			.store()
			.exec("INSERT INTO notes VALUES (1, 'remote', '2024-02-01')")
			.await
			.unwrap();
		let coordinator = open(dir.path(), &replica).await;
		coordinator.exec(NOTES).await.unwrap();

		assert!(matches!(
			coordinator.check_and_pull().await,
			PullOutcome::Skipped { local: None, .. }
		));

		let report = coordinator.pull_all_tables().await.unwrap();
		assert_eq!(report.rows_applied, 1);
		coordinator.close().await;
	}

	#[tokio::test]
	async fn large_table_bootstrap_pulls_every_row() {
		let dir = TempDir::new().unwrap();
		let schema = "CREATE TABLE events (id INTEGER PRIMARY KEY, created_at TEXT)";
		let replica = replica(schema).await;
		replica
			.store()
			.exec(
				"WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < 1200)
				 INSERT INTO events (id, created_at) SELECT n, '2024-01-01' FROM seq",
			)
			.await
			.unwrap();
		let coordinator = open(dir.path(), &replica).await;
		coordinator.exec(schema).await.unwrap();

		let report = coordinator.pull_all_tables().await.unwrap();

		assert_eq!(replica.count_matching("LIMIT ? OFFSET ?"), 3);
		assert_eq!(report.rows_applied, 1200);
		let count = coordinator
			.get("SELECT COUNT(*) AS n FROM events", &[])
			.await
			.unwrap()
			.unwrap();
		assert_eq!(count.get("n"), Some(&Value::Integer(1200)));
		coordinator.close().await;
	}

	#[tokio::test]
	async fn duplicate_insert_reports_no_errors() {
		let dir = TempDir::new().unwrap();
		let schema = "CREATE TABLE t (id INTEGER PRIMARY KEY)";
		let replica = replica(schema).await;
		replica
			.store()
			.run("INSERT INTO t(id) VALUES (5)", &[])
			.await
			.unwrap();
		let coordinator = open(dir.path(), &replica).await;
		coordinator.exec(schema).await.unwrap();

		coordinator
			.run("INSERT INTO t(id) VALUES (5)", &[])
			.await
			.unwrap();
		let report = coordinator.flush_push(false).await.unwrap();

		assert_eq!(report.failed, 0);
		assert_eq!(report.duplicates, 1);
		assert_eq!(coordinator.stats().push_failures, 0);
		coordinator.close().await;
	}

	#[tokio::test]
	async fn burst_of_writes_is_pushed_in_one_cycle() {
		let dir = TempDir::new().unwrap();
		let replica = replica(NOTES).await;
		let coordinator = open(dir.path(), &replica).await;
		coordinator.exec(NOTES).await.unwrap();

		for id in 1..=3 {
			coordinator
				.run(
					"INSERT INTO notes (id, body) VALUES (?, 'x')",
					&[Value::Integer(id)],
				)
				.await
				.unwrap();
		}
		assert_eq!(coordinator.queued_push_count(), 3);

		tokio::time::sleep(Duration::from_millis(500)).await;

		let stats = coordinator.stats();
		assert_eq!(stats.push_cycles, 1);
		assert_eq!(stats.entries_pushed, 3);
		assert_eq!(replica.count_matching("INSERT INTO notes"), 3);
		coordinator.close().await;
	}

	#[tokio::test]
	async fn only_mutations_are_replicated() {
		let dir = TempDir::new().unwrap();
		let replica = replica(NOTES).await;
		let coordinator = open(dir.path(), &replica).await;

		coordinator.exec(NOTES).await.unwrap();
		coordinator
			.exec("CREATE INDEX notes_body ON notes (body)")
			.await
			.unwrap();
		coordinator.run("SELECT 1", &[]).await.unwrap();
		coordinator
			.run("  -- note\n update notes SET body = 'y'", &[])
			.await
			.unwrap();
		coordinator.flush_push(false).await.unwrap();

		let statements = replica.statements();
		assert!(statements.iter().all(|s| !s.contains("CREATE")));
		assert!(statements.iter().all(|s| s != "SELECT 1"));
		assert_eq!(replica.count_matching("update notes"), 1);
		coordinator.close().await;
	}

	#[tokio::test]
	async fn prepared_statements_are_captured() {
		let dir = TempDir::new().unwrap();
		let replica = replica(NOTES).await;
		let coordinator = open(dir.path(), &replica).await;
		coordinator.exec(NOTES).await.unwrap();

		let insert = coordinator
			.prepare("INSERT INTO notes (id, body) VALUES (?, ?)")
			.await
			.unwrap();
		insert
			.run(&[Value::Integer(1), Value::from("a")])
			.await
			.unwrap();
		insert
			.run(&[Value::Integer(2), Value::from("b")])
			.await
			.unwrap();
		drop(insert);

		let report = coordinator.flush_push(false).await.unwrap();
		assert_eq!(report.succeeded, 2);
		let rows = replica.store().all("SELECT * FROM notes", &[]).await.unwrap();
		assert_eq!(rows.len(), 2);
		coordinator.close().await;
	}

	#[tokio::test]
	async fn close_drains_queue_and_is_idempotent() {
		let dir = TempDir::new().unwrap();
		let mut settings = test_settings(dir.path());
		settings.push_debounce = Duration::from_secs(3600);
		let replica = replica(NOTES).await;
		let coordinator = open_with(settings, &replica).await;
		coordinator.exec(NOTES).await.unwrap();

		coordinator
			.run("INSERT INTO notes (id, body) VALUES (1, 'bye')", &[])
			.await
			.unwrap();
		coordinator.close().await;
		coordinator.close().await;

		assert!(coordinator.is_closed());
		let rows = replica.store().all("SELECT * FROM notes", &[]).await.unwrap();
		assert_eq!(rows.len(), 1);
		assert!(coordinator.all("SELECT * FROM notes", &[]).await.is_err());
	}

	#[tokio::test]
	async fn slow_remote_clock_is_unknown() {
		let dir = TempDir::new().unwrap();
		let replica = replica(NOTES).await;
		replica.set_delay(Some(Duration::from_secs(2)));
		let coordinator = open(dir.path(), &replica).await;
		coordinator.exec(NOTES).await.unwrap();

		let outcome = coordinator.check_and_pull().await;

		assert_eq!(outcome, PullOutcome::RemoteUnknown);
		let stats = coordinator.stats();
		assert_eq!(stats.remote_unknown, 1);
		assert_eq!(stats.pulls, 0);
		replica.set_delay(None);
		coordinator.close().await;
	}

	#[tokio::test]
	async fn unknown_remote_pulls_when_configured() {
		let dir = TempDir::new().unwrap();
		let mut settings = test_settings(dir.path());
		settings.pull_on_unknown_remote = true;
		settings.freshness_timeout = Duration::from_millis(200);
		let replica = replica(NOTES).await;
		replica
			.store()
			.exec("INSERT INTO notes VALUES (1, 'remote', '2024-02-01')")
			.await
			.unwrap();
		replica.set_delay(Some(Duration::from_millis(300)));
		let coordinator = open_with(settings, &replica).await;
		coordinator.exec(NOTES).await.unwrap();

		let outcome = coordinator.check_and_pull().await;

		assert!(matches!(outcome, PullOutcome::Pulled(_)), "{outcome:?}");
		let rows = coordinator.all("SELECT * FROM notes", &[]).await.unwrap();
		assert_eq!(rows.len(), 1);
		replica.set_delay(None);
		coordinator.close().await;
	}

	#[tokio::test]
	async fn pull_check_loop_runs_on_interval() {
		let dir = TempDir::new().unwrap();
		let mut settings = test_settings(dir.path());
		settings.pull_interval = Duration::from_secs(1);
		let replica = replica(NOTES).await;
		replica
			.store()
			.exec("INSERT INTO notes VALUES (1, 'remote', '2024-02-01')")
			.await
			.unwrap();
		let coordinator = open_with(settings, &replica).await;
		coordinator.exec(NOTES).await.unwrap();
		coordinator
			.exec("INSERT INTO notes VALUES (1, 'local', '2024-01-01')")
			.await
			.unwrap();
		assert_eq!(coordinator.stats().pull_checks, 0);

		tokio::time::sleep(Duration::from_millis(1500)).await;

		let stats = coordinator.stats();
		assert_eq!(stats.pull_checks, 1);
		assert_eq!(stats.pulls, 1);
		coordinator.close().await;
	}

	#[tokio::test]
	async fn events_are_broadcast() {
		let dir = TempDir::new().unwrap();
		let replica = replica(NOTES).await;
		let coordinator = open(dir.path(), &replica).await;
		coordinator.exec(NOTES).await.unwrap();
		let mut events = coordinator.subscribe();

		coordinator.pull_all_tables().await.unwrap();

		assert_eq!(
			events.recv().await.unwrap(),
			SyncEvent::PullCompleted {
				tables: 1,
				rows: 0,
				failures: 0,
			}
		);
		coordinator.close().await;
	}

	#[tokio::test]
	async fn local_only_instance_has_no_remote_activity() {
		let dir = TempDir::new().unwrap();
		let settings = SyncSettings::local_only(dir.path().join("solo.db"));
		let coordinator = SyncCoordinator::open(settings, AccessMode::ReadWrite)
			.await
			.unwrap();

		coordinator.exec(NOTES).await.unwrap();
		coordinator
			.run("INSERT INTO notes (id, body) VALUES (1, 'a')", &[])
			.await
			.unwrap();

		assert!(!coordinator.has_remote());
		assert_eq!(coordinator.check_and_pull().await, PullOutcome::Disabled);
		assert!(matches!(
			coordinator.pull_all_tables().await,
			Err(SyncError::RemoteDisabled)
		));
		assert!(coordinator.flush_push(true).await.is_none());
		assert_eq!(coordinator.queued_push_count(), 0);
		assert_eq!(coordinator.stats().pull_checks, 0);
		coordinator.close().await;
	}

	#[tokio::test]
	async fn read_only_instance_ignores_replica_and_rejects_writes() {
		let dir = TempDir::new().unwrap();
		let settings = test_settings(dir.path());
		let writer = SyncCoordinator::open(settings.clone(), AccessMode::ReadWrite)
			.await
			.unwrap();
		writer.exec(NOTES).await.unwrap();

		let replica = replica(NOTES).await;
		let remote: Arc<dyn RemoteReplica> = replica.clone();
		let reader = SyncCoordinator::open_with_replica(settings, AccessMode::ReadOnly, remote)
			.await
			.unwrap();

		assert!(!reader.has_remote());
		assert!(reader
			.run("INSERT INTO notes (id, body) VALUES (1, 'a')", &[])
			.await
			.is_err());
		assert!(reader.all("SELECT * FROM notes", &[]).await.unwrap().is_empty());
		assert!(replica.statements().is_empty());

		reader.close().await;
		writer.close().await;
	}

	#[tokio::test]
	async fn status_reports_clocks_and_queues() {
		let dir = TempDir::new().unwrap();
		let mut settings = test_settings(dir.path());
		settings.push_debounce = Duration::from_secs(3600);
		let replica = replica(NOTES).await;
		replica
			.store()
			.exec("INSERT INTO notes VALUES (1, 'r', '2024-02-01')")
			.await
			.unwrap();
		let coordinator = open_with(settings, &replica).await;
		coordinator.exec(NOTES).await.unwrap();
		coordinator
			.run("INSERT INTO notes VALUES (2, 'l', '2024-01-01')", &[])
			.await
			.unwrap();

		let status = coordinator.status().await.unwrap();

		assert!(status.remote);
		assert_eq!(status.mode, AccessMode::ReadWrite);
		assert_eq!(status.local_clock, Some(Value::from("2024-01-01")));
		assert_eq!(status.remote_clock, Some(Value::from("2024-02-01")));
		assert_eq!(status.queued_pushes, 1);
		assert_eq!(status.dead_lettered, 0);

		replica.clear_log();
		coordinator.close().await;
		assert_eq!(replica.count_matching("INSERT INTO notes"), 1);
	}
}
