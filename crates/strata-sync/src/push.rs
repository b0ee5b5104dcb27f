// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Debounced push of local mutations to the remote replica.
//!
//! Mutating statements are handed to a worker task over an unbounded channel,
//! so a local write never waits on the network. The worker holds them until
//! the debounce window passes with no new enqueue, then sends each one to the
//! remote independently. Entries that still fail after in-flight retries are
//! written to the dead-letter file and replayed later.

use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::pending::PendingPushStore;
use crate::remote::RemoteReplica;
use crate::telemetry::{SyncEvent, Telemetry};
use crate::value::Value;

/// A mutating statement captured when it ran locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEntry {
	pub sql: String,
	pub args: Vec<Value>,
}

impl PushEntry {
	pub fn new(sql: impl Into<String>, args: Vec<Value>) -> Self {
		Self {
			sql: sql.into(),
			args,
		}
	}
}

/// Outcome of one flush, including any dead-letter replay it ran.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PushReport {
	pub attempted: usize,
	pub succeeded: usize,
	/// Rejected as already present; counted as success.
	pub duplicates: usize,
	pub failed: usize,
	pub dead_lettered: usize,
	pub replayed: usize,
	pub dropped: usize,
}

#[derive(Debug)]
pub enum PushCommand {
	Enqueue(PushEntry),
	/// Push everything queued now, optionally replaying the dead-letter file
	/// first.
	Flush {
		replay_pending: bool,
		reply: oneshot::Sender<PushReport>,
	},
	ReplayPending,
	/// Final flush, then stop.
	Shutdown { reply: oneshot::Sender<PushReport> },
}

/// Sending side of the push worker.
#[derive(Debug, Clone)]
pub struct PushHandle {
	tx: mpsc::UnboundedSender<PushCommand>,
	queued: Arc<AtomicUsize>,
}

impl PushHandle {
	/// Queue `entry`. Returns false once the worker has stopped.
	pub fn enqueue(&self, entry: PushEntry) -> bool {
		self.queued.fetch_add(1, Ordering::SeqCst);
		if self.tx.send(PushCommand::Enqueue(entry)).is_err() {
			self.queued.fetch_sub(1, Ordering::SeqCst);
			return false;
		}
		true
	}

	/// Flush now and wait for the report. `None` if the worker has stopped.
	pub async fn flush(&self, replay_pending: bool) -> Option<PushReport> {
		let (reply, rx) = oneshot::channel();
		self.tx
			.send(PushCommand::Flush {
				replay_pending,
				reply,
			})
			.ok()?;
		rx.await.ok()
	}

	pub fn replay_pending(&self) {
		let _ = self.tx.send(PushCommand::ReplayPending);
	}

	pub async fn shutdown(&self) -> Option<PushReport> {
		let (reply, rx) = oneshot::channel();
		self.tx.send(PushCommand::Shutdown { reply }).ok()?;
		rx.await.ok()
	}

	/// Entries enqueued but not yet taken by a flush.
	pub fn queued(&self) -> usize {
		self.queued.load(Ordering::SeqCst)
	}
}

pub(crate) struct PushWorker {
	remote: Arc<dyn RemoteReplica>,
	pending: Option<PendingPushStore>,
	telemetry: Arc<Telemetry>,
	debounce: Duration,
	max_pending_attempts: u32,
}

impl PushWorker {
	pub(crate) fn new(
		remote: Arc<dyn RemoteReplica>,
		pending: Option<PendingPushStore>,
		telemetry: Arc<Telemetry>,
		debounce: Duration,
		max_pending_attempts: u32,
	) -> Self {
		Self {
			remote,
			pending,
			telemetry,
			debounce,
			max_pending_attempts,
		}
	}

	pub(crate) fn spawn(self) -> (PushHandle, JoinHandle<()>) {
		let (tx, rx) = mpsc::unbounded_channel();
		let queued = Arc::new(AtomicUsize::new(0));
		let handle = PushHandle {
			tx,
			queued: Arc::clone(&queued),
		};
		let task = tokio::spawn(self.run(rx, queued));
		(handle, task)
	}

	async fn run(self, mut rx: mpsc::UnboundedReceiver<PushCommand>, queued: Arc<AtomicUsize>) {
		info!(
			debounce_ms = self.debounce.as_millis() as u64,
			dead_letter = self.pending.is_some(),
			"push worker started"
		);

		let mut queue: Vec<PushEntry> = Vec::new();
		let mut deadline: Option<Instant> = None;

		loop {
			tokio::select! {
				command = rx.recv() => match command {
					Some(PushCommand::Enqueue(entry)) => {
						queue.push(entry);
						deadline = Some(Instant::now() + self.debounce);
					}
					Some(PushCommand::Flush { replay_pending, reply }) => {
						deadline = None;
						let report = self.flush(&mut queue, &queued, replay_pending).await;
						let _ = reply.send(report);
					}
					Some(PushCommand::ReplayPending) => {
						let mut report = PushReport::default();
						self.replay_pending(&mut report).await;
					}
					Some(PushCommand::Shutdown { reply }) => {
						let report = self.flush(&mut queue, &queued, false).await;
						let _ = reply.send(report);
						break;
					}
					None => {
						self.flush(&mut queue, &queued, false).await;
						break;
					}
				},
				_ = wait_for(deadline) => {
					deadline = None;
					self.flush(&mut queue, &queued, false).await;
				}
			}
		}

		info!("push worker stopped");
	}

	async fn flush(
		&self,
		queue: &mut Vec<PushEntry>,
		queued: &AtomicUsize,
		replay_pending: bool,
	) -> PushReport {
		let mut report = PushReport::default();
		if replay_pending {
			self.replay_pending(&mut report).await;
		}

		let batch = mem::take(queue);
		queued.fetch_sub(batch.len(), Ordering::SeqCst);
		if !batch.is_empty() {
			self.process_push_queue(batch, &mut report).await;
		}
		report
	}

	async fn process_push_queue(&self, batch: Vec<PushEntry>, report: &mut PushReport) {
		debug!(count = batch.len(), "pushing queued statements");

		let attempted = batch.len();
		let mut succeeded = 0;
		let mut duplicates = 0;
		let mut failed = Vec::new();

		for entry in batch {
			match self.remote.execute(&entry.sql, &entry.args).await {
				Ok(_) => succeeded += 1,
				Err(e) if e.is_duplicate_key() => {
					debug!(sql = %entry.sql, "remote already has row, treating as pushed");
					duplicates += 1;
				}
				Err(e) => {
					warn!(sql = %entry.sql, error = %e, "failed to push statement");
					self.telemetry.emit(SyncEvent::PushEntryFailed {
						sql: entry.sql.clone(),
						error: e.to_string(),
					});
					failed.push((entry, e.to_string()));
				}
			}
		}

		self.telemetry
			.push_flushed(attempted, succeeded, duplicates, failed.len());
		report.attempted += attempted;
		report.succeeded += succeeded;
		report.duplicates += duplicates;
		report.failed += failed.len();

		if failed.is_empty() {
			return;
		}

		let Some(pending) = &self.pending else {
			error!(
				count = failed.len(),
				"no dead-letter file configured, dropping failed pushes"
			);
			return;
		};

		match pending.append(failed).await {
			Ok(count) => {
				info!(count, path = %pending.path().display(), "saved failed pushes for replay");
				report.dead_lettered += count;
				self.telemetry.dead_lettered(count);
			}
			Err(e) => {
				error!(error = %e, path = %pending.path().display(), "failed to save failed pushes");
			}
		}
	}

	async fn replay_pending(&self, report: &mut PushReport) {
		let Some(pending) = &self.pending else {
			return;
		};

		let mut queue = match pending.load_or_quarantine().await {
			Ok(queue) if queue.is_empty() => return,
			Ok(queue) => queue,
			Err(e) => {
				warn!(error = %e, path = %pending.path().display(), "failed to read dead-letter file");
				return;
			}
		};

		debug!(count = queue.len(), "replaying failed pushes");

		let mut replayed = 0;
		let mut remaining = Vec::with_capacity(queue.len());
		for mut item in mem::take(&mut queue.entries) {
			match self.remote.execute(&item.entry.sql, &item.entry.args).await {
				Ok(_) => replayed += 1,
				Err(e) if e.is_duplicate_key() => replayed += 1,
				Err(e) => {
					item.record_failure(e.to_string());
					if item.retry_count >= self.max_pending_attempts {
						error!(
							sql = %item.entry.sql,
							attempts = item.retry_count,
							error = %e,
							"giving up on failed push"
						);
						self.telemetry.emit(SyncEvent::PushDropped {
							sql: item.entry.sql.clone(),
							attempts: item.retry_count,
						});
						report.dropped += 1;
					} else {
						remaining.push(item);
					}
				}
			}
		}

		queue.entries = remaining;
		if let Err(e) = pending.save(&queue).await {
			error!(error = %e, path = %pending.path().display(), "failed to update dead-letter file");
		}

		if replayed > 0 {
			info!(count = replayed, "replayed failed pushes");
			self.telemetry.replayed(replayed);
		}
		report.replayed += replayed;
	}
}

async fn wait_for(deadline: Option<Instant>) {
	match deadline {
		Some(deadline) => tokio::time::sleep_until(deadline).await,
		None => std::future::pending().await,
	}
}
