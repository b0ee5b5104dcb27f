// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Observable side channel for remote activity.
//!
//! Remote failures never reach callers of the store API. Instead they are
//! counted in [`SyncStats`] and broadcast as [`SyncEvent`]s.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
	PullSkipped {
		local: Option<Value>,
		remote: Option<Value>,
	},
	RemoteUnknown {
		reason: String,
	},
	PullCompleted {
		tables: usize,
		rows: u64,
		failures: usize,
	},
	PullTableFailed {
		table: String,
		error: String,
	},
	PullFailed {
		error: String,
	},
	PushFlushed {
		attempted: usize,
		succeeded: usize,
		duplicates: usize,
		failed: usize,
	},
	PushEntryFailed {
		sql: String,
		error: String,
	},
	PushDeadLettered {
		count: usize,
	},
	PushReplayed {
		count: usize,
	},
	PushDropped {
		sql: String,
		attempts: u32,
	},
}

#[derive(Debug, Default)]
pub struct SyncStats {
	pull_checks: AtomicU64,
	pulls: AtomicU64,
	rows_pulled: AtomicU64,
	table_failures: AtomicU64,
	remote_unknown: AtomicU64,
	push_cycles: AtomicU64,
	entries_pushed: AtomicU64,
	duplicates: AtomicU64,
	push_failures: AtomicU64,
	dead_lettered: AtomicU64,
	replayed: AtomicU64,
}

/// Point-in-time copy of [`SyncStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatsSnapshot {
	pub pull_checks: u64,
	pub pulls: u64,
	pub rows_pulled: u64,
	pub table_failures: u64,
	pub remote_unknown: u64,
	pub push_cycles: u64,
	pub entries_pushed: u64,
	pub duplicates: u64,
	pub push_failures: u64,
	pub dead_lettered: u64,
	pub replayed: u64,
}

fn bump(counter: &AtomicU64, by: u64) {
	counter.fetch_add(by, Ordering::Relaxed);
}

impl SyncStats {
	pub fn snapshot(&self) -> SyncStatsSnapshot {
		let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
		SyncStatsSnapshot {
			pull_checks: load(&self.pull_checks),
			pulls: load(&self.pulls),
			rows_pulled: load(&self.rows_pulled),
			table_failures: load(&self.table_failures),
			remote_unknown: load(&self.remote_unknown),
			push_cycles: load(&self.push_cycles),
			entries_pushed: load(&self.entries_pushed),
			duplicates: load(&self.duplicates),
			push_failures: load(&self.push_failures),
			dead_lettered: load(&self.dead_lettered),
			replayed: load(&self.replayed),
		}
	}
}

/// Counters plus event fan-out, shared by the coordinator and its workers.
#[derive(Debug)]
pub struct Telemetry {
	stats: SyncStats,
	events: broadcast::Sender<SyncEvent>,
}

impl Telemetry {
	pub fn new(capacity: usize) -> Self {
		let (events, _) = broadcast::channel(capacity.max(1));
		Self {
			stats: SyncStats::default(),
			events,
		}
	}

	pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
		self.events.subscribe()
	}

	pub fn snapshot(&self) -> SyncStatsSnapshot {
		self.stats.snapshot()
	}

	/// Send to current subscribers; having none is fine.
	pub fn emit(&self, event: SyncEvent) {
		let _ = self.events.send(event);
	}

	pub(crate) fn pull_check(&self) {
		bump(&self.stats.pull_checks, 1);
	}

	pub(crate) fn remote_unknown(&self, reason: String) {
		bump(&self.stats.remote_unknown, 1);
		self.emit(SyncEvent::RemoteUnknown { reason });
	}

	pub(crate) fn pull_completed(&self, tables: usize, rows: u64, failures: usize) {
		bump(&self.stats.pulls, 1);
		bump(&self.stats.rows_pulled, rows);
		self.emit(SyncEvent::PullCompleted {
			tables,
			rows,
			failures,
		});
	}

	pub(crate) fn table_failed(&self, table: &str, error: String) {
		bump(&self.stats.table_failures, 1);
		self.emit(SyncEvent::PullTableFailed {
			table: table.to_string(),
			error,
		});
	}

	pub(crate) fn push_flushed(
		&self,
		attempted: usize,
		succeeded: usize,
		duplicates: usize,
		failed: usize,
	) {
		bump(&self.stats.push_cycles, 1);
		bump(&self.stats.entries_pushed, (succeeded + duplicates) as u64);
		bump(&self.stats.duplicates, duplicates as u64);
		bump(&self.stats.push_failures, failed as u64);
		self.emit(SyncEvent::PushFlushed {
			attempted,
			succeeded,
			duplicates,
			failed,
		});
	}

	pub(crate) fn dead_lettered(&self, count: usize) {
		bump(&self.stats.dead_lettered, count as u64);
		self.emit(SyncEvent::PushDeadLettered { count });
	}

	pub(crate) fn replayed(&self, count: usize) {
		bump(&self.stats.replayed, count as u64);
		self.emit(SyncEvent::PushReplayed { count });
	}
}
