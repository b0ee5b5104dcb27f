// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Dead-letter file for pushes the remote would not accept.
//!
//! Entries are written as pretty JSON, replaced atomically via a temporary
//! file and rename, and replayed later by the push worker. A file that no
//! longer parses is renamed to `<name>.corrupt-<timestamp>` and never
//! overwritten.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::PendingStoreError;
use crate::push::PushEntry;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingPushEntry {
	#[serde(flatten)]
	pub entry: PushEntry,
	pub failed_at: String,
	pub retry_count: u32,
	pub last_error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PendingPushQueue {
	pub entries: Vec<PendingPushEntry>,
}

impl PendingPushQueue {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add(&mut self, entry: PushEntry, error: Option<String>) {
		self.entries.push(PendingPushEntry {
			entry,
			failed_at: Utc::now().to_rfc3339(),
			retry_count: 0,
			last_error: error,
		});
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}
}

impl PendingPushEntry {
	/// Record another failed replay.
	pub fn record_failure(&mut self, error: String) {
		self.retry_count += 1;
		self.failed_at = Utc::now().to_rfc3339();
		self.last_error = Some(error);
	}
}

#[derive(Debug, Clone)]
pub struct PendingPushStore {
	path: PathBuf,
}

impl PendingPushStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub async fn load(&self) -> Result<PendingPushQueue, PendingStoreError> {
		if !tokio::fs::try_exists(&self.path).await? {
			return Ok(PendingPushQueue::new());
		}

		let contents = tokio::fs::read_to_string(&self.path).await?;
		let queue: PendingPushQueue = serde_json::from_str(&contents)?;

		debug!(
			path = %self.path.display(),
			count = queue.len(),
			"loaded pending push queue"
		);
		Ok(queue)
	}

	/// Like [`load`](Self::load), but a file that fails to parse is moved
	/// aside and an empty queue returned. I/O errors still propagate.
	pub async fn load_or_quarantine(&self) -> Result<PendingPushQueue, PendingStoreError> {
		match self.load().await {
			Err(PendingStoreError::Serialization(e)) => {
				let moved_to = self.quarantine().await?;
				error!(
					error = %e,
					path = %self.path.display(),
					moved_to = %moved_to.display(),
					"unreadable pending push file moved aside"
				);
				Ok(PendingPushQueue::new())
			}
			other => other,
		}
	}

	async fn quarantine(&self) -> Result<PathBuf, PendingStoreError> {
		let name = self
			.path
			.file_name()
			.map(|n| n.to_string_lossy().into_owned())
			.unwrap_or_else(|| "pending-push.json".to_string());
		let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
		let target = self.path.with_file_name(format!("{name}.corrupt-{stamp}"));
		tokio::fs::rename(&self.path, &target).await?;
		Ok(target)
	}

	/// Replace the file with `queue`; an empty queue removes the file.
	pub async fn save(&self, queue: &PendingPushQueue) -> Result<(), PendingStoreError> {
		if queue.is_empty() {
			return self.clear().await;
		}

		if let Some(parent) = self.path.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}

		let tmp_path = self.path.with_extension("json.tmp");
		let json = serde_json::to_string_pretty(queue)?;

		tokio::fs::write(&tmp_path, &json).await?;
		tokio::fs::rename(&tmp_path, &self.path).await?;

		debug!(
			path = %self.path.display(),
			count = queue.len(),
			"saved pending push queue"
		);
		Ok(())
	}

	/// Append failed entries, each paired with the error that sank it.
	pub async fn append(
		&self,
		failed: Vec<(PushEntry, String)>,
	) -> Result<usize, PendingStoreError> {
		if failed.is_empty() {
			return Ok(0);
		}

		let mut queue = self.load_or_quarantine().await?;

		let added = failed.len();
		for (entry, error) in failed {
			queue.add(entry, Some(error));
		}
		self.save(&queue).await?;
		Ok(added)
	}

	pub async fn count(&self) -> Result<usize, PendingStoreError> {
		Ok(self.load().await?.len())
	}

	pub async fn clear(&self) -> Result<(), PendingStoreError> {
		match tokio::fs::remove_file(&self.path).await {
			Ok(()) => {
				debug!(path = %self.path.display(), "cleared pending push queue");
				Ok(())
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}
}
