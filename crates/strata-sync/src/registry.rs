// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Lazily constructed coordinators, one per access mode.
//!
//! A process builds one [`SyncRegistry`] at startup and passes it to whatever
//! needs storage. The first [`SyncRegistry::get`] for a mode opens that
//! instance; every later call returns the same `Arc`.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::debug;

use crate::coordinator::SyncCoordinator;
use crate::error::SyncError;
use crate::local::AccessMode;
use crate::remote::RemoteReplica;
use crate::settings::SyncSettings;

pub struct SyncRegistry {
	settings: SyncSettings,
	replica: Option<Arc<dyn RemoteReplica>>,
	read_write: OnceCell<Arc<SyncCoordinator>>,
	read_only: OnceCell<Arc<SyncCoordinator>>,
}

impl SyncRegistry {
	pub fn new(settings: SyncSettings) -> Self {
		Self {
			settings,
			replica: None,
			read_write: OnceCell::new(),
			read_only: OnceCell::new(),
		}
	}

	/// Use `replica` instead of a client built from the remote settings.
	pub fn with_replica(settings: SyncSettings, replica: Arc<dyn RemoteReplica>) -> Self {
		Self {
			replica: Some(replica),
			..Self::new(settings)
		}
	}

	pub fn settings(&self) -> &SyncSettings {
		&self.settings
	}

	fn slot(&self, mode: AccessMode) -> &OnceCell<Arc<SyncCoordinator>> {
		match mode {
			AccessMode::ReadWrite => &self.read_write,
			AccessMode::ReadOnly => &self.read_only,
		}
	}

	pub async fn get(&self, mode: AccessMode) -> Result<Arc<SyncCoordinator>, SyncError> {
		let coordinator = self
			.slot(mode)
			.get_or_try_init(|| async {
				debug!(mode = ?mode, path = %self.settings.database_path.display(), "opening sync instance");
				let settings = self.settings.clone();
				let coordinator = match &self.replica {
					Some(replica) => {
						SyncCoordinator::open_with_replica(settings, mode, Arc::clone(replica)).await?
					}
					None => SyncCoordinator::open(settings, mode).await?,
				};
				Ok::<_, SyncError>(Arc::new(coordinator))
			})
			.await?;
		Ok(Arc::clone(coordinator))
	}

	/// The instance for `mode` if something has already opened it.
	pub fn get_if_initialized(&self, mode: AccessMode) -> Option<Arc<SyncCoordinator>> {
		self.slot(mode).get().cloned()
	}

	/// Close every instance opened so far.
	pub async fn close(&self) {
		for mode in [AccessMode::ReadWrite, AccessMode::ReadOnly] {
			if let Some(coordinator) = self.slot(mode).get() {
				coordinator.close().await;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{test_settings, ScriptedReplica};
	use tempfile::TempDir;

	#[tokio::test]
	async fn same_instance_per_mode() {
		let dir = TempDir::new().unwrap();
		let registry = SyncRegistry::new(test_settings(dir.path()));

		assert!(registry.get_if_initialized(AccessMode::ReadWrite).is_none());
		let first = registry.get(AccessMode::ReadWrite).await.unwrap();
		let second = registry.get(AccessMode::ReadWrite).await.unwrap();
		let reader = registry.get(AccessMode::ReadOnly).await.unwrap();

		assert!(Arc::ptr_eq(&first, &second));
		assert!(!Arc::ptr_eq(&first, &reader));
		assert!(registry.get_if_initialized(AccessMode::ReadWrite).is_some());
		registry.close().await;
	}

	#[tokio::test]
	async fn concurrent_first_lookups_share_one_instance() {
		let dir = TempDir::new().unwrap();
		let registry = SyncRegistry::new(test_settings(dir.path()));

		let (a, b) = tokio::join!(
			registry.get(AccessMode::ReadWrite),
			registry.get(AccessMode::ReadWrite)
		);
		assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
		registry.close().await;
	}

	#[tokio::test]
	async fn modes_share_the_file() {
		let dir = TempDir::new().unwrap();
		let replica: Arc<dyn RemoteReplica> = Arc::new(ScriptedReplica::new().await);
		let registry = SyncRegistry::with_replica(test_settings(dir.path()), replica);

		let writer = registry.get(AccessMode::ReadWrite).await.unwrap();
		let reader = registry.get(AccessMode::ReadOnly).await.unwrap();
		assert!(writer.has_remote());
		assert!(!reader.has_remote());

		writer
			.exec("CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (1);")
			.await
			.unwrap();
		assert_eq!(reader.all("SELECT * FROM t", &[]).await.unwrap().len(), 1);
		assert!(reader.run("INSERT INTO t VALUES (2)", &[]).await.is_err());

		registry.close().await;
		assert!(writer.is_closed());
		assert!(reader.is_closed());
	}

	#[tokio::test]
	async fn close_before_any_lookup_is_fine() {
		let dir = TempDir::new().unwrap();
		let registry = SyncRegistry::new(test_settings(dir.path()));
		registry.close().await;
		assert!(registry.get_if_initialized(AccessMode::ReadOnly).is_none());
	}
}
