// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Explicit sync points for processes that write and exit promptly.

use tracing::info;

use crate::error::SyncError;
use crate::local::AccessMode;
use crate::pull::PullOutcome;
use crate::push::PushReport;
use crate::registry::SyncRegistry;

/// Push everything the read-write instance has queued, replaying the
/// dead-letter file first. Does nothing if that instance was never opened
/// or has no remote.
pub async fn force_push(registry: &SyncRegistry) -> Option<PushReport> {
	let coordinator = registry.get_if_initialized(AccessMode::ReadWrite)?;
	let report = coordinator.flush_push(true).await?;
	info!(
		attempted = report.attempted,
		succeeded = report.succeeded,
		failed = report.failed,
		replayed = report.replayed,
		"forced push"
	);
	Some(report)
}

/// Run one freshness check on the read-write instance, opening it if needed.
pub async fn force_pull(registry: &SyncRegistry) -> Result<PullOutcome, SyncError> {
	let coordinator = registry.get(AccessMode::ReadWrite).await?;
	Ok(coordinator.check_and_pull().await)
}
