// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Local-first SQLite storage with opportunistic replication.
//!
//! Every read and write goes to an embedded SQLite file. When a remote libSQL
//! replica is configured, a [`SyncCoordinator`] also pulls newer remote rows
//! on a timer and pushes local mutations after a quiet period. Remote
//! failures never reach callers; they show up in logs, [`SyncStatsSnapshot`]
//! and the [`SyncEvent`] stream.
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use strata_sync::{AccessMode, SyncRegistry, SyncSettings, Value};
//!
//! let registry = SyncRegistry::new(SyncSettings::local_only("app.db"));
//! let db = registry.get(AccessMode::ReadWrite).await?;
//! db.exec("CREATE TABLE IF NOT EXISTS notes (id INTEGER PRIMARY KEY, body TEXT)").await?;
//! db.run("INSERT INTO notes (body) VALUES (?)", &[Value::from("hello")]).await?;
//!
//! strata_sync::force_push(&registry).await;
//! registry.close().await;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod clock;
pub mod coordinator;
pub mod error;
pub mod local;
pub mod pending;
pub mod pull;
pub mod push;
pub mod registry;
pub mod remote;
pub mod settings;
pub mod shutdown;
pub mod statement;
pub mod telemetry;
pub mod value;

#[cfg(test)]
mod testing;

pub use coordinator::{PreparedStatement, SyncCoordinator, SyncStatus};
pub use error::{LocalStoreError, PendingStoreError, RemoteError, SyncError};
pub use local::{AccessMode, LocalStore};
pub use pending::{PendingPushEntry, PendingPushStore};
pub use pull::{PullOutcome, PullReport, TableFailure};
pub use push::{PushEntry, PushReport};
pub use registry::SyncRegistry;
pub use remote::{HranaClient, RemoteReplica, ResultSet};
pub use settings::SyncSettings;
pub use shutdown::{force_pull, force_push};
pub use statement::StatementKind;
pub use telemetry::{SyncEvent, SyncStatsSnapshot};
pub use value::{Row, RunResult, Value};
