// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::path::{Path, PathBuf};
use std::time::Duration;

use strata_config::runtime::{
	DEFAULT_BUSY_TIMEOUT, DEFAULT_FRESHNESS_TIMEOUT, DEFAULT_LARGE_TABLES,
	DEFAULT_MAX_PENDING_ATTEMPTS, DEFAULT_PAGE_DELAY, DEFAULT_PAGE_SIZE, DEFAULT_PULL_INTERVAL,
	DEFAULT_PUSH_DEBOUNCE, DEFAULT_SYSTEM_TABLE_PREFIXES,
};
use strata_config::{RemoteConfig, RetryConfig, StrataConfig};

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Everything a coordinator needs, flattened out of [`StrataConfig`].
#[derive(Debug, Clone)]
pub struct SyncSettings {
	pub database_path: PathBuf,
	pub busy_timeout: Duration,
	pub remote: Option<RemoteConfig>,
	pub retry: RetryConfig,
	pub pull_interval: Duration,
	pub freshness_timeout: Duration,
	pub page_size: u32,
	pub page_delay: Duration,
	pub large_tables: Vec<String>,
	pub system_table_prefixes: Vec<String>,
	pub pull_on_unknown_remote: bool,
	pub push_debounce: Duration,
	/// Dead-letter file; `None` drops failed pushes after logging them.
	pub pending_file: Option<PathBuf>,
	pub max_pending_attempts: u32,
	pub event_capacity: usize,
}

impl SyncSettings {
	pub fn from_config(config: &StrataConfig) -> Self {
		Self {
			database_path: config.database.path.clone(),
			busy_timeout: config.database.busy_timeout,
			remote: config.remote.clone(),
			retry: config.retry.clone(),
			pull_interval: config.pull.interval,
			freshness_timeout: config.pull.freshness_timeout,
			page_size: config.pull.page_size,
			page_delay: config.pull.page_delay,
			large_tables: config.pull.large_tables.clone(),
			system_table_prefixes: config.pull.system_table_prefixes.clone(),
			pull_on_unknown_remote: config.pull.pull_on_unknown_remote,
			push_debounce: config.push.debounce,
			pending_file: Some(config.push.pending_file.clone()),
			max_pending_attempts: config.push.max_pending_attempts,
			event_capacity: DEFAULT_EVENT_CAPACITY,
		}
	}

	/// Defaults for a store at `path` with no remote and no dead-letter file.
	pub fn local_only(path: impl AsRef<Path>) -> Self {
		Self {
			database_path: path.as_ref().to_path_buf(),
			busy_timeout: DEFAULT_BUSY_TIMEOUT,
			remote: None,
			retry: RetryConfig::default(),
			pull_interval: DEFAULT_PULL_INTERVAL,
			freshness_timeout: DEFAULT_FRESHNESS_TIMEOUT,
			page_size: DEFAULT_PAGE_SIZE,
			page_delay: DEFAULT_PAGE_DELAY,
			large_tables: DEFAULT_LARGE_TABLES.iter().map(|s| s.to_string()).collect(),
			system_table_prefixes: DEFAULT_SYSTEM_TABLE_PREFIXES
				.iter()
				.map(|s| s.to_string())
				.collect(),
			pull_on_unknown_remote: false,
			push_debounce: DEFAULT_PUSH_DEBOUNCE,
			pending_file: None,
			max_pending_attempts: DEFAULT_MAX_PENDING_ATTEMPTS,
			event_capacity: DEFAULT_EVENT_CAPACITY,
		}
	}

	pub fn is_large_table(&self, table: &str) -> bool {
		self.large_tables.iter().any(|t| t.eq_ignore_ascii_case(table))
	}
}
