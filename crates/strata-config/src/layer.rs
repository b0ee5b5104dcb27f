// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Partial configuration layer for merging from multiple sources.

use std::path::PathBuf;

use serde::Deserialize;

use crate::secret::SecretString;

/// Partial configuration layer - all fields are Option for merging.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
	#[serde(default)]
	pub database: Option<DatabaseLayer>,
	#[serde(default)]
	pub remote: Option<RemoteLayer>,
	#[serde(default)]
	pub pull: Option<PullLayer>,
	#[serde(default)]
	pub push: Option<PushLayer>,
	#[serde(default)]
	pub logging: Option<LoggingLayer>,
	#[serde(default)]
	pub retry: Option<RetryLayer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseLayer {
	#[serde(default)]
	pub path: Option<PathBuf>,
	#[serde(default)]
	pub busy_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteLayer {
	#[serde(default)]
	pub url: Option<String>,
	#[serde(default)]
	pub auth_token: Option<SecretString>,
	#[serde(default)]
	pub request_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PullLayer {
	#[serde(default)]
	pub interval_secs: Option<u64>,
	#[serde(default)]
	pub freshness_timeout_ms: Option<u64>,
	#[serde(default)]
	pub page_size: Option<u32>,
	#[serde(default)]
	pub page_delay_ms: Option<u64>,
	#[serde(default)]
	pub large_tables: Option<Vec<String>>,
	#[serde(default)]
	pub system_table_prefixes: Option<Vec<String>>,
	#[serde(default)]
	pub pull_on_unknown_remote: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushLayer {
	#[serde(default)]
	pub debounce_ms: Option<u64>,
	#[serde(default)]
	pub pending_file: Option<PathBuf>,
	#[serde(default)]
	pub max_pending_attempts: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingLayer {
	#[serde(default)]
	pub level: Option<String>,
	#[serde(default)]
	pub format: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetryLayer {
	#[serde(default)]
	pub max_attempts: Option<u32>,
	#[serde(default)]
	pub base_delay_ms: Option<u64>,
	#[serde(default)]
	pub max_delay_ms: Option<u64>,
	#[serde(default)]
	pub backoff_factor: Option<f64>,
	#[serde(default)]
	pub jitter: Option<bool>,
}

impl ConfigLayer {
	/// Merge another layer into this one. Other layer takes precedence.
	pub fn merge(&mut self, other: ConfigLayer) {
		merge_option(&mut self.database, other.database, DatabaseLayer::merge);
		merge_option(&mut self.remote, other.remote, RemoteLayer::merge);
		merge_option(&mut self.pull, other.pull, PullLayer::merge);
		merge_option(&mut self.push, other.push, PushLayer::merge);
		merge_option(&mut self.logging, other.logging, LoggingLayer::merge);
		merge_option(&mut self.retry, other.retry, RetryLayer::merge);
	}

	pub fn database_mut(&mut self) -> &mut DatabaseLayer {
		self.database.get_or_insert_with(DatabaseLayer::default)
	}

	pub fn remote_mut(&mut self) -> &mut RemoteLayer {
		self.remote.get_or_insert_with(RemoteLayer::default)
	}

	pub fn pull_mut(&mut self) -> &mut PullLayer {
		self.pull.get_or_insert_with(PullLayer::default)
	}

	pub fn push_mut(&mut self) -> &mut PushLayer {
		self.push.get_or_insert_with(PushLayer::default)
	}

	pub fn logging_mut(&mut self) -> &mut LoggingLayer {
		self.logging.get_or_insert_with(LoggingLayer::default)
	}

	pub fn retry_mut(&mut self) -> &mut RetryLayer {
		self.retry.get_or_insert_with(RetryLayer::default)
	}
}

fn merge_option<T, F>(target: &mut Option<T>, source: Option<T>, merge_fn: F)
where
	F: FnOnce(&mut T, T),
{
	match (target.as_mut(), source) {
		(Some(t), Some(s)) => merge_fn(t, s),
		(None, Some(s)) => *target = Some(s),
		_ => {}
	}
}

fn take<T>(target: &mut Option<T>, source: Option<T>) {
	if source.is_some() {
		*target = source;
	}
}

impl DatabaseLayer {
	fn merge(&mut self, other: DatabaseLayer) {
		take(&mut self.path, other.path);
		take(&mut self.busy_timeout_ms, other.busy_timeout_ms);
	}
}

impl RemoteLayer {
	fn merge(&mut self, other: RemoteLayer) {
		take(&mut self.url, other.url);
		take(&mut self.auth_token, other.auth_token);
		take(&mut self.request_timeout_ms, other.request_timeout_ms);
	}
}

impl PullLayer {
	fn merge(&mut self, other: PullLayer) {
		take(&mut self.interval_secs, other.interval_secs);
		take(&mut self.freshness_timeout_ms, other.freshness_timeout_ms);
		take(&mut self.page_size, other.page_size);
		take(&mut self.page_delay_ms, other.page_delay_ms);
		take(&mut self.large_tables, other.large_tables);
		take(&mut self.system_table_prefixes, other.system_table_prefixes);
		take(
			&mut self.pull_on_unknown_remote,
			other.pull_on_unknown_remote,
		);
	}
}

impl PushLayer {
	fn merge(&mut self, other: PushLayer) {
		take(&mut self.debounce_ms, other.debounce_ms);
		take(&mut self.pending_file, other.pending_file);
		take(&mut self.max_pending_attempts, other.max_pending_attempts);
	}
}

impl LoggingLayer {
	fn merge(&mut self, other: LoggingLayer) {
		take(&mut self.level, other.level);
		take(&mut self.format, other.format);
	}
}

impl RetryLayer {
	fn merge(&mut self, other: RetryLayer) {
		take(&mut self.max_attempts, other.max_attempts);
		take(&mut self.base_delay_ms, other.base_delay_ms);
		take(&mut self.max_delay_ms, other.max_delay_ms);
		take(&mut self.backoff_factor, other.backoff_factor);
		take(&mut self.jitter, other.jitter);
	}
}
