// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Runtime configuration types with resolved defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::layer::*;
use crate::paths::PathsConfig;
use crate::secret::SecretString;

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_PULL_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_FRESHNESS_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_PAGE_SIZE: u32 = 500;
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_PUSH_DEBOUNCE: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_PENDING_ATTEMPTS: u32 = 10;
pub const DEFAULT_LARGE_TABLES: &[&str] = &["events", "messages", "transactions"];
pub const DEFAULT_SYSTEM_TABLE_PREFIXES: &[&str] = &["sqlite_", "libsql_", "_litestream", "_cf_"];

/// The final, validated configuration for Strata.
#[derive(Debug, Clone, Serialize)]
pub struct StrataConfig {
	pub database: DatabaseConfig,
	/// Present only when both a URL and an auth token were configured.
	pub remote: Option<RemoteConfig>,
	pub pull: PullConfig,
	pub push: PushConfig,
	pub logging: LoggingConfig,
	pub retry: RetryConfig,

	#[serde(skip)]
	pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseConfig {
	pub path: PathBuf,
	#[serde(with = "duration_ms")]
	pub busy_timeout: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoteConfig {
	pub url: String,
	pub auth_token: SecretString,
	#[serde(with = "duration_ms")]
	pub request_timeout: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct PullConfig {
	#[serde(with = "duration_ms")]
	pub interval: Duration,
	#[serde(with = "duration_ms")]
	pub freshness_timeout: Duration,
	pub page_size: u32,
	#[serde(with = "duration_ms")]
	pub page_delay: Duration,
	pub large_tables: Vec<String>,
	pub system_table_prefixes: Vec<String>,
	pub pull_on_unknown_remote: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PushConfig {
	#[serde(with = "duration_ms")]
	pub debounce: Duration,
	pub pending_file: PathBuf,
	pub max_pending_attempts: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoggingConfig {
	pub level: LogLevel,
	pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
	Error,
	Warn,
	#[default]
	Info,
	Debug,
	Trace,
}

impl LogLevel {
	pub fn as_str(&self) -> &'static str {
		match self {
			LogLevel::Error => "error",
			LogLevel::Warn => "warn",
			LogLevel::Info => "info",
			LogLevel::Debug => "debug",
			LogLevel::Trace => "trace",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
	#[default]
	Pretty,
	Json,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetryConfig {
	pub max_attempts: u32,
	#[serde(with = "duration_ms")]
	pub base_delay: Duration,
	#[serde(with = "duration_ms")]
	pub max_delay: Duration,
	pub backoff_factor: f64,
	pub jitter: bool,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay: Duration::from_millis(200),
			max_delay: Duration::from_secs(5),
			backoff_factor: 2.0,
			jitter: true,
		}
	}
}

mod duration_ms {
	use serde::Serializer;
	use std::time::Duration;

	pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_u64(duration.as_millis() as u64)
	}
}

impl StrataConfig {
	/// Build runtime config from a merged layer and paths.
	pub fn from_layer(layer: ConfigLayer, paths: PathsConfig) -> Self {
		Self {
			database: build_database_config(layer.database, &paths),
			remote: build_remote_config(layer.remote),
			pull: build_pull_config(layer.pull),
			push: build_push_config(layer.push, &paths),
			logging: build_logging_config(layer.logging),
			retry: build_retry_config(layer.retry),
			paths,
		}
	}

	/// Defaults only, rooted at `paths`.
	pub fn defaults(paths: PathsConfig) -> Self {
		Self::from_layer(ConfigLayer::default(), paths)
	}
}

fn build_database_config(layer: Option<DatabaseLayer>, paths: &PathsConfig) -> DatabaseConfig {
	let layer = layer.unwrap_or_default();
	DatabaseConfig {
		path: layer
			.path
			.unwrap_or_else(|| paths.default_database_path()),
		busy_timeout: layer
			.busy_timeout_ms
			.map(Duration::from_millis)
			.unwrap_or(DEFAULT_BUSY_TIMEOUT),
	}
}

fn build_remote_config(layer: Option<RemoteLayer>) -> Option<RemoteConfig> {
	let layer = layer?;
	match (layer.url, layer.auth_token) {
		(Some(url), Some(auth_token)) => Some(RemoteConfig {
			url,
			auth_token,
			request_timeout: layer
				.request_timeout_ms
				.map(Duration::from_millis)
				.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
		}),
		(Some(_), None) => {
			tracing::info!("remote url configured without an auth token, running local-only");
			None
		}
		(None, Some(_)) => {
			tracing::info!("remote auth token configured without a url, running local-only");
			None
		}
		(None, None) => None,
	}
}

fn to_strings(defaults: &[&str]) -> Vec<String> {
	defaults.iter().map(|s| s.to_string()).collect()
}

fn build_pull_config(layer: Option<PullLayer>) -> PullConfig {
	let layer = layer.unwrap_or_default();
	PullConfig {
		interval: layer
			.interval_secs
			.map(Duration::from_secs)
			.unwrap_or(DEFAULT_PULL_INTERVAL),
		freshness_timeout: layer
			.freshness_timeout_ms
			.map(Duration::from_millis)
			.unwrap_or(DEFAULT_FRESHNESS_TIMEOUT),
		page_size: layer.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
		page_delay: layer
			.page_delay_ms
			.map(Duration::from_millis)
			.unwrap_or(DEFAULT_PAGE_DELAY),
		large_tables: layer
			.large_tables
			.unwrap_or_else(|| to_strings(DEFAULT_LARGE_TABLES)),
		system_table_prefixes: layer
			.system_table_prefixes
			.unwrap_or_else(|| to_strings(DEFAULT_SYSTEM_TABLE_PREFIXES)),
		pull_on_unknown_remote: layer.pull_on_unknown_remote.unwrap_or(false),
	}
}

fn build_push_config(layer: Option<PushLayer>, paths: &PathsConfig) -> PushConfig {
	let layer = layer.unwrap_or_default();
	PushConfig {
		debounce: layer
			.debounce_ms
			.map(Duration::from_millis)
			.unwrap_or(DEFAULT_PUSH_DEBOUNCE),
		pending_file: layer
			.pending_file
			.unwrap_or_else(|| paths.default_pending_file()),
		max_pending_attempts: layer
			.max_pending_attempts
			.unwrap_or(DEFAULT_MAX_PENDING_ATTEMPTS),
	}
}

fn build_logging_config(layer: Option<LoggingLayer>) -> LoggingConfig {
	let layer = layer.unwrap_or_default();
	LoggingConfig {
		level: parse_log_level(layer.level.as_deref()),
		format: parse_log_format(layer.format.as_deref()),
	}
}

fn parse_log_level(s: Option<&str>) -> LogLevel {
	match s.map(str::to_ascii_lowercase).as_deref() {
		Some("error") => LogLevel::Error,
		Some("warn") => LogLevel::Warn,
		Some("debug") => LogLevel::Debug,
		Some("trace") => LogLevel::Trace,
		_ => LogLevel::Info,
	}
}

fn parse_log_format(s: Option<&str>) -> LogFormat {
	match s {
		Some("json") => LogFormat::Json,
		_ => LogFormat::Pretty,
	}
}

fn build_retry_config(layer: Option<RetryLayer>) -> RetryConfig {
	let layer = layer.unwrap_or_default();
	let defaults = RetryConfig::default();
	RetryConfig {
		max_attempts: layer.max_attempts.unwrap_or(defaults.max_attempts),
		base_delay: layer
			.base_delay_ms
			.map(Duration::from_millis)
			.unwrap_or(defaults.base_delay),
		max_delay: layer
			.max_delay_ms
			.map(Duration::from_millis)
			.unwrap_or(defaults.max_delay),
		backoff_factor: layer.backoff_factor.unwrap_or(defaults.backoff_factor),
		jitter: layer.jitter.unwrap_or(defaults.jitter),
	}
}
