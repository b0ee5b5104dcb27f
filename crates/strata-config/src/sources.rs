// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: files, environment, CLI, defaults.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, trace, warn};

use crate::env::load_secret_with;
use crate::layer::ConfigLayer;
use crate::paths::PathsConfig;
use crate::ConfigError;

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	SystemFile = 20,
	UserFile = 30,
	ExplicitFile = 40,
	Environment = 50,
	Cli = 60,
}

pub trait ConfigSource: Send + Sync {
	/// Name for logging
	fn name(&self) -> &'static str;

	fn precedence(&self) -> Precedence;

	fn load(&self) -> Result<ConfigLayer, ConfigError>;
}

/// Built-in defaults source. Defaults are applied when the merged layer is
/// resolved, so this contributes an empty layer.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}
	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		Ok(ConfigLayer::default())
	}
}

/// File-based configuration source (TOML).
pub struct FileSource {
	path: PathBuf,
	precedence: Precedence,
	name: &'static str,
	required: bool,
}

impl FileSource {
	/// `/etc/strata/config.toml`
	pub fn system(paths: &PathsConfig) -> Self {
		Self {
			path: paths.system_config_file.clone(),
			precedence: Precedence::SystemFile,
			name: "system-config",
			required: false,
		}
	}

	/// `$XDG_CONFIG_HOME/strata/config.toml`
	pub fn user(paths: &PathsConfig) -> Self {
		Self {
			path: paths.user_config_file.clone(),
			precedence: Precedence::UserFile,
			name: "user-config",
			required: false,
		}
	}

	/// A file named on the command line; it must exist.
	pub fn explicit(path: PathBuf) -> Self {
		Self {
			path,
			precedence: Precedence::ExplicitFile,
			name: "explicit-config",
			required: true,
		}
	}
}

impl ConfigSource for FileSource {
	fn name(&self) -> &'static str {
		self.name
	}
	fn precedence(&self) -> Precedence {
		self.precedence
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		if !self.path.exists() {
			if self.required {
				return Err(ConfigError::FileNotFound(self.path.clone()));
			}
			debug!(path = %self.path.display(), source = self.name, "config file not found, skipping");
			return Ok(ConfigLayer::default());
		}

		debug!(path = %self.path.display(), source = self.name, "loading config file");

		let content = std::fs::read_to_string(&self.path)?;
		let layer: ConfigLayer = toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
			path: self.path.clone(),
			source: e,
		})?;

		trace!(source = self.name, "parsed config layer");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: `STRATA_<SECTION>_<FIELD>`. The remote URL and token also
/// accept the libSQL names `TURSO_DATABASE_URL` and `TURSO_AUTH_TOKEN`, and
/// tokens may be read from a file via `*_FILE`.
pub struct EnvSource {
	vars: HashMap<String, String>,
}

impl EnvSource {
	/// Snapshot of the current process environment.
	pub fn new() -> Self {
		Self::from_vars(std::env::vars())
	}

	pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
		Self {
			vars: vars.into_iter().collect(),
		}
	}

	fn lookup(&self, key: &str) -> Option<String> {
		self.vars
			.get(key)
			.map(|v| v.trim().to_string())
			.filter(|v| !v.is_empty())
	}
}

impl Default for EnvSource {
	fn default() -> Self {
		Self::new()
	}
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Option<T> {
	match value.parse() {
		Ok(v) => Some(v),
		Err(_) => {
			warn!(key = %key, value = %value, "ignoring unparseable environment value");
			None
		}
	}
}

fn parse_bool(key: &str, value: &str) -> Option<bool> {
	match value.to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Some(true),
		"0" | "false" | "no" | "off" => Some(false),
		_ => {
			warn!(key = %key, value = %value, "ignoring unparseable boolean environment value");
			None
		}
	}
}

fn parse_list(value: &str) -> Vec<String> {
	value
		.split(',')
		.map(str::trim)
		.filter(|s| !s.is_empty())
		.map(String::from)
		.collect()
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}
	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		debug!("loading environment variables");
		let mut layer = ConfigLayer::default();

		if let Some(url) = self
			.lookup("STRATA_REMOTE_URL")
			.or_else(|| self.lookup("TURSO_DATABASE_URL"))
		{
			layer.remote_mut().url = Some(url);
		}

		let lookup = |key: &str| self.lookup(key);
		let token = match load_secret_with("STRATA_REMOTE_AUTH_TOKEN", lookup)? {
			Some(token) => Some(token),
			None => load_secret_with("TURSO_AUTH_TOKEN", lookup)?,
		};
		if let Some(token) = token {
			trace!("loaded remote auth token from environment");
			layer.remote_mut().auth_token = Some(token);
		}

		for (key, raw) in &self.vars {
			if !key.starts_with("STRATA_") {
				continue;
			}
			let value = raw.trim();
			if value.is_empty() {
				continue;
			}

			trace!(key = %key, "processing env var");

			match key.as_str() {
				"STRATA_DATABASE_PATH" => {
					layer.database_mut().path = Some(PathBuf::from(value));
				}
				"STRATA_DATABASE_BUSY_TIMEOUT_MS" => {
					layer.database_mut().busy_timeout_ms = parse_env(key, value);
				}
				"STRATA_REMOTE_REQUEST_TIMEOUT_MS" => {
					layer.remote_mut().request_timeout_ms = parse_env(key, value);
				}
				"STRATA_PULL_INTERVAL_SECS" => {
					layer.pull_mut().interval_secs = parse_env(key, value);
				}
				"STRATA_PULL_FRESHNESS_TIMEOUT_MS" => {
					layer.pull_mut().freshness_timeout_ms = parse_env(key, value);
				}
				"STRATA_PULL_PAGE_SIZE" => {
					layer.pull_mut().page_size = parse_env(key, value);
				}
				"STRATA_PULL_PAGE_DELAY_MS" => {
					layer.pull_mut().page_delay_ms = parse_env(key, value);
				}
				"STRATA_PULL_LARGE_TABLES" => {
					layer.pull_mut().large_tables = Some(parse_list(value));
				}
				"STRATA_PULL_SYSTEM_TABLE_PREFIXES" => {
					layer.pull_mut().system_table_prefixes = Some(parse_list(value));
				}
				"STRATA_PULL_ON_UNKNOWN_REMOTE" => {
					layer.pull_mut().pull_on_unknown_remote = parse_bool(key, value);
				}
				"STRATA_PUSH_DEBOUNCE_MS" => {
					layer.push_mut().debounce_ms = parse_env(key, value);
				}
				"STRATA_PUSH_PENDING_FILE" => {
					layer.push_mut().pending_file = Some(PathBuf::from(value));
				}
				"STRATA_PUSH_MAX_PENDING_ATTEMPTS" => {
					layer.push_mut().max_pending_attempts = parse_env(key, value);
				}
				"STRATA_LOG_LEVEL" => {
					layer.logging_mut().level = Some(value.to_string());
				}
				"STRATA_LOG_FORMAT" => {
					layer.logging_mut().format = Some(value.to_string());
				}
				"STRATA_RETRY_MAX_ATTEMPTS" => {
					layer.retry_mut().max_attempts = parse_env(key, value);
				}
				"STRATA_RETRY_BASE_DELAY_MS" => {
					layer.retry_mut().base_delay_ms = parse_env(key, value);
				}
				"STRATA_RETRY_MAX_DELAY_MS" => {
					layer.retry_mut().max_delay_ms = parse_env(key, value);
				}
				"STRATA_RETRY_BACKOFF_FACTOR" => {
					layer.retry_mut().backoff_factor = parse_env(key, value);
				}
				"STRATA_RETRY_JITTER" => {
					layer.retry_mut().jitter = parse_bool(key, value);
				}
				_ => {}
			}
		}

		Ok(layer)
	}
}

/// CLI argument overrides.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
	pub config_file: Option<PathBuf>,
	pub database_path: Option<PathBuf>,
	pub log_level: Option<String>,
	pub log_format: Option<String>,
}

pub struct CliSource {
	overrides: CliOverrides,
}

impl CliSource {
	pub fn new(overrides: CliOverrides) -> Self {
		Self { overrides }
	}
}

impl ConfigSource for CliSource {
	fn name(&self) -> &'static str {
		"cli"
	}
	fn precedence(&self) -> Precedence {
		Precedence::Cli
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		debug!("loading CLI overrides");
		let mut layer = ConfigLayer::default();

		if let Some(ref path) = self.overrides.database_path {
			layer.database_mut().path = Some(path.clone());
		}
		if let Some(ref level) = self.overrides.log_level {
			layer.logging_mut().level = Some(level.clone());
		}
		if let Some(ref format) = self.overrides.log_format {
			layer.logging_mut().format = Some(format.clone());
		}

		Ok(layer)
	}
}
