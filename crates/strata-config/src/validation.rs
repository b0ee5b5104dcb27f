// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration validation rules.

use tracing::warn;
use url::Url;

use crate::runtime::StrataConfig;
use crate::ConfigError;

const REMOTE_SCHEMES: &[&str] = &["libsql", "https", "http", "wss", "ws"];

/// Validate the configuration.
pub fn validate_config(config: &StrataConfig) -> Result<(), ConfigError> {
	validate_database(config)?;
	validate_remote(config)?;
	validate_pull(config)?;
	validate_push(config)?;
	validate_retry(config)?;

	Ok(())
}

fn validate_database(config: &StrataConfig) -> Result<(), ConfigError> {
	if config.database.path.as_os_str().is_empty() {
		return Err(ConfigError::invalid_value(
			"database.path",
			"cannot be empty",
		));
	}
	if config.database.busy_timeout.is_zero() {
		return Err(ConfigError::invalid_value(
			"database.busy_timeout_ms",
			"must be greater than 0",
		));
	}
	Ok(())
}

fn validate_remote(config: &StrataConfig) -> Result<(), ConfigError> {
	let Some(remote) = &config.remote else {
		return Ok(());
	};

	let url = Url::parse(&remote.url).map_err(|source| ConfigError::RemoteUrl {
		url: remote.url.clone(),
		source,
	})?;
	if !REMOTE_SCHEMES.contains(&url.scheme()) {
		return Err(ConfigError::invalid_value(
			"remote.url",
			format!(
				"unsupported scheme '{}', expected one of {}",
				url.scheme(),
				REMOTE_SCHEMES.join(", ")
			),
		));
	}
	if url.host_str().is_none() {
		return Err(ConfigError::invalid_value("remote.url", "missing host"));
	}
	if remote.auth_token.expose().trim().is_empty() {
		return Err(ConfigError::invalid_value(
			"remote.auth_token",
			"cannot be empty",
		));
	}
	if remote.request_timeout.is_zero() {
		return Err(ConfigError::invalid_value(
			"remote.request_timeout_ms",
			"must be greater than 0",
		));
	}
	Ok(())
}

fn validate_pull(config: &StrataConfig) -> Result<(), ConfigError> {
	let pull = &config.pull;

	if pull.interval.is_zero() {
		return Err(ConfigError::invalid_value(
			"pull.interval_secs",
			"must be greater than 0",
		));
	}
	if pull.freshness_timeout.is_zero() {
		return Err(ConfigError::invalid_value(
			"pull.freshness_timeout_ms",
			"must be greater than 0",
		));
	}
	if pull.page_size == 0 {
		return Err(ConfigError::invalid_value(
			"pull.page_size",
			"must be at least 1",
		));
	}
	if pull.system_table_prefixes.is_empty() {
		warn!("pull.system_table_prefixes is empty; SQLite internal tables will be synced");
	}
	Ok(())
}

fn validate_push(config: &StrataConfig) -> Result<(), ConfigError> {
	if config.push.max_pending_attempts == 0 {
		return Err(ConfigError::invalid_value(
			"push.max_pending_attempts",
			"must be at least 1",
		));
	}
	Ok(())
}

fn validate_retry(config: &StrataConfig) -> Result<(), ConfigError> {
	let retry = &config.retry;

	if retry.max_attempts == 0 {
		return Err(ConfigError::invalid_value(
			"retry.max_attempts",
			"must be at least 1",
		));
	}
	if retry.max_attempts > 20 {
		return Err(ConfigError::invalid_value(
			"retry.max_attempts",
			"must be at most 20",
		));
	}
	if !(1.0..=10.0).contains(&retry.backoff_factor) {
		return Err(ConfigError::invalid_value(
			"retry.backoff_factor",
			"must be between 1.0 and 10.0",
		));
	}
	if retry.base_delay > retry.max_delay {
		return Err(ConfigError::invalid_value(
			"retry.base_delay_ms",
			"cannot be greater than max_delay_ms",
		));
	}
	Ok(())
}
