// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! XDG Base Directory compliant path resolution.

use std::path::PathBuf;

use crate::ConfigError;

/// Resolved XDG paths for Strata.
#[derive(Debug, Clone)]
pub struct PathsConfig {
	/// `~/.config/strata/config.toml`
	pub user_config_file: PathBuf,
	/// `/etc/strata/config.toml`
	pub system_config_file: PathBuf,
	/// `~/.local/share/strata/`, home of the default database file
	pub data_dir: PathBuf,
	/// `~/.local/state/strata/`, home of the pending push file
	pub state_dir: PathBuf,
}

impl PathsConfig {
	/// Paths rooted at `base`, used by tests and embedders that want to keep
	/// everything under one directory.
	pub fn rooted_at(base: impl Into<PathBuf>) -> Self {
		let base = base.into();
		Self {
			user_config_file: base.join("config/config.toml"),
			system_config_file: PathBuf::from(SYSTEM_CONFIG_FILE),
			data_dir: base.join("data"),
			state_dir: base.join("state"),
		}
	}

	pub fn default_database_path(&self) -> PathBuf {
		self.data_dir.join("strata.db")
	}

	pub fn default_pending_file(&self) -> PathBuf {
		self.state_dir.join("pending-push.json")
	}
}

const SYSTEM_CONFIG_FILE: &str = "/etc/strata/config.toml";

/// Resolve XDG paths, honouring `XDG_CONFIG_HOME`, `XDG_DATA_HOME` and
/// `XDG_STATE_HOME` before falling back to the usual dot directories.
pub fn resolve_xdg_paths() -> Result<PathsConfig, ConfigError> {
	let home = dirs::home_dir().ok_or(ConfigError::HomeDirNotFound)?;

	let config_home = std::env::var_os("XDG_CONFIG_HOME")
		.map(PathBuf::from)
		.unwrap_or_else(|| home.join(".config"));

	let data_home = std::env::var_os("XDG_DATA_HOME")
		.map(PathBuf::from)
		.unwrap_or_else(|| home.join(".local/share"));

	let state_home = std::env::var_os("XDG_STATE_HOME")
		.map(PathBuf::from)
		.unwrap_or_else(|| home.join(".local/state"));

	tracing::debug!(
			config_home = %config_home.display(),
			data_home = %data_home.display(),
			state_home = %state_home.display(),
			"resolved XDG paths"
	);

	Ok(PathsConfig {
		user_config_file: config_home.join("strata/config.toml"),
		system_config_file: PathBuf::from(SYSTEM_CONFIG_FILE),
		data_dir: data_home.join("strata"),
		state_dir: state_home.join("strata"),
	})
}
