// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Errors raised while assembling a [`StrataConfig`](crate::StrataConfig).

use std::path::PathBuf;

use crate::env::SecretEnvError;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to read config file: {0}")]
	Io(#[from] std::io::Error),

	#[error("TOML parse error in {path}: {source}")]
	TomlParse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	/// `--config` or `STRATA_CONFIG` named a file that is not there.
	#[error("config file not found: {0}")]
	FileNotFound(PathBuf),

	#[error("remote auth token: {0}")]
	Secret(#[from] SecretEnvError),

	#[error("remote.url '{url}' is not a valid URL: {source}")]
	RemoteUrl {
		url: String,
		#[source]
		source: url::ParseError,
	},

	#[error("invalid value for {field}: {message}")]
	InvalidValue { field: String, message: String },

	#[error("could not determine home directory")]
	HomeDirNotFound,
}

impl ConfigError {
	pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
		Self::InvalidValue {
			field: field.into(),
			message: message.into(),
		}
	}

	/// Dotted config key the error refers to, when it is about a single field.
	pub fn field(&self) -> Option<&str> {
		match self {
			Self::InvalidValue { field, .. } => Some(field),
			Self::RemoteUrl { .. } => Some("remote.url"),
			Self::Secret(_) => Some("remote.auth_token"),
			_ => None,
		}
	}
}
