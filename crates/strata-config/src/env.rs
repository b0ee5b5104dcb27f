// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Loading secrets with the `VAR` / `VAR_FILE` convention.
//!
//! `VAR_FILE` wins over `VAR`, so a token mounted as a file (Docker or
//! Kubernetes secrets) overrides one exported into the shell.

use std::path::PathBuf;
use std::{env, fs};

use thiserror::Error;

use crate::secret::SecretString;

#[derive(Debug, Error)]
pub enum SecretEnvError {
	#[error("failed to read secret file at {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("secret file path in {var} is empty")]
	EmptyPath { var: String },
}

/// Load a secret from the process environment.
///
/// Returns `Ok(None)` when neither `{var}_FILE` nor `{var}` is set. A single
/// trailing newline is stripped from file contents.
pub fn load_secret_env(var: &str) -> Result<Option<SecretString>, SecretEnvError> {
	load_secret_with(var, |key| env::var(key).ok())
}

/// Same as [`load_secret_env`] but resolves variables through `lookup`.
pub fn load_secret_with<F>(var: &str, lookup: F) -> Result<Option<SecretString>, SecretEnvError>
where
	F: Fn(&str) -> Option<String>,
{
	let file_var = format!("{var}_FILE");

	if let Some(path_str) = lookup(&file_var) {
		if path_str.trim().is_empty() {
			return Err(SecretEnvError::EmptyPath { var: file_var });
		}

		let path = PathBuf::from(&path_str);
		let content = fs::read_to_string(&path).map_err(|source| SecretEnvError::Io {
			path: path.clone(),
			source,
		})?;

		let secret = content.strip_suffix('\n').unwrap_or(&content).to_string();
		return Ok(Some(SecretString::new(secret)));
	}

	Ok(lookup(var)
		.filter(|value| !value.is_empty())
		.map(SecretString::new))
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;
	use std::io::Write;
	use tempfile::NamedTempFile;

	fn lookup_in(vars: HashMap<String, String>) -> impl Fn(&str) -> Option<String> {
		move |key| vars.get(key).cloned()
	}

	#[test]
	fn returns_none_when_unset() {
		let result = load_secret_with("STRATA_TEST_TOKEN", lookup_in(HashMap::new())).unwrap();
		assert!(result.is_none());
	}

	#[test]
	fn reads_direct_value() {
		let vars = HashMap::from([("STRATA_TEST_TOKEN".to_string(), "tok".to_string())]);
		let secret = load_secret_with("STRATA_TEST_TOKEN", lookup_in(vars))
			.unwrap()
			.unwrap();
		assert_eq!(secret.expose(), "tok");
	}

	#[test]
	fn empty_direct_value_is_unset() {
		let vars = HashMap::from([("STRATA_TEST_TOKEN".to_string(), String::new())]);
		assert!(load_secret_with("STRATA_TEST_TOKEN", lookup_in(vars))
			.unwrap()
			.is_none());
	}

	#[test]
	fn file_takes_precedence_and_strips_one_newline() {
		let mut file = NamedTempFile::new().unwrap();
		writeln!(file, "from-file").unwrap();

		let vars = HashMap::from([
			("STRATA_TEST_TOKEN".to_string(), "direct".to_string()),
			(
				"STRATA_TEST_TOKEN_FILE".to_string(),
				file.path().display().to_string(),
			),
		]);
		let secret = load_secret_with("STRATA_TEST_TOKEN", lookup_in(vars))
			.unwrap()
			.unwrap();
		assert_eq!(secret.expose(), "from-file");
	}

	#[test]
	fn empty_file_path_is_an_error() {
		let vars = HashMap::from([("STRATA_TEST_TOKEN_FILE".to_string(), " ".to_string())]);
		let err = load_secret_with("STRATA_TEST_TOKEN", lookup_in(vars)).unwrap_err();
		assert!(matches!(err, SecretEnvError::EmptyPath { .. }));
	}

	#[test]
	fn missing_file_is_an_error() {
		let vars = HashMap::from([(
			"STRATA_TEST_TOKEN_FILE".to_string(),
			"/nonexistent/strata/token".to_string(),
		)]);
		let err = load_secret_with("STRATA_TEST_TOKEN", lookup_in(vars)).unwrap_err();
		assert!(matches!(err, SecretEnvError::Io { .. }));
	}
}
