// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration management for the Strata sync engine.
//!
//! This crate provides:
//! - XDG Base Directory compliant path resolution
//! - Layered configuration: defaults, system file, user file, an explicit
//!   `--config` file, environment, CLI
//! - `VAR` / `VAR_FILE` secret loading into a redacting [`Secret`]
//! - Validation of the merged result

pub mod env;
pub mod error;
pub mod layer;
pub mod paths;
pub mod registry;
pub mod runtime;
pub mod secret;
pub mod sources;
pub mod validation;

pub use env::{load_secret_env, SecretEnvError};
pub use error::ConfigError;
pub use layer::ConfigLayer;
pub use paths::PathsConfig;
pub use registry::ConfigRegistry;
pub use runtime::{
	DatabaseConfig, LogFormat, LogLevel, LoggingConfig, PullConfig, PushConfig, RemoteConfig,
	RetryConfig, StrataConfig,
};
pub use secret::{Secret, SecretString, REDACTED};
pub use sources::{CliOverrides, ConfigSource, Precedence};

/// Load configuration from all sources with default precedence.
pub fn load_config() -> Result<StrataConfig, ConfigError> {
	load_config_with_cli(CliOverrides::default())
}

/// Load configuration with CLI overrides.
pub fn load_config_with_cli(cli: CliOverrides) -> Result<StrataConfig, ConfigError> {
	let paths = paths::resolve_xdg_paths()?;

	let mut registry = ConfigRegistry::new();
	registry.register(Box::new(sources::DefaultsSource));
	registry.register(Box::new(sources::FileSource::system(&paths)));
	registry.register(Box::new(sources::FileSource::user(&paths)));
	if let Some(ref path) = cli.config_file {
		registry.register(Box::new(sources::FileSource::explicit(path.clone())));
	}
	registry.register(Box::new(sources::EnvSource::new()));
	registry.register(Box::new(sources::CliSource::new(cli)));

	registry.load(paths)
}
