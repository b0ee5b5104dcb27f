// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration registry - manages sources and merges layers.

use tracing::{debug, info};

use crate::layer::ConfigLayer;
use crate::paths::PathsConfig;
use crate::runtime::StrataConfig;
use crate::sources::ConfigSource;
use crate::validation::validate_config;
use crate::ConfigError;

pub struct ConfigRegistry {
	sources: Vec<Box<dyn ConfigSource>>,
}

impl ConfigRegistry {
	pub fn new() -> Self {
		Self {
			sources: Vec::new(),
		}
	}

	pub fn register(&mut self, source: Box<dyn ConfigSource>) {
		debug!(source = source.name(), precedence = ?source.precedence(), "registering config source");
		self.sources.push(source);
	}

	/// Load configuration from all sources, merge, and validate.
	///
	/// Sources are merged lowest precedence first. A source that fails to
	/// load aborts the whole load; optional files that do not exist load as
	/// empty layers instead of failing.
	pub fn load(&self, paths: PathsConfig) -> Result<StrataConfig, ConfigError> {
		let mut sorted_sources: Vec<_> = self.sources.iter().collect();
		sorted_sources.sort_by_key(|s| s.precedence());

		info!(
			source_count = sorted_sources.len(),
			"loading configuration from sources"
		);

		let mut merged = ConfigLayer::default();
		for source in &sorted_sources {
			let layer = source.load()?;
			debug!(source = source.name(), "merging config layer");
			merged.merge(layer);
		}

		let config = StrataConfig::from_layer(merged, paths);
		validate_config(&config)?;

		info!(
				database = %config.database.path.display(),
				remote = config.remote.is_some(),
				log_level = config.logging.level.as_str(),
				"configuration loaded"
		);

		Ok(config)
	}

	pub fn source_count(&self) -> usize {
		self.sources.len()
	}
}

impl Default for ConfigRegistry {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sources::{DefaultsSource, EnvSource, FileSource, Precedence};
	use std::io::Write;
	use tempfile::TempDir;

	struct FixedSource {
		name: &'static str,
		precedence: Precedence,
		page_size: u32,
	}

	impl ConfigSource for FixedSource {
		fn name(&self) -> &'static str {
			self.name
		}
		fn precedence(&self) -> Precedence {
			self.precedence
		}

		fn load(&self) -> Result<ConfigLayer, ConfigError> {
			let mut layer = ConfigLayer::default();
			layer.pull_mut().page_size = Some(self.page_size);
			Ok(layer)
		}
	}

	#[test]
	fn registers_sources() {
		let mut registry = ConfigRegistry::new();
		assert_eq!(registry.source_count(), 0);
		registry.register(Box::new(DefaultsSource));
		assert_eq!(registry.source_count(), 1);
	}

	#[test]
	fn loads_with_defaults_only() {
		let dir = TempDir::new().unwrap();
		let mut registry = ConfigRegistry::new();
		registry.register(Box::new(DefaultsSource));

		let config = registry.load(PathsConfig::rooted_at(dir.path())).unwrap();
		assert_eq!(config.pull.page_size, 500);
		assert!(config.remote.is_none());
	}

	#[test]
	fn higher_precedence_wins_regardless_of_registration_order() {
		let dir = TempDir::new().unwrap();
		let mut registry = ConfigRegistry::new();
		registry.register(Box::new(FixedSource {
			name: "cli",
			precedence: Precedence::Cli,
			page_size: 7,
		}));
		registry.register(Box::new(FixedSource {
			name: "user",
			precedence: Precedence::UserFile,
			page_size: 100,
		}));

		let config = registry.load(PathsConfig::rooted_at(dir.path())).unwrap();
		assert_eq!(config.pull.page_size, 7);
	}

	#[test]
	fn env_overrides_user_file() {
		let dir = TempDir::new().unwrap();
		let paths = PathsConfig::rooted_at(dir.path());
		std::fs::create_dir_all(paths.user_config_file.parent().unwrap()).unwrap();
		let mut file = std::fs::File::create(&paths.user_config_file).unwrap();
		writeln!(file, "[pull]\npage_size = 100\ninterval_secs = 15").unwrap();

		let mut registry = ConfigRegistry::new();
		registry.register(Box::new(DefaultsSource));
		registry.register(Box::new(FileSource::user(&paths)));
		registry.register(Box::new(EnvSource::from_vars([(
			"STRATA_PULL_PAGE_SIZE".to_string(),
			"50".to_string(),
		)])));

		let config = registry.load(paths).unwrap();
		assert_eq!(config.pull.page_size, 50);
		assert_eq!(config.pull.interval.as_secs(), 15);
	}

	#[test]
	fn invalid_merged_config_fails() {
		let dir = TempDir::new().unwrap();
		let mut registry = ConfigRegistry::new();
		registry.register(Box::new(FixedSource {
			name: "bad",
			precedence: Precedence::Environment,
			page_size: 0,
		}));

		assert!(registry.load(PathsConfig::rooted_at(dir.path())).is_err());
	}
}
