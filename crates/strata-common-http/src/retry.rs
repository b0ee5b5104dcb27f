// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Exponential backoff for calls against an unreliable remote.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
	/// Total attempts, including the first one. `1` disables retries.
	pub max_attempts: u32,
	pub base_delay: Duration,
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

impl RetryConfig {
	/// A config that makes exactly one attempt.
	pub fn no_retry() -> Self {
		Self {
			max_attempts: 1,
			..Self::default()
		}
	}
}

pub trait RetryableError {
	fn is_retryable(&self) -> bool;
}

/// Statuses that indicate the server may succeed on a later attempt.
pub fn is_transient_status(status: StatusCode) -> bool {
	status == StatusCode::TOO_MANY_REQUESTS
		|| status == StatusCode::REQUEST_TIMEOUT
		|| status.is_server_error()
}

impl RetryableError for reqwest::Error {
	fn is_retryable(&self) -> bool {
		if self.is_timeout() || self.is_connect() {
			return true;
		}
		self.status().map(is_transient_status).unwrap_or(false)
	}
}

fn calculate_delay(cfg: &RetryConfig, attempt: u32) -> Duration {
	let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
	let exponential = cfg.base_delay.as_secs_f64() * cfg.backoff_factor.powi(exponent);
	let capped = exponential.min(cfg.max_delay.as_secs_f64());

	let delay = if cfg.jitter {
		capped * (0.5 + fastrand::f64())
	} else {
		capped
	};

	Duration::from_secs_f64(delay)
}

/// Runs `f` until it succeeds, returns a non-retryable error, or
/// `cfg.max_attempts` is reached.
pub async fn retry<F, Fut, T, E>(cfg: &RetryConfig, mut f: F) -> Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
	E: RetryableError + std::fmt::Display,
{
	let mut attempt = 0;

	loop {
		match f().await {
			Ok(value) => return Ok(value),
			Err(err) => {
				attempt += 1;

				if !err.is_retryable() {
					debug!(error = %err, attempt, "non-retryable error");
					return Err(err);
				}

				if attempt >= cfg.max_attempts {
					warn!(
						error = %err,
						attempt,
						max_attempts = cfg.max_attempts,
						"retry attempts exhausted"
					);
					return Err(err);
				}

				let delay = calculate_delay(cfg, attempt - 1);
				debug!(
					error = %err,
					attempt,
					delay_ms = delay.as_millis() as u64,
					"retrying after transient error"
				);
				tokio::time::sleep(delay).await;
			}
		}
	}
}
