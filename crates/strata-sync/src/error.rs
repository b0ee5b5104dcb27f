// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use reqwest::StatusCode;
use strata_common_http::{is_transient_status, RetryableError};
use thiserror::Error;

/// Errors from the embedded SQLite store. These always reach the caller.
#[derive(Debug, Error)]
pub enum LocalStoreError {
	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("schema mismatch: {0}")]
	SchemaMismatch(String),
}

/// Errors from the remote replica. The coordinator logs and counts these and
/// never hands them to callers of `run`/`get`/`all`/`exec`.
#[derive(Debug, Error)]
pub enum RemoteError {
	#[error("network error: {0}")]
	Network(#[from] reqwest::Error),

	#[error("server error: {status} - {message}")]
	Server { status: StatusCode, message: String },

	#[error("statement failed{}: {message}", code_suffix(.code))]
	Statement {
		code: Option<String>,
		message: String,
	},

	#[error("request timeout")]
	Timeout,

	#[error("invalid URL: {0}")]
	InvalidUrl(String),

	#[error("protocol error: {0}")]
	Protocol(String),
}

fn code_suffix(code: &Option<String>) -> String {
	code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default()
}

const DUPLICATE_MARKERS: &[&str] = &[
	"unique constraint failed",
	"sqlite_constraint_primarykey",
	"sqlite_constraint_unique",
	"duplicate key",
];

impl RemoteError {
	/// True when the remote rejected a write because the row already exists.
	pub fn is_duplicate_key(&self) -> bool {
		let text = match self {
			Self::Statement { code, message } => {
				format!("{} {}", code.as_deref().unwrap_or_default(), message)
			}
			Self::Server { message, .. } => message.clone(),
			_ => return false,
		}
		.to_ascii_lowercase();

		DUPLICATE_MARKERS.iter().any(|marker| text.contains(marker))
	}
}

impl RetryableError for RemoteError {
	fn is_retryable(&self) -> bool {
		match self {
			Self::Network(e) => e.is_retryable(),
			Self::Server { status, .. } => is_transient_status(*status),
			Self::Timeout => true,
			Self::Statement { .. } | Self::InvalidUrl(_) | Self::Protocol(_) => false,
		}
	}
}

#[derive(Debug, Error)]
pub enum PendingStoreError {
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

/// Top-level error for opening instances and explicit sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
	#[error("local store error: {0}")]
	Local(#[from] LocalStoreError),

	#[error("remote error: {0}")]
	Remote(#[from] RemoteError),

	#[error("pending push store error: {0}")]
	Pending(#[from] PendingStoreError),

	#[error("no remote replica is configured for this instance")]
	RemoteDisabled,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unique_violation_is_duplicate() {
		let err = RemoteError::Statement {
			code: Some("SQLITE_CONSTRAINT".to_string()),
			message: "UNIQUE constraint failed: t.id".to_string(),
		};
		assert!(err.is_duplicate_key());
	}

	#[test]
	fn primary_key_code_is_duplicate() {
		let err = RemoteError::Statement {
			code: Some("SQLITE_CONSTRAINT_PRIMARYKEY".to_string()),
			message: "constraint failed".to_string(),
		};
		assert!(err.is_duplicate_key());
	}

	#[test]
	fn server_duplicate_message_is_duplicate() {
		let err = RemoteError::Server {
			status: StatusCode::BAD_REQUEST,
			message: "duplicate key value violates constraint".to_string(),
		};
		assert!(err.is_duplicate_key());
	}

	#[test]
	fn other_errors_are_not_duplicates() {
		let err = RemoteError::Statement {
			code: None,
			message: "no such table: missing".to_string(),
		};
		assert!(!err.is_duplicate_key());
		assert!(!RemoteError::Timeout.is_duplicate_key());
	}

	#[test]
	fn retry_classification() {
		assert!(RemoteError::Timeout.is_retryable());
		assert!(RemoteError::Server {
			status: StatusCode::SERVICE_UNAVAILABLE,
			message: String::new(),
		}
		.is_retryable());
		assert!(!RemoteError::Server {
			status: StatusCode::UNAUTHORIZED,
			message: String::new(),
		}
		.is_retryable());
		assert!(!RemoteError::Statement {
			code: None,
			message: "syntax error".to_string(),
		}
		.is_retryable());
	}

	#[test]
	fn statement_display_includes_code() {
		let err = RemoteError::Statement {
			code: Some("SQLITE_ERROR".to_string()),
			message: "near \"SELEC\": syntax error".to_string(),
		};
		assert_eq!(
			err.to_string(),
			"statement failed (SQLITE_ERROR): near \"SELEC\": syntax error"
		);
	}
}
