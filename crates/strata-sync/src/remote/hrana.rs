// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! libSQL remote over the Hrana HTTP pipeline protocol.
//!
//! Each statement is sent as one `POST {base}/v2/pipeline` carrying an
//! `execute` request followed by `close`, so no stream state (baton) is
//! kept between calls.

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use strata_common_http::RetryConfig;
use strata_config::{RemoteConfig, SecretString};
use tracing::{debug, trace};
use url::Url;

use super::{RemoteReplica, ResultSet};
use crate::error::RemoteError;
use crate::value::Value;

pub struct HranaClient {
	pipeline_url: Url,
	http: reqwest::Client,
	auth_token: SecretString,
	retry_config: RetryConfig,
}

impl HranaClient {
	/// `url` may use the `libsql://`, `wss://`, `ws://`, `https://` or
	/// `http://` scheme; websocket and libsql schemes are mapped to HTTP.
	pub fn new(
		url: &str,
		auth_token: SecretString,
		http: reqwest::Client,
	) -> Result<Self, RemoteError> {
		let base = normalize_base_url(url)?;
		let mut pipeline_url = base.clone();
		pipeline_url.set_path(&format!("{}/v2/pipeline", base.path().trim_end_matches('/')));

		Ok(Self {
			pipeline_url,
			http,
			auth_token,
			retry_config: RetryConfig::default(),
		})
	}

	pub fn from_config(
		remote: &RemoteConfig,
		retry: &strata_config::RetryConfig,
	) -> Result<Self, RemoteError> {
		let http = strata_common_http::new_client_with_timeout(remote.request_timeout)?;
		Ok(Self::new(&remote.url, remote.auth_token.clone(), http)?.with_retry_config(
			RetryConfig {
				max_attempts: retry.max_attempts,
				base_delay: retry.base_delay,
				max_delay: retry.max_delay,
				backoff_factor: retry.backoff_factor,
				jitter: retry.jitter,
			},
		))
	}

	pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
		self.retry_config = config;
		self
	}

	pub fn pipeline_url(&self) -> &Url {
		&self.pipeline_url
	}

	async fn send_pipeline(&self, body: &PipelineRequest<'_>) -> Result<PipelineResponse, RemoteError> {
		let response = self
			.http
			.post(self.pipeline_url.clone())
			.bearer_auth(self.auth_token.expose())
			.json(body)
			.send()
			.await?;

		let status = response.status();
		if status.is_success() {
			return response
				.json::<PipelineResponse>()
				.await
				.map_err(|e| RemoteError::Protocol(format!("invalid pipeline response: {e}")));
		}

		let message = response.text().await.unwrap_or_default();
		Err(match status {
			StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => RemoteError::Timeout,
			status => RemoteError::Server { status, message },
		})
	}
}

#[async_trait]
impl RemoteReplica for HranaClient {
	async fn execute(&self, sql: &str, args: &[Value]) -> Result<ResultSet, RemoteError> {
		let body = PipelineRequest {
			baton: None,
			requests: vec![
				StreamRequest::Execute {
					stmt: Stmt {
						sql,
						args: args.iter().map(WireValue::from).collect(),
						want_rows: true,
					},
				},
				StreamRequest::Close,
			],
		};

		trace!(url = %self.pipeline_url, "executing remote statement");

		let body = &body;
		let response = strata_common_http::retry(&self.retry_config, move || async move {
			self.send_pipeline(body).await
		})
		.await?;

		let result = match response.results.into_iter().next() {
			Some(StreamResult::Ok {
				response: StreamResponse::Execute { result },
			}) => result,
			Some(StreamResult::Ok { response }) => {
				return Err(RemoteError::Protocol(format!(
					"expected execute response, got {response:?}"
				)))
			}
			Some(StreamResult::Error { error }) => {
				debug!(code = ?error.code, message = %error.message, "remote statement failed");
				return Err(RemoteError::Statement {
					code: error.code,
					message: error.message,
				});
			}
			None => return Err(RemoteError::Protocol("empty pipeline response".to_string())),
		};

		result.into_result_set()
	}
}

fn normalize_base_url(raw: &str) -> Result<Url, RemoteError> {
	let (scheme, rest) = raw
		.trim()
		.split_once("://")
		.ok_or_else(|| RemoteError::InvalidUrl(format!("missing scheme in {raw}")))?;

	let mapped = match scheme.to_ascii_lowercase().as_str() {
		"libsql" | "wss" | "https" => "https",
		"ws" | "http" => "http",
		other => {
			return Err(RemoteError::InvalidUrl(format!(
				"unsupported scheme '{other}'"
			)))
		}
	};

	let mut url = Url::parse(&format!("{mapped}://{rest}"))
		.map_err(|e| RemoteError::InvalidUrl(e.to_string()))?;
	url.set_query(None);
	url.set_fragment(None);
	Ok(url)
}

#[derive(Debug, Serialize)]
struct PipelineRequest<'a> {
	baton: Option<String>,
	requests: Vec<StreamRequest<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamRequest<'a> {
	Execute { stmt: Stmt<'a> },
	Close,
}

#[derive(Debug, Serialize)]
struct Stmt<'a> {
	sql: &'a str,
	args: Vec<WireValue>,
	want_rows: bool,
}

#[derive(Debug, Deserialize)]
struct PipelineResponse {
	results: Vec<StreamResult>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamResult {
	Ok { response: StreamResponse },
	Error { error: WireError },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamResponse {
	Execute { result: StmtResult },
	Close,
}

#[derive(Debug, Deserialize)]
struct WireError {
	message: String,
	#[serde(default)]
	code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StmtResult {
	#[serde(default)]
	cols: Vec<WireColumn>,
	#[serde(default)]
	rows: Vec<Vec<WireValue>>,
	#[serde(default)]
	affected_row_count: u64,
	#[serde(default)]
	last_insert_rowid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireColumn {
	#[serde(default)]
	name: Option<String>,
}

impl StmtResult {
	fn into_result_set(self) -> Result<ResultSet, RemoteError> {
		let columns = self
			.cols
			.into_iter()
			.enumerate()
			.map(|(i, c)| c.name.unwrap_or_else(|| format!("column{i}")))
			.collect::<Vec<_>>();

		let rows = self
			.rows
			.into_iter()
			.map(|row| {
				if row.len() != columns.len() {
					return Err(RemoteError::Protocol(format!(
						"row has {} values for {} columns",
						row.len(),
						columns.len()
					)));
				}
				row.into_iter().map(Value::try_from).collect()
			})
			.collect::<Result<Vec<_>, _>>()?;

		let last_insert_rowid = self
			.last_insert_rowid
			.map(|id| {
				id.parse::<i64>()
					.map_err(|e| RemoteError::Protocol(format!("bad last_insert_rowid: {e}")))
			})
			.transpose()?;

		Ok(ResultSet {
			columns,
			rows,
			rows_affected: self.affected_row_count,
			last_insert_rowid,
		})
	}
}

/// Hrana JSON value encoding. Integers travel as decimal strings so no
/// precision is lost in JSON numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireValue {
	Null,
	Integer { value: String },
	Float { value: f64 },
	Text { value: String },
	Blob { base64: String },
}

impl From<&Value> for WireValue {
	fn from(value: &Value) -> Self {
		match value {
			Value::Null => WireValue::Null,
			Value::Integer(i) => WireValue::Integer {
				value: i.to_string(),
			},
			Value::Real(f) => WireValue::Float { value: *f },
			Value::Text(s) => WireValue::Text { value: s.clone() },
			Value::Blob(b) => WireValue::Blob {
				base64: STANDARD_NO_PAD.encode(b),
			},
		}
	}
}

impl TryFrom<WireValue> for Value {
	type Error = RemoteError;

	fn try_from(wire: WireValue) -> Result<Self, Self::Error> {
		Ok(match wire {
			WireValue::Null => Value::Null,
			WireValue::Integer { value } => Value::Integer(
				value
					.parse()
					.map_err(|e| RemoteError::Protocol(format!("bad integer {value:?}: {e}")))?,
			),
			WireValue::Float { value } => Value::Real(value),
			WireValue::Text { value } => Value::Text(value),
			WireValue::Blob { base64 } => {
				let decoded = if base64.ends_with('=') {
					STANDARD.decode(&base64)
				} else {
					STANDARD_NO_PAD.decode(&base64)
				};
				Value::Blob(decoded.map_err(|e| RemoteError::Protocol(format!("bad blob: {e}")))?)
			}
		})
	}
}
