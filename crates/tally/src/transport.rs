// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP delivery of NDJSON batches to the collector.
//!
//! Status handling:
//!
//! | Status | Retried | Reported | Result |
//! |--------|---------|----------|--------|
//! | 2xx (except 207) | - | no | `Ok` |
//! | 207 | - | yes, with the rejected count | `Ok` |
//! | 413 | no | no, the payload-too-large hook runs | `Err` |
//! | 401 / other 4xx | no | yes | `Err` |
//! | 5xx / connection failures | yes | after the last attempt | `Err` |
//!
//! Request builder and DNS failures are reported without retrying.

use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use reqwest::header::{AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tally_common_http::{retry, RetryConfig, RetryableError};
use tally_core::wire::{self, EVENTS_PATH, LOGS_PATH, NDJSON_CONTENT_TYPE};
use tally_core::{ApiKey, Event, LogEntry};
use tracing::{debug, warn};

use crate::batcher::BatchSender;
use crate::error::{ErrorCallback, ErrorReporter, Result, TallyError};

/// Invoked on every 413 response, before the error is returned.
pub type PayloadTooLargeHook = Arc<dyn Fn() + Send + Sync>;

/// Settings for a [`Transport`].
#[derive(Debug, Clone)]
pub struct TransportOptions {
	pub endpoint: String,
	pub api_key: ApiKey,
	pub retry: RetryConfig,
	pub gzip: bool,
	/// Per-request timeout.
	pub timeout: Duration,
}

/// Sends event and log batches to the collector.
pub struct Transport {
	http: Client,
	endpoint: String,
	api_key: ApiKey,
	retry: RetryConfig,
	gzip: bool,
	reporter: ErrorReporter,
	on_payload_too_large: Mutex<Option<PayloadTooLargeHook>>,
}

impl fmt::Debug for Transport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Transport")
			.field("endpoint", &self.endpoint)
			.field("api_key", &self.api_key)
			.field("retry", &self.retry)
			.field("gzip", &self.gzip)
			.finish_non_exhaustive()
	}
}

impl Transport {
	pub fn new(options: TransportOptions, on_error: Option<ErrorCallback>) -> Result<Self> {
		Self::with_reporter(options, ErrorReporter::new(on_error))
	}

	pub(crate) fn with_reporter(options: TransportOptions, reporter: ErrorReporter) -> Result<Self> {
		let http = tally_common_http::builder()
			.timeout(options.timeout)
			.build()
			.map_err(|e| TallyError::Configuration(format!("failed to build HTTP client: {e}")))?;

		Ok(Self {
			http,
			endpoint: options.endpoint.trim_end_matches('/').to_string(),
			api_key: options.api_key,
			retry: options.retry,
			gzip: options.gzip,
			reporter,
			on_payload_too_large: Mutex::new(None),
		})
	}

	/// Installs the hook run on 413 responses, replacing any previous one.
	pub fn set_payload_too_large_hook(&self, hook: PayloadTooLargeHook) {
		*self.on_payload_too_large.lock() = Some(hook);
	}

	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}

	pub async fn send_events(&self, events: &[Event]) -> Result<()> {
		self.send(EVENTS_PATH, events).await
	}

	pub async fn send_logs(&self, logs: &[LogEntry]) -> Result<()> {
		self.send(LOGS_PATH, logs).await
	}

	async fn send<T: Serialize + Sync>(&self, path: &'static str, items: &[T]) -> Result<()> {
		if items.is_empty() {
			return Ok(());
		}

		let body = match encode_body(items, self.gzip) {
			Ok(body) => body,
			Err(e) => {
				self.reporter.report(&e);
				return Err(e);
			}
		};

		let url = format!("{}{}", self.endpoint, path);
		let url = url.as_str();
		let count = items.len();

		debug!(path, count, bytes = body.len(), gzip = self.gzip, "Sending batch");

		let result = retry(&self.retry, move |attempt| {
			self.attempt(url, body.clone(), count, attempt)
		})
		.await;

		match result {
			Ok(()) => Ok(()),
			Err(failure) => {
				if failure.report {
					self.reporter.report(&failure.error);
				}
				Err(failure.error)
			}
		}
	}

	async fn attempt(
		&self,
		url: &str,
		body: Bytes,
		count: usize,
		attempt: u32,
	) -> std::result::Result<(), AttemptError> {
		let mut request = self
			.http
			.post(url)
			.header(AUTHORIZATION, format!("Bearer {}", self.api_key.as_str()))
			.header(CONTENT_TYPE, NDJSON_CONTENT_TYPE);
		if self.gzip {
			request = request.header(CONTENT_ENCODING, "gzip");
		}

		let response = request
			.body(body)
			.send()
			.await
			.map_err(AttemptError::from_request)?;

		let status = response.status();
		match status {
			StatusCode::MULTI_STATUS => {
				let text = response.text().await.unwrap_or_default();
				let message = match rejected_count(&text) {
					Some(rejected) => format!("partial success: {rejected} of {count} items rejected"),
					None => format!("partial success: some of {count} items rejected"),
				};
				self.reporter.report(&TallyError::network(Some(207), message));
				Ok(())
			}
			s if s.is_success() => {
				debug!(status = s.as_u16(), count, attempt, "Batch delivered");
				Ok(())
			}
			StatusCode::PAYLOAD_TOO_LARGE => {
				warn!(count, "Payload too large, shrinking batch size");
				let hook = self.on_payload_too_large.lock().clone();
				if let Some(hook) = hook {
					hook();
				}
				Err(AttemptError::silent(TallyError::network(
					Some(413),
					"payload too large",
				)))
			}
			StatusCode::UNAUTHORIZED => Err(AttemptError::fatal(TallyError::network(
				Some(401),
				"invalid API key",
			))),
			s if s.is_client_error() => {
				let text = response.text().await.unwrap_or_default();
				Err(AttemptError::classified(TallyError::network(
					Some(s.as_u16()),
					format!("request rejected: {}", text.trim()),
				)))
			}
			s => Err(AttemptError::classified(TallyError::network(
				Some(s.as_u16()),
				format!("server error: {}", s.canonical_reason().unwrap_or("unknown")),
			))),
		}
	}
}

#[async_trait]
impl BatchSender<Event> for Transport {
	async fn send_batch(&self, batch: Vec<Event>) -> Result<()> {
		self.send_events(&batch).await
	}
}

#[async_trait]
impl BatchSender<LogEntry> for Transport {
	async fn send_batch(&self, batch: Vec<LogEntry>) -> Result<()> {
		self.send_logs(&batch).await
	}
}

/// Outcome of one failed attempt, classified for the retry loop.
#[derive(Debug)]
struct AttemptError {
	error: TallyError,
	retryable: bool,
	report: bool,
}

impl AttemptError {
	/// Reported, and retried when the error itself is transient.
	fn classified(error: TallyError) -> Self {
		Self {
			retryable: error.is_retryable(),
			error,
			report: true,
		}
	}

	fn fatal(error: TallyError) -> Self {
		Self {
			error,
			retryable: false,
			report: true,
		}
	}

	fn silent(error: TallyError) -> Self {
		Self {
			error,
			retryable: false,
			report: false,
		}
	}

	fn from_request(err: reqwest::Error) -> Self {
		let unrecoverable = err.is_builder() || is_dns_failure(&err);
		let error = TallyError::from(err);
		if unrecoverable {
			Self::fatal(error)
		} else {
			Self::classified(error)
		}
	}
}

impl fmt::Display for AttemptError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(&self.error, f)
	}
}

impl RetryableError for AttemptError {
	fn is_retryable(&self) -> bool {
		self.retryable
	}
}

fn is_dns_failure(err: &reqwest::Error) -> bool {
	let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
	while let Some(e) = source {
		let text = e.to_string();
		if text.contains("dns error") || text.contains("failed to lookup address") {
			return true;
		}
		source = e.source();
	}
	false
}

fn rejected_count(body: &str) -> Option<u64> {
	let value: serde_json::Value = serde_json::from_str(body).ok()?;
	value.get("rejected")?.as_u64()
}

pub(crate) fn encode_body<T: Serialize>(items: &[T], gzip: bool) -> Result<Bytes> {
	let ndjson = wire::encode_ndjson(items)?;
	if !gzip {
		return Ok(Bytes::from(ndjson));
	}
	let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
	encoder.write_all(ndjson.as_bytes())?;
	Ok(Bytes::from(encoder.finish()?))
}
