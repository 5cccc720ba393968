// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Best-effort delivery for process teardown.
//!
//! The beacon never retries and never reports through the error callback.
//! Each send runs on its own detached thread with a blocking HTTP client, so
//! it works after the async runtime has stopped being polled. The API key
//! travels as a `token` query parameter.

use std::thread;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tally_core::wire::{self, EVENTS_PATH, LOGS_PATH, NDJSON_CONTENT_TYPE};
use tally_core::{ApiKey, Event, LogEntry};
use tracing::{debug, warn};

/// Fire-and-forget sender used by `flush_on_unload`.
#[derive(Debug, Clone)]
pub struct Beacon {
	endpoint: String,
	api_key: ApiKey,
	timeout: Duration,
}

impl Beacon {
	pub fn new(endpoint: impl Into<String>, api_key: ApiKey, timeout: Duration) -> Self {
		let endpoint: String = endpoint.into();
		Self {
			endpoint: endpoint.trim_end_matches('/').to_string(),
			api_key,
			timeout,
		}
	}

	/// Queues `events` for delivery. Returns false if nothing was handed off.
	pub fn send_events(&self, events: Vec<Event>) -> bool {
		if events.is_empty() {
			return false;
		}
		match wire::encode_ndjson(&events) {
			Ok(body) => self.dispatch(EVENTS_PATH, body, events.len()),
			Err(e) => {
				warn!(error = %e, "Failed to encode beacon events");
				false
			}
		}
	}

	/// Queues `logs` for delivery. Returns false if nothing was handed off.
	pub fn send_logs(&self, logs: Vec<LogEntry>) -> bool {
		if logs.is_empty() {
			return false;
		}
		match wire::encode_ndjson(&logs) {
			Ok(body) => self.dispatch(LOGS_PATH, body, logs.len()),
			Err(e) => {
				warn!(error = %e, "Failed to encode beacon logs");
				false
			}
		}
	}

	fn url(&self, path: &str) -> String {
		format!("{}{}?token={}", self.endpoint, path, self.api_key.as_str())
	}

	fn dispatch(&self, path: &'static str, body: String, count: usize) -> bool {
		let url = self.url(path);
		let timeout = self.timeout;

		let spawned = thread::Builder::new()
			.name("tally-beacon".to_string())
			.spawn(move || {
				let client = match tally_common_http::blocking_builder().timeout(timeout).build() {
					Ok(client) => client,
					Err(e) => {
						warn!(error = %e, "Failed to build beacon client");
						return;
					}
				};

				match client
					.post(&url)
					.header(CONTENT_TYPE, NDJSON_CONTENT_TYPE)
					.body(body)
					.send()
				{
					Ok(response) => {
						debug!(path, count, status = response.status().as_u16(), "Beacon delivered");
					}
					Err(e) => {
						warn!(path, count, error = %e, "Beacon delivery failed");
					}
				}
			});

		match spawned {
			Ok(_) => true,
			Err(e) => {
				warn!(error = %e, "Failed to spawn beacon thread");
				false
			}
		}
	}
}
