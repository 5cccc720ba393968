// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Newline-delimited JSON framing used by the collector endpoints.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Content type of every request body.
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Path of the event ingestion endpoint.
pub const EVENTS_PATH: &str = "/v1/events";

/// Path of the log ingestion endpoint.
pub const LOGS_PATH: &str = "/v1/logs";

/// Serializes items as one JSON document per line.
///
/// Lines are joined with `\n`; a single item yields a single line.
pub fn encode_ndjson<T: Serialize>(items: &[T]) -> Result<String> {
	let mut body = String::new();
	for (i, item) in items.iter().enumerate() {
		if i > 0 {
			body.push('\n');
		}
		body.push_str(&serde_json::to_string(item)?);
	}
	Ok(body)
}

/// Parses an NDJSON body, skipping blank lines.
pub fn decode_ndjson<T: DeserializeOwned>(body: &str) -> Result<Vec<T>> {
	body
		.lines()
		.filter(|line| !line.trim().is_empty())
		.map(|line| serde_json::from_str(line).map_err(Into::into))
		.collect()
}
