// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Argument validation run before any event or log entry is built.

use crate::error::{CoreError, Result};

/// Maximum length of an event name, in characters.
pub const MAX_EVENT_NAME_LEN: usize = 256;

/// Maximum length of a log message, in characters.
pub const MAX_LOG_MESSAGE_LEN: usize = 65_536;

/// Rejects an empty required string field.
pub fn require(field: &'static str, value: &str) -> Result<()> {
	if value.is_empty() {
		return Err(CoreError::validation(field, "must not be empty"));
	}
	Ok(())
}

/// Validates a `track` event name.
pub fn event_name(name: &str) -> Result<()> {
	require("event", name)?;
	let len = name.chars().count();
	if len > MAX_EVENT_NAME_LEN {
		return Err(CoreError::validation(
			"event",
			format!("must be at most {MAX_EVENT_NAME_LEN} characters, got {len}"),
		));
	}
	Ok(())
}

/// Validates a log message.
pub fn log_message(message: &str) -> Result<()> {
	require("message", message)?;
	let len = message.chars().count();
	if len > MAX_LOG_MESSAGE_LEN {
		return Err(CoreError::validation(
			"message",
			format!("must be at most {MAX_LOG_MESSAGE_LEN} characters, got {len}"),
		));
	}
	Ok(())
}

/// Validates a revenue amount.
pub fn amount(value: f64) -> Result<()> {
	if !value.is_finite() || value <= 0.0 {
		return Err(CoreError::validation(
			"amount",
			format!("must be a positive number, got {value}"),
		));
	}
	Ok(())
}
