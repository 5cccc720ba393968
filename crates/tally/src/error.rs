// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the Tally SDK.

use std::sync::Arc;
use std::time::Duration;

use tally_core::CoreError;
use thiserror::Error;
use tracing::warn;

/// Tally SDK errors.
#[derive(Debug, Clone, Error)]
pub enum TallyError {
	/// Invalid configuration, or a lifecycle call the client cannot honor.
	#[error("configuration error: {0}")]
	Configuration(String),

	/// A call argument failed validation; the call was dropped.
	#[error("invalid {field}: {message}")]
	Validation {
		field: &'static str,
		message: String,
	},

	/// Delivery failed, either at the transport level or with an HTTP error status.
	#[error("network error{}: {message}", status_suffix(.status))]
	Network {
		status: Option<u16>,
		message: String,
	},

	/// The client has been closed.
	#[error("client has been closed")]
	Closed,

	/// A payload could not be encoded.
	#[error("serialization error: {0}")]
	Serialization(String),

	/// Shutdown did not finish before its deadline.
	#[error("close timed out after {}ms", .after.as_millis())]
	Timeout { after: Duration },
}

fn status_suffix(status: &Option<u16>) -> String {
	match status {
		Some(code) => format!(" (status {code})"),
		None => String::new(),
	}
}

impl TallyError {
	pub(crate) fn network(status: Option<u16>, message: impl Into<String>) -> Self {
		TallyError::Network {
			status,
			message: message.into(),
		}
	}

	/// Returns the HTTP status for network errors that carry one.
	pub fn status(&self) -> Option<u16> {
		match self {
			TallyError::Network { status, .. } => *status,
			_ => None,
		}
	}

	/// Returns true for 5xx responses and status-less network failures.
	pub fn is_retryable(&self) -> bool {
		match self {
			TallyError::Network { status: None, .. } => true,
			TallyError::Network {
				status: Some(code), ..
			} => (500..600).contains(code),
			_ => false,
		}
	}
}

impl From<reqwest::Error> for TallyError {
	fn from(err: reqwest::Error) -> Self {
		TallyError::network(err.status().map(|s| s.as_u16()), err.to_string())
	}
}

impl From<CoreError> for TallyError {
	fn from(err: CoreError) -> Self {
		match err {
			CoreError::InvalidApiKey(_) => TallyError::Configuration(err.to_string()),
			CoreError::Validation { field, message } => TallyError::Validation { field, message },
			CoreError::Serialization(message) => TallyError::Serialization(message),
		}
	}
}

impl From<std::io::Error> for TallyError {
	fn from(err: std::io::Error) -> Self {
		TallyError::Serialization(err.to_string())
	}
}

/// Result type alias for Tally operations.
pub type Result<T> = std::result::Result<T, TallyError>;

/// User-supplied sink for every per-call and delivery failure.
pub type ErrorCallback = Arc<dyn Fn(&TallyError) + Send + Sync>;

/// Funnels errors to the configured callback, logging each one.
#[derive(Clone, Default)]
pub(crate) struct ErrorReporter {
	callback: Option<ErrorCallback>,
}

impl ErrorReporter {
	pub(crate) fn new(callback: Option<ErrorCallback>) -> Self {
		Self { callback }
	}

	pub(crate) fn report(&self, err: &TallyError) {
		warn!(error = %err, "Tally error");
		if let Some(callback) = &self.callback {
			callback(err);
		}
	}
}
