// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for core validation.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors produced while validating or encoding SDK payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
	/// The API key does not have the expected shape.
	#[error("invalid API key: expected 32 hexadecimal characters, got {0}")]
	InvalidApiKey(String),

	/// A field failed validation.
	#[error("invalid {field}: {message}")]
	Validation {
		/// Name of the offending field.
		field: &'static str,
		/// What was wrong with it.
		message: String,
	},

	/// A payload could not be encoded.
	#[error("serialization error: {0}")]
	Serialization(String),
}

impl CoreError {
	pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
		CoreError::Validation {
			field,
			message: message.into(),
		}
	}

	/// Returns the offending field name for validation errors.
	pub fn field(&self) -> Option<&'static str> {
		match self {
			CoreError::Validation { field, .. } => Some(field),
			_ => None,
		}
	}
}

impl From<serde_json::Error> for CoreError {
	fn from(err: serde_json::Error) -> Self {
		CoreError::Serialization(err.to_string())
	}
}
