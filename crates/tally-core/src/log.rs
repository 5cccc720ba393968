// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Structured log entry types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::event::now_millis;
use crate::properties::Properties;

/// Syslog-style severity of a log entry.
///
/// Ordering follows severity: `Emergency` is the greatest, `Trace` the least.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
	Trace,
	Debug,
	Info,
	Notice,
	Warning,
	Error,
	Critical,
	Alert,
	Emergency,
}

impl LogLevel {
	/// All levels from most to least severe.
	pub const ALL: [LogLevel; 9] = [
		LogLevel::Emergency,
		LogLevel::Alert,
		LogLevel::Critical,
		LogLevel::Error,
		LogLevel::Warning,
		LogLevel::Notice,
		LogLevel::Info,
		LogLevel::Debug,
		LogLevel::Trace,
	];

	/// Returns the wire name of this level.
	pub fn as_str(&self) -> &'static str {
		match self {
			LogLevel::Emergency => "emergency",
			LogLevel::Alert => "alert",
			LogLevel::Critical => "critical",
			LogLevel::Error => "error",
			LogLevel::Warning => "warning",
			LogLevel::Notice => "notice",
			LogLevel::Info => "info",
			LogLevel::Debug => "debug",
			LogLevel::Trace => "trace",
		}
	}
}

impl fmt::Display for LogLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for LogLevel {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"emergency" => Ok(LogLevel::Emergency),
			"alert" => Ok(LogLevel::Alert),
			"critical" => Ok(LogLevel::Critical),
			"error" => Ok(LogLevel::Error),
			"warning" | "warn" => Ok(LogLevel::Warning),
			"notice" => Ok(LogLevel::Notice),
			"info" => Ok(LogLevel::Info),
			"debug" => Ok(LogLevel::Debug),
			"trace" => Ok(LogLevel::Trace),
			other => Err(CoreError::validation(
				"level",
				format!("unknown log level: {other}"),
			)),
		}
	}
}

/// A structured log line destined for the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
	pub level: LogLevel,
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub service: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
	/// Milliseconds since the Unix epoch.
	pub timestamp: i64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Properties>,
}

impl LogEntry {
	/// Creates a log entry stamped with the current time.
	pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
		Self {
			level,
			message: message.into(),
			service: None,
			source: None,
			session_id: None,
			timestamp: now_millis(),
			data: None,
		}
	}

	/// Sets the service tag (builder pattern).
	pub fn with_service(mut self, service: Option<String>) -> Self {
		self.service = service;
		self
	}

	/// Sets the source tag (builder pattern).
	pub fn with_source(mut self, source: Option<String>) -> Self {
		self.source = source;
		self
	}

	/// Sets the session identifier (builder pattern).
	pub fn with_session(mut self, session_id: Option<String>) -> Self {
		self.session_id = session_id;
		self
	}

	/// Attaches structured data; an empty map is omitted.
	pub fn with_data(mut self, data: Properties) -> Self {
		self.data = if data.is_empty() { None } else { Some(data) };
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn severity_ordering() {
		assert!(LogLevel::Emergency > LogLevel::Alert);
		assert!(LogLevel::Warning > LogLevel::Notice);
		assert!(LogLevel::Debug > LogLevel::Trace);

		let mut sorted = LogLevel::ALL.to_vec();
		sorted.sort();
		sorted.reverse();
		assert_eq!(sorted, LogLevel::ALL.to_vec());
	}

	#[test]
	fn parse_accepts_warn_alias() {
		assert_eq!("warn".parse::<LogLevel>().unwrap(), LogLevel::Warning);
		assert_eq!("INFO".parse::<LogLevel>().unwrap(), LogLevel::Info);
		assert!("verbose".parse::<LogLevel>().is_err());
	}

	#[test]
	fn log_entry_omits_empty_optionals() {
		let entry = LogEntry::new(LogLevel::Info, "started").with_data(Properties::new());
		let json = serde_json::to_value(&entry).unwrap();
		assert_eq!(json["level"], "info");
		assert_eq!(json["message"], "started");
		assert!(json.get("data").is_none());
		assert!(json.get("service").is_none());
	}

	#[test]
	fn log_entry_carries_tags() {
		let entry = LogEntry::new(LogLevel::Error, "boom")
			.with_service(Some("api".to_string()))
			.with_source(Some("rust".to_string()))
			.with_session(Some("sess".to_string()))
			.with_data(Properties::new().insert("code", 500));
		let json = serde_json::to_value(&entry).unwrap();
		assert_eq!(json["service"], "api");
		assert_eq!(json["source"], "rust");
		assert_eq!(json["session_id"], "sess");
		assert_eq!(json["data"]["code"], 500);
	}

	proptest! {
		#[test]
		fn level_display_parse_roundtrip(idx in 0usize..9) {
			let level = LogLevel::ALL[idx];
			prop_assert_eq!(level.to_string().parse::<LogLevel>().unwrap(), level);
		}
	}
}
