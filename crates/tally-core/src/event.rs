// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Analytics event types.
//!
//! Every event kind uses the same wire shape: identifiers at the top level
//! and all user-supplied data (event properties, identify/group traits,
//! session context) nested under `properties`.

use serde::{Deserialize, Serialize};

use crate::properties::Properties;

/// The kind of an analytics event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
	/// A named user action.
	Track,
	/// Attaches a user identifier and traits to the device.
	Identify,
	/// Associates the user with a group (company, team, workspace).
	Group,
	/// Links a previous identifier to a resolved user identifier.
	Alias,
	/// Session marker carrying runtime context.
	Context,
}

impl EventKind {
	/// Returns the wire name of this kind.
	pub fn as_str(&self) -> &'static str {
		match self {
			EventKind::Track => "track",
			EventKind::Identify => "identify",
			EventKind::Group => "group",
			EventKind::Alias => "alias",
			EventKind::Context => "context",
		}
	}
}

impl std::fmt::Display for EventKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A single analytics occurrence.
///
/// The kind is fixed at construction and the timestamp records construction
/// time, not send time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
	#[serde(rename = "type")]
	kind: EventKind,
	pub device_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub group_id: Option<String>,
	/// Event name, set for `track` events.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub event: Option<String>,
	/// Previous identifier, set for `alias` events.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub previous_id: Option<String>,
	/// Milliseconds since the Unix epoch.
	pub timestamp: i64,
	#[serde(default)]
	pub properties: Properties,
}

impl Event {
	fn new(kind: EventKind, device_id: impl Into<String>) -> Self {
		Self {
			kind,
			device_id: device_id.into(),
			session_id: None,
			user_id: None,
			group_id: None,
			event: None,
			previous_id: None,
			timestamp: now_millis(),
			properties: Properties::new(),
		}
	}

	/// Creates a `track` event.
	pub fn track(
		device_id: impl Into<String>,
		name: impl Into<String>,
		properties: Properties,
	) -> Self {
		let mut event = Self::new(EventKind::Track, device_id);
		event.event = Some(name.into());
		event.properties = properties;
		event
	}

	/// Creates an `identify` event; traits travel as properties.
	pub fn identify(
		device_id: impl Into<String>,
		user_id: impl Into<String>,
		traits: Properties,
	) -> Self {
		let mut event = Self::new(EventKind::Identify, device_id);
		event.user_id = Some(user_id.into());
		event.properties = traits;
		event
	}

	/// Creates a `group` event; traits travel as properties.
	pub fn group(
		device_id: impl Into<String>,
		group_id: impl Into<String>,
		traits: Properties,
	) -> Self {
		let mut event = Self::new(EventKind::Group, device_id);
		event.group_id = Some(group_id.into());
		event.properties = traits;
		event
	}

	/// Creates an `alias` event linking `previous_id` to `user_id`.
	pub fn alias(
		device_id: impl Into<String>,
		previous_id: impl Into<String>,
		user_id: impl Into<String>,
	) -> Self {
		let mut event = Self::new(EventKind::Alias, device_id);
		event.previous_id = Some(previous_id.into());
		event.user_id = Some(user_id.into());
		event
	}

	/// Creates a `context` session marker.
	pub fn context(device_id: impl Into<String>, properties: Properties) -> Self {
		let mut event = Self::new(EventKind::Context, device_id);
		event.properties = properties;
		event
	}

	/// Sets the session identifier (builder pattern).
	pub fn with_session(mut self, session_id: Option<String>) -> Self {
		self.session_id = session_id;
		self
	}

	/// Sets the user identifier unless one is already present.
	pub fn with_user(mut self, user_id: Option<String>) -> Self {
		if self.user_id.is_none() {
			self.user_id = user_id;
		}
		self
	}

	/// Returns the kind of this event.
	pub fn kind(&self) -> EventKind {
		self.kind
	}
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
	chrono::Utc::now().timestamp_millis()
}
