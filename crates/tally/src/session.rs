// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session id rotation.
//!
//! A session ends after `timeout` without activity. Rotation happens when
//! the client starts or resets, when a call arrives after the idle gap, when
//! the periodic check sees the gap after recent activity, and when the host
//! reports a foreground transition after the gap. Each rotation may emit a
//! `context` marker; markers closer together than the cooldown are
//! suppressed. A session opened by the periodic check is not rotated again
//! before its first call, so one idle gap yields one `session_timeout`.

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Default idle gap that ends a session.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Minimum spacing between two session markers.
pub const MARKER_COOLDOWN: Duration = Duration::from_secs(1);

/// Why a session was rotated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionReason {
	SessionStart,
	SessionTimeout,
	AppForeground,
}

impl SessionReason {
	pub fn as_str(&self) -> &'static str {
		match self {
			SessionReason::SessionStart => "session_start",
			SessionReason::SessionTimeout => "session_timeout",
			SessionReason::AppForeground => "app_foreground",
		}
	}
}

impl fmt::Display for SessionReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Result of a rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Rotation {
	pub session_id: String,
	pub previous: Option<String>,
	pub reason: SessionReason,
	pub emit_marker: bool,
}

struct SessionState {
	id: Option<String>,
	last_activity: Instant,
	last_marker: Option<Instant>,
	active_since_rotation: bool,
	/// Set when the idle check opened the session and no call has used it
	/// yet; such a session cannot expire.
	idle_rotated: bool,
}

pub(crate) struct SessionTracker {
	timeout: Duration,
	cooldown: Duration,
	state: Mutex<SessionState>,
}

impl SessionTracker {
	pub(crate) fn new(timeout: Duration, cooldown: Duration) -> Self {
		Self {
			timeout,
			cooldown,
			state: Mutex::new(SessionState {
				id: None,
				last_activity: Instant::now(),
				last_marker: None,
				active_since_rotation: false,
				idle_rotated: false,
			}),
		}
	}

	pub(crate) fn current(&self) -> Option<String> {
		self.state.lock().id.clone()
	}

	/// How often the background task should look for idle sessions.
	pub(crate) fn check_period(&self) -> Duration {
		(self.timeout / 2).clamp(Duration::from_millis(10), Duration::from_secs(60))
	}

	/// Starts a new session unconditionally.
	pub(crate) fn start(&self, new_id: String, reason: SessionReason) -> Rotation {
		let mut state = self.state.lock();
		self.rotate_locked(&mut state, new_id, reason)
	}

	/// Records a call, rotating first if the idle gap has passed.
	pub(crate) fn touch(&self, new_id: impl FnOnce() -> String) -> Option<Rotation> {
		let mut state = self.state.lock();
		let now = Instant::now();
		let rotation = if self.expired(&state, now) && self.marker_allowed(&state, now) {
			Some(self.rotate_locked(&mut state, new_id(), SessionReason::SessionTimeout))
		} else {
			None
		};
		state.last_activity = now;
		state.active_since_rotation = true;
		state.idle_rotated = false;
		rotation
	}

	/// Periodic check: rotates an idle session that saw activity since its
	/// last rotation.
	pub(crate) fn check_idle(&self, new_id: impl FnOnce() -> String) -> Option<Rotation> {
		let mut state = self.state.lock();
		let now = Instant::now();
		if !state.active_since_rotation || !self.expired(&state, now) {
			return None;
		}
		if !self.marker_allowed(&state, now) {
			return None;
		}
		let rotation = self.rotate_locked(&mut state, new_id(), SessionReason::SessionTimeout);
		state.idle_rotated = true;
		Some(rotation)
	}

	/// Host-reported foreground transition.
	pub(crate) fn foreground(&self, new_id: impl FnOnce() -> String) -> Option<Rotation> {
		let mut state = self.state.lock();
		let now = Instant::now();
		if !self.expired(&state, now) || !self.marker_allowed(&state, now) {
			return None;
		}
		Some(self.rotate_locked(&mut state, new_id(), SessionReason::AppForeground))
	}

	fn expired(&self, state: &SessionState, now: Instant) -> bool {
		state.id.is_some()
			&& !state.idle_rotated
			&& now.duration_since(state.last_activity) > self.timeout
	}

	fn marker_allowed(&self, state: &SessionState, now: Instant) -> bool {
		state
			.last_marker
			.map_or(true, |at| now.duration_since(at) >= self.cooldown)
	}

	fn rotate_locked(
		&self,
		state: &mut SessionState,
		new_id: String,
		reason: SessionReason,
	) -> Rotation {
		let now = Instant::now();
		let emit_marker = self.marker_allowed(state, now);
		if emit_marker {
			state.last_marker = Some(now);
		}
		let previous = state.id.replace(new_id.clone());
		state.last_activity = now;
		state.active_since_rotation = false;
		state.idle_rotated = false;

		debug!(
			session_id = %new_id,
			previous = previous.as_deref().unwrap_or(""),
			reason = reason.as_str(),
			emit_marker,
			"Session rotated"
		);

		Rotation {
			session_id: new_id,
			previous,
			reason,
			emit_marker,
		}
	}
}
