// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Calls made before the client is configured.

use std::collections::VecDeque;

use tally_core::{now_millis, LogLevel, Properties};
use tracing::warn;

/// Maximum number of calls held before configuration.
pub const DEFERRED_CAPACITY: usize = 100;

/// A public call captured for replay.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DeferredCall {
	Track {
		name: String,
		properties: Properties,
	},
	Identify {
		user_id: String,
		traits: Properties,
	},
	Group {
		group_id: String,
		traits: Properties,
	},
	Alias {
		previous_id: String,
		user_id: String,
	},
	Revenue {
		amount: f64,
		currency: String,
		order_id: String,
		properties: Properties,
	},
	Log {
		level: LogLevel,
		message: String,
		data: Option<Properties>,
	},
	Register(Properties),
	RegisterOnce(Properties),
	Unregister(String),
}

impl DeferredCall {
	fn name(&self) -> &'static str {
		match self {
			DeferredCall::Track { .. } => "track",
			DeferredCall::Identify { .. } => "identify",
			DeferredCall::Group { .. } => "group",
			DeferredCall::Alias { .. } => "alias",
			DeferredCall::Revenue { .. } => "revenue",
			DeferredCall::Log { .. } => "log",
			DeferredCall::Register(_) => "register",
			DeferredCall::RegisterOnce(_) => "register_once",
			DeferredCall::Unregister(_) => "unregister",
		}
	}
}

/// A deferred call and the time it was made, in epoch milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Deferred {
	pub call: DeferredCall,
	pub recorded_at: i64,
}

/// Bounded FIFO of deferred calls; the oldest call is dropped when full.
#[derive(Debug)]
pub(crate) struct DeferredQueue {
	calls: VecDeque<Deferred>,
	capacity: usize,
}

impl Default for DeferredQueue {
	fn default() -> Self {
		Self::with_capacity(DEFERRED_CAPACITY)
	}
}

impl DeferredQueue {
	pub(crate) fn with_capacity(capacity: usize) -> Self {
		Self {
			calls: VecDeque::new(),
			capacity: capacity.max(1),
		}
	}

	pub(crate) fn push(&mut self, call: DeferredCall) {
		while self.calls.len() >= self.capacity {
			if let Some(dropped) = self.calls.pop_front() {
				warn!(call = dropped.call.name(), "Pre-init queue full, dropped oldest call");
			}
		}
		self.calls.push_back(Deferred {
			call,
			recorded_at: now_millis(),
		});
	}

	pub(crate) fn take(&mut self) -> Vec<Deferred> {
		self.calls.drain(..).collect()
	}

	pub(crate) fn len(&self) -> usize {
		self.calls.len()
	}
}
