// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! `before_send` transform hooks.
//!
//! A hook receives an item and returns either the (possibly modified) item or
//! `None` to drop it. Hooks run strictly in registration order and the first
//! drop stops the pipeline: later hooks never see the item.

use std::sync::Arc;

/// A transform/filter hook for events or log entries.
pub type BeforeSend<T> = Arc<dyn Fn(T) -> Option<T> + Send + Sync>;

/// Wraps a closure as a [`BeforeSend`] hook.
pub fn hook<T, F>(f: F) -> BeforeSend<T>
where
	F: Fn(T) -> Option<T> + Send + Sync + 'static,
{
	Arc::new(f)
}

/// Runs `item` through `hooks`, short-circuiting on the first drop.
///
/// An empty hook list returns the item unchanged.
pub fn run_before_send<T>(item: T, hooks: &[BeforeSend<T>]) -> Option<T> {
	let mut current = item;
	for hook in hooks {
		current = hook(current)?;
	}
	Some(current)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use tally_core::{Event, Properties};

	#[test]
	fn empty_pipeline_is_identity() {
		let event = Event::track("dev", "x", Properties::new().insert("a", 1));
		let out = run_before_send(event.clone(), &[]);
		assert_eq!(out, Some(event));
	}

	#[test]
	fn hooks_apply_in_order() {
		let hooks: Vec<BeforeSend<Vec<u32>>> = vec![
			hook(|mut v: Vec<u32>| {
				v.push(1);
				Some(v)
			}),
			hook(|mut v: Vec<u32>| {
				v.push(2);
				Some(v)
			}),
		];
		assert_eq!(run_before_send(Vec::new(), &hooks), Some(vec![1, 2]));
	}

	#[test]
	fn drop_short_circuits_remaining_hooks() {
		let third_calls = Arc::new(AtomicUsize::new(0));
		let counter = third_calls.clone();

		let hooks: Vec<BeforeSend<Event>> = vec![
			hook(|mut e: Event| {
				e.properties.set("seen", true);
				Some(e)
			}),
			hook(|_| None),
			hook(move |e| {
				counter.fetch_add(1, Ordering::SeqCst);
				Some(e)
			}),
		];

		let out = run_before_send(Event::track("dev", "x", Properties::new()), &hooks);

		assert!(out.is_none());
		assert_eq!(third_calls.load(Ordering::SeqCst), 0);
	}

	#[test]
	fn single_hook_can_rewrite() {
		let hooks = vec![hook(|mut e: Event| {
			e.event = Some("renamed".to_string());
			Some(e)
		})];
		let out = run_before_send(Event::track("dev", "x", Properties::new()), &hooks).unwrap();
		assert_eq!(out.event.as_deref(), Some("renamed"));
	}
}
