// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bounded batching queue with size-threshold and interval flushing.
//!
//! A [`Batcher`] owns queued items until a send succeeds, overflow evicts
//! them, or [`Batcher::drain`] takes them. Queue mutation happens in short
//! synchronous sections; the only suspension points are inside the injected
//! [`BatchSender`].
//!
//! At most one flush runs per batcher. Concurrent callers of
//! [`Batcher::flush`] await the same shared future, which is spawned onto
//! the runtime so it keeps running if a caller stops waiting.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use crate::error::Result;

/// Configuration for a [`Batcher`].
#[derive(Debug, Clone)]
pub struct BatcherConfig {
	/// Number of items sent per batch, and the auto-flush threshold.
	pub size: usize,
	/// Interval between timer-driven flushes.
	pub interval: Duration,
	/// Maximum queued items before the oldest is evicted.
	pub max_queue_size: usize,
}

impl Default for BatcherConfig {
	fn default() -> Self {
		Self {
			size: 50,
			interval: Duration::from_secs(5),
			max_queue_size: 1000,
		}
	}
}

/// Delivers one batch of items.
///
/// An `Err` keeps the whole batch queued for the next flush.
#[async_trait]
pub trait BatchSender<T: Send + 'static>: Send + Sync {
	async fn send_batch(&self, batch: Vec<T>) -> Result<()>;
}

/// Invoked once per item evicted by queue overflow.
pub type OverflowHook = Arc<dyn Fn() + Send + Sync>;

type FlushFuture = Shared<BoxFuture<'static, ()>>;

struct Queue<T> {
	items: VecDeque<(u64, T)>,
	next_seq: u64,
}

struct BatcherInner<T: Send + 'static> {
	name: &'static str,
	size: AtomicUsize,
	max_queue_size: usize,
	queue: Mutex<Queue<T>>,
	closed: AtomicBool,
	in_flight: Mutex<Option<FlushFuture>>,
	timer: Mutex<Option<JoinHandle<()>>>,
	sender: Arc<dyn BatchSender<T>>,
	on_overflow: Option<OverflowHook>,
}

impl<T: Send + 'static> Drop for BatcherInner<T> {
	fn drop(&mut self) {
		if let Some(timer) = self.timer.get_mut().take() {
			timer.abort();
		}
	}
}

/// Clears the in-flight slot when the flush loop ends, however it ends.
struct InFlightGuard<'a> {
	slot: &'a Mutex<Option<FlushFuture>>,
}

impl Drop for InFlightGuard<'_> {
	fn drop(&mut self) {
		self.slot.lock().take();
	}
}

/// A bounded FIFO queue that flushes batches to a [`BatchSender`].
pub struct Batcher<T: Send + 'static> {
	inner: Arc<BatcherInner<T>>,
}

impl<T: Send + 'static> Clone for Batcher<T> {
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

/// A handle that does not keep its [`Batcher`] alive.
pub struct WeakBatcher<T: Send + 'static> {
	inner: Weak<BatcherInner<T>>,
}

impl<T: Send + 'static> Clone for WeakBatcher<T> {
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<T: Send + 'static> WeakBatcher<T> {
	pub fn upgrade(&self) -> Option<Batcher<T>> {
		self.inner.upgrade().map(|inner| Batcher { inner })
	}
}

impl<T: Clone + Send + 'static> Batcher<T> {
	/// Creates a batcher and, when called inside a tokio runtime, starts its
	/// interval timer.
	pub fn new(
		name: &'static str,
		config: BatcherConfig,
		sender: Arc<dyn BatchSender<T>>,
		on_overflow: Option<OverflowHook>,
	) -> Self {
		let inner = Arc::new(BatcherInner {
			name,
			size: AtomicUsize::new(config.size.max(1)),
			max_queue_size: config.max_queue_size.max(1),
			queue: Mutex::new(Queue {
				items: VecDeque::new(),
				next_seq: 0,
			}),
			closed: AtomicBool::new(false),
			in_flight: Mutex::new(None),
			timer: Mutex::new(None),
			sender,
			on_overflow,
		});

		let timer = spawn_timer(Arc::downgrade(&inner), config.interval);
		*inner.timer.lock() = timer;

		debug!(
			batcher = name,
			size = config.size,
			interval_ms = config.interval.as_millis() as u64,
			max_queue_size = config.max_queue_size,
			"Batcher created"
		);

		Self { inner }
	}

	pub fn downgrade(&self) -> WeakBatcher<T> {
		WeakBatcher {
			inner: Arc::downgrade(&self.inner),
		}
	}

	/// Enqueues an item. No-op once closed.
	///
	/// At capacity the oldest item is evicted first. Reaching the batch size
	/// starts a background flush.
	pub fn add(&self, item: T) {
		if self.is_closed() {
			trace!(batcher = self.inner.name, "Batcher closed, ignoring item");
			return;
		}

		let (len, evicted) = {
			let mut queue = self.inner.queue.lock();
			let mut evicted = 0usize;
			while queue.items.len() >= self.inner.max_queue_size {
				queue.items.pop_front();
				evicted += 1;
			}
			let seq = queue.next_seq;
			queue.next_seq += 1;
			queue.items.push_back((seq, item));
			(queue.items.len(), evicted)
		};

		for _ in 0..evicted {
			warn!(
				batcher = self.inner.name,
				max_queue_size = self.inner.max_queue_size,
				"Queue full, dropped oldest item"
			);
			if let Some(hook) = &self.inner.on_overflow {
				hook();
			}
		}

		if len >= self.batch_size() && Handle::try_current().is_ok() {
			drop(self.start_flush());
		}
	}

	/// Sends queued items until the queue is empty or a send fails.
	///
	/// Joins the in-flight flush if one is running. Send failures are not
	/// returned; failed items stay queued.
	pub async fn flush(&self) {
		if self.pending() == 0 {
			let running = self.inner.in_flight.lock().clone();
			if let Some(running) = running {
				running.await;
			}
			return;
		}
		self.start_flush().await;
	}

	/// Marks the batcher closed, stops its timer and runs a final flush.
	pub async fn close(&self) {
		if !self.inner.closed.swap(true, Ordering::SeqCst) {
			debug!(batcher = self.inner.name, pending = self.pending(), "Closing batcher");
		}
		if let Some(timer) = self.inner.timer.lock().take() {
			timer.abort();
		}
		self.flush().await;
	}

	/// Removes and returns every queued item.
	pub fn drain(&self) -> Vec<T> {
		let mut queue = self.inner.queue.lock();
		queue.items.drain(..).map(|(_, item)| item).collect()
	}

	/// Halves the batch size, never going below one. Returns the new size.
	pub fn halve_batch_size(&self) -> usize {
		let previous = self
			.inner
			.size
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |size| {
				Some((size / 2).max(1))
			})
			.unwrap_or_else(|size| size);
		let size = (previous / 2).max(1);
		debug!(batcher = self.inner.name, previous, size, "Halved batch size");
		size
	}

	pub fn pending(&self) -> usize {
		self.inner.queue.lock().items.len()
	}

	pub fn batch_size(&self) -> usize {
		self.inner.size.load(Ordering::SeqCst)
	}

	pub fn is_closed(&self) -> bool {
		self.inner.closed.load(Ordering::SeqCst)
	}

	fn start_flush(&self) -> FlushFuture {
		let mut slot = self.inner.in_flight.lock();
		if let Some(running) = slot.as_ref() {
			return running.clone();
		}

		let run = run_flush(self.inner.clone());
		let future: BoxFuture<'static, ()> = match Handle::try_current() {
			Ok(handle) => {
				let task = handle.spawn(run);
				async move {
					if let Err(e) = task.await {
						warn!(error = %e, "Flush task failed");
					}
				}
				.boxed()
			}
			Err(_) => run.boxed(),
		};

		let shared = future.shared();
		*slot = Some(shared.clone());
		shared
	}
}

async fn run_flush<T: Clone + Send + 'static>(inner: Arc<BatcherInner<T>>) {
	let _guard = InFlightGuard {
		slot: &inner.in_flight,
	};

	loop {
		let (batch, last_seq) = {
			let queue = inner.queue.lock();
			let size = inner.size.load(Ordering::SeqCst).max(1);
			let mut last_seq = None;
			let batch: Vec<T> = queue
				.items
				.iter()
				.take(size)
				.map(|(seq, item)| {
					last_seq = Some(*seq);
					item.clone()
				})
				.collect();
			match last_seq {
				Some(seq) => (batch, seq),
				None => break,
			}
		};

		let count = batch.len();
		debug!(batcher = inner.name, count, "Flushing batch");

		match inner.sender.send_batch(batch).await {
			Ok(()) => {
				// items evicted by overflow during the send are already gone
				let mut queue = inner.queue.lock();
				while queue
					.items
					.front()
					.is_some_and(|(seq, _)| *seq <= last_seq)
				{
					queue.items.pop_front();
				}
			}
			Err(e) => {
				debug!(
					batcher = inner.name,
					count,
					error = %e,
					"Batch send failed, keeping items queued"
				);
				break;
			}
		}
	}
}

fn spawn_timer<T: Clone + Send + 'static>(
	weak: Weak<BatcherInner<T>>,
	interval: Duration,
) -> Option<JoinHandle<()>> {
	if interval.is_zero() {
		return None;
	}
	let handle = Handle::try_current().ok()?;

	Some(handle.spawn(async move {
		let mut ticker = tokio::time::interval(interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		ticker.tick().await;

		loop {
			ticker.tick().await;
			let Some(inner) = weak.upgrade() else {
				break;
			};
			let batcher = Batcher { inner };
			if batcher.is_closed() {
				break;
			}
			if batcher.pending() > 0 {
				trace!(batcher = batcher.inner.name, "Interval flush");
				drop(batcher.start_flush());
			}
		}
	}))
}
