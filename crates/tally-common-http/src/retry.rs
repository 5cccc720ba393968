// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Retry with exponential backoff and jitter.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Errors that know whether another attempt may succeed.
pub trait RetryableError {
	/// Returns true if the failed operation should be attempted again.
	fn is_retryable(&self) -> bool;
}

/// Backoff schedule for [`retry`].
///
/// The delay before retry `n` (1-based, the first attempt never waits) is
/// `min(base_delay * backoff_factor^(n-1) + jitter, max_delay)` with jitter
/// drawn uniformly from `[0, base_delay * jitter_ratio)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
	/// Retries after the first attempt; total attempts is `max_retries + 1`.
	pub max_retries: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub backoff_factor: f64,
	/// Jitter bound as a fraction of `base_delay`. Zero disables jitter.
	pub jitter_ratio: f64,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_retries: 3,
			base_delay: Duration::from_millis(1000),
			max_delay: Duration::from_secs(30),
			backoff_factor: 1.5,
			jitter_ratio: 0.2,
		}
	}
}

impl RetryConfig {
	/// Total number of attempts including the first one.
	pub fn max_attempts(&self) -> u32 {
		self.max_retries.saturating_add(1)
	}

	/// Delay before retry number `retry` (1 for the first retry).
	pub fn delay_for_retry(&self, retry: u32) -> Duration {
		let exponent = retry.saturating_sub(1) as i32;
		let base_ms = self.base_delay.as_secs_f64() * 1000.0;
		let scaled = base_ms * self.backoff_factor.powi(exponent);
		let jitter = if self.jitter_ratio > 0.0 {
			fastrand::f64() * base_ms * self.jitter_ratio
		} else {
			0.0
		};
		let max_ms = self.max_delay.as_secs_f64() * 1000.0;
		Duration::from_millis((scaled + jitter).min(max_ms) as u64)
	}
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is exhausted.
///
/// `op` receives the 1-based attempt number. The last error is returned when
/// all attempts fail.
pub async fn retry<F, Fut, T, E>(config: &RetryConfig, mut op: F) -> Result<T, E>
where
	F: FnMut(u32) -> Fut,
	Fut: Future<Output = Result<T, E>>,
	E: RetryableError + Display,
{
	let max_attempts = config.max_attempts();
	let mut attempt = 1;

	loop {
		match op(attempt).await {
			Ok(value) => {
				if attempt > 1 {
					debug!(attempt, "Request succeeded after retry");
				}
				return Ok(value);
			}
			Err(e) if e.is_retryable() && attempt < max_attempts => {
				let delay = config.delay_for_retry(attempt);
				warn!(
					attempt,
					max_attempts,
					delay_ms = delay.as_millis() as u64,
					error = %e,
					"Transient failure, retrying"
				);
				tokio::time::sleep(delay).await;
				attempt += 1;
			}
			Err(e) => return Err(e),
		}
	}
}
