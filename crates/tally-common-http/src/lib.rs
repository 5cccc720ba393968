// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Shared HTTP utilities for Tally.
//!
//! This crate provides:
//! - Pre-configured async and blocking HTTP client builders with a consistent
//!   User-Agent header
//! - Retry logic with exponential backoff and jitter for transient failures

mod client;
mod retry;

pub use client::{blocking_builder, builder, user_agent};
pub use retry::{retry, RetryConfig, RetryableError};
