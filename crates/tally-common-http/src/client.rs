// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Shared HTTP client builders with consistent User-Agent header.

use reqwest::ClientBuilder;

/// SDK version reported in the User-Agent.
const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Creates a new HTTP client builder with the standard Tally User-Agent header.
///
/// # Example
/// ```ignore
/// let client = tally_common_http::builder()
///     .timeout(Duration::from_secs(10))
///     .build()?;
/// ```
pub fn builder() -> ClientBuilder {
	reqwest::Client::builder().user_agent(user_agent())
}

/// Creates a blocking HTTP client builder with the standard User-Agent.
///
/// Blocking clients must be built and used outside of an async runtime,
/// e.g. on a dedicated thread.
pub fn blocking_builder() -> reqwest::blocking::ClientBuilder {
	reqwest::blocking::Client::builder().user_agent(user_agent())
}

/// Returns the standard Tally User-Agent string.
///
/// Format: `tally-rust/{version} ({os}-{arch})`
pub fn user_agent() -> String {
	format!(
		"tally-rust/{} ({}-{})",
		SDK_VERSION,
		std::env::consts::OS,
		std::env::consts::ARCH
	)
}
