// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! API key type for SDK authentication.
//!
//! Keys are 32 hexadecimal characters (case-insensitive), for example
//! `a1b2c3d4e5f60718293a4b5c6d7e8f90`. The key is sent as a bearer token on
//! the regular delivery path and as a `token` query parameter on the beacon
//! path.

use std::fmt;

use crate::error::{CoreError, Result};

/// A validated collector API key.
///
/// `Debug` never prints the key itself so configurations can be logged.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ApiKey(String);

impl ApiKey {
	/// Length of every valid key.
	pub const LEN: usize = 32;

	/// Parses a raw key string.
	///
	/// Surrounding whitespace is ignored; the case of the hex digits is kept.
	pub fn parse(raw: &str) -> Result<Self> {
		let key = raw.trim();

		if key.len() != Self::LEN {
			return Err(CoreError::InvalidApiKey(format!(
				"a string of {} characters",
				key.chars().count()
			)));
		}

		if !key.chars().all(|c| c.is_ascii_hexdigit()) {
			return Err(CoreError::InvalidApiKey(
				"non-hexadecimal characters".to_string(),
			));
		}

		Ok(Self(key.to_string()))
	}

	/// Returns the key as sent on the wire.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Returns the first characters of the key, for diagnostics.
	pub fn prefix(&self) -> &str {
		&self.0[..6]
	}
}

impl fmt::Debug for ApiKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ApiKey({}…)", self.prefix())
	}
}

impl std::str::FromStr for ApiKey {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self> {
		Self::parse(s)
	}
}
