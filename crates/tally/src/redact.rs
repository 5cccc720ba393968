// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Redaction hook for events and log entries.
//!
//! A [`Redactor`] inspects the property map of an item (event `properties`,
//! log `data`) and applies three steps in fixed order:
//!
//! 1. **Route drop**: if any URL-shaped string value has a path starting with
//!    a configured prefix, the whole item is dropped.
//! 2. **Query stripping**: configured query parameters are removed from
//!    URL-shaped string values.
//! 3. **Key redaction**: values under configured key names (case-insensitive)
//!    are replaced by the redaction marker.
//!
//! URL-shaped values are absolute `http`/`https` URLs and root-relative paths
//! such as `/checkout?token=abc`.
//!
//! # Example
//!
//! ```
//! use tally::Redactor;
//!
//! let redactor = Redactor::new()
//!     .strip_query_params(["token", "session"])
//!     .redact_keys(["password", "email"])
//!     .drop_routes(["/admin"]);
//! ```

use std::sync::Arc;

use serde_json::Value;
use url::{form_urlencoded, Url};
use tally_core::{Event, LogEntry, Properties};

use crate::pipeline::BeforeSend;

/// Default replacement for redacted values.
pub const REDACTED: &str = "[REDACTED]";

const RELATIVE_BASE: &str = "http://relative.invalid";

/// Items whose property map can be redacted.
pub trait Redactable {
	/// The map inspected by the redactor, if the item has one.
	fn redactable_fields(&self) -> Option<&Properties>;

	/// Returns the item with its map replaced.
	fn with_redacted_fields(self, fields: Properties) -> Self;
}

impl Redactable for Event {
	fn redactable_fields(&self) -> Option<&Properties> {
		Some(&self.properties)
	}

	fn with_redacted_fields(mut self, fields: Properties) -> Self {
		self.properties = fields;
		self
	}
}

impl Redactable for LogEntry {
	fn redactable_fields(&self) -> Option<&Properties> {
		self.data.as_ref()
	}

	fn with_redacted_fields(mut self, fields: Properties) -> Self {
		self.data = Some(fields);
		self
	}
}

/// Configurable redaction transform.
#[derive(Debug, Clone)]
pub struct Redactor {
	strip_params: Vec<String>,
	redact_keys: Vec<String>,
	drop_prefixes: Vec<String>,
	marker: String,
}

impl Default for Redactor {
	fn default() -> Self {
		Self::new()
	}
}

impl Redactor {
	/// Creates a redactor that changes nothing.
	pub fn new() -> Self {
		Self {
			strip_params: Vec::new(),
			redact_keys: Vec::new(),
			drop_prefixes: Vec::new(),
			marker: REDACTED.to_string(),
		}
	}

	/// Query parameters removed from URL-shaped values (exact match).
	pub fn strip_query_params<I, S>(mut self, params: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.strip_params.extend(params.into_iter().map(Into::into));
		self
	}

	/// Keys whose values are replaced by the marker (case-insensitive).
	pub fn redact_keys<I, S>(mut self, keys: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self
			.redact_keys
			.extend(keys.into_iter().map(|k| k.into().to_ascii_lowercase()));
		self
	}

	/// URL path prefixes that cause the whole item to be dropped.
	pub fn drop_routes<I, S>(mut self, prefixes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.drop_prefixes.extend(prefixes.into_iter().map(Into::into));
		self
	}

	/// Overrides the replacement marker.
	pub fn marker(mut self, marker: impl Into<String>) -> Self {
		self.marker = marker.into();
		self
	}

	/// Applies the redaction steps, returning `None` if the item is dropped.
	pub fn apply<T: Redactable>(&self, item: T) -> Option<T> {
		let Some(fields) = item.redactable_fields() else {
			return Some(item);
		};

		if self.hits_dropped_route(fields) {
			return None;
		}

		let mut redacted = Properties::new();
		for (key, value) in fields.iter() {
			let value = self.strip_value(value);
			let value = if self.redact_keys.contains(&key.to_ascii_lowercase()) {
				Value::String(self.marker.clone())
			} else {
				value
			};
			redacted.set(key.clone(), value);
		}

		Some(item.with_redacted_fields(redacted))
	}

	/// Converts the redactor into a `before_send` hook.
	pub fn into_hook<T: Redactable + 'static>(self) -> BeforeSend<T> {
		Arc::new(move |item| self.apply(item))
	}

	fn hits_dropped_route(&self, fields: &Properties) -> bool {
		if self.drop_prefixes.is_empty() {
			return false;
		}
		fields
			.iter()
			.filter_map(|(_, value)| value.as_str())
			.filter_map(UrlValue::parse)
			.any(|url| {
				let path = url.path();
				self
					.drop_prefixes
					.iter()
					.any(|prefix| path.starts_with(prefix.as_str()))
			})
	}

	fn strip_value(&self, value: &Value) -> Value {
		if self.strip_params.is_empty() {
			return value.clone();
		}
		let Some(raw) = value.as_str() else {
			return value.clone();
		};
		let Some(mut url) = UrlValue::parse(raw) else {
			return value.clone();
		};

		let Some(query) = url.inner().query().map(str::to_owned) else {
			return value.clone();
		};
		let segments: Vec<&str> = query.split('&').collect();
		let kept: Vec<&str> = segments
			.iter()
			.copied()
			.filter(|segment| !self.is_stripped(segment))
			.collect();

		if kept.len() == segments.len() {
			return value.clone();
		}

		let kept = kept.join("&");
		url
			.inner_mut()
			.set_query(if kept.is_empty() { None } else { Some(&kept) });
		Value::String(url.render())
	}

	/// Matches one raw `key=value` query segment by its decoded key.
	fn is_stripped(&self, segment: &str) -> bool {
		form_urlencoded::parse(segment.as_bytes())
			.next()
			.is_some_and(|(key, _)| self.strip_params.iter().any(|p| *p == key))
	}
}

enum UrlValue {
	Absolute(Url),
	Relative(Url),
}

impl UrlValue {
	fn parse(raw: &str) -> Option<Self> {
		if raw.starts_with("http://") || raw.starts_with("https://") {
			return Url::parse(raw).ok().map(UrlValue::Absolute);
		}
		if raw.starts_with('/') && !raw.starts_with("//") {
			let base = Url::parse(RELATIVE_BASE).ok()?;
			return base.join(raw).ok().map(UrlValue::Relative);
		}
		None
	}

	fn inner(&self) -> &Url {
		match self {
			UrlValue::Absolute(url) | UrlValue::Relative(url) => url,
		}
	}

	fn inner_mut(&mut self) -> &mut Url {
		match self {
			UrlValue::Absolute(url) | UrlValue::Relative(url) => url,
		}
	}

	fn path(&self) -> &str {
		self.inner().path()
	}

	fn render(&self) -> String {
		match self {
			UrlValue::Absolute(url) => url.to_string(),
			UrlValue::Relative(url) => {
				let mut out = url.path().to_string();
				if let Some(query) = url.query() {
					out.push('?');
					out.push_str(query);
				}
				if let Some(fragment) = url.fragment() {
					out.push('#');
					out.push_str(fragment);
				}
				out
			}
		}
	}
}
