// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Flat property maps carried by events and log entries.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A flat map of string keys to JSON values.
///
/// Values are expected to be scalars or null; nested values are passed
/// through untouched.
///
/// # Example
///
/// ```
/// use tally_core::Properties;
///
/// let props = Properties::new()
///     .insert("button_name", "checkout")
///     .insert("page", "/cart")
///     .insert("price", 99.99)
///     .insert("is_premium", true);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties {
	inner: Map<String, Value>,
}

impl Properties {
	/// Creates a new empty property map.
	pub fn new() -> Self {
		Self { inner: Map::new() }
	}

	/// Inserts a key-value pair (builder pattern).
	pub fn insert<K, V>(mut self, key: K, value: V) -> Self
	where
		K: Into<String>,
		V: Into<Value>,
	{
		self.inner.insert(key.into(), value.into());
		self
	}

	/// Inserts a key-value pair in place, returning the previous value.
	pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
		self.inner.insert(key.into(), value.into())
	}

	/// Removes a key, returning its value.
	pub fn remove(&mut self, key: &str) -> Option<Value> {
		self.inner.remove(key)
	}

	/// Merges another map into this one.
	///
	/// If both contain the same key, the value from `other` takes precedence.
	pub fn merge(mut self, other: Properties) -> Self {
		for (k, v) in other.inner {
			self.inner.insert(k, v);
		}
		self
	}

	/// Builds the property map of an outgoing event.
	///
	/// `base` (super-properties) is applied first and `overrides` (the
	/// event's own properties) second, so on a key collision the event wins.
	pub fn layered(base: &Properties, overrides: Properties) -> Self {
		base.clone().merge(overrides)
	}

	/// Returns true if the map is empty.
	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}

	/// Returns the number of entries.
	pub fn len(&self) -> usize {
		self.inner.len()
	}

	/// Gets a value by key.
	pub fn get(&self, key: &str) -> Option<&Value> {
		self.inner.get(key)
	}

	/// Returns true if the key is present.
	pub fn contains_key(&self, key: &str) -> bool {
		self.inner.contains_key(key)
	}

	/// Iterates over the entries in ascending key order.
	pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
		self.inner.iter()
	}

	/// Iterates mutably over the entries.
	pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Value)> {
		self.inner.iter_mut()
	}

	/// Converts the properties into a `serde_json::Value`.
	pub fn into_value(self) -> Value {
		Value::Object(self.inner)
	}
}

impl From<Properties> for Value {
	fn from(props: Properties) -> Self {
		props.into_value()
	}
}

impl From<Value> for Properties {
	fn from(value: Value) -> Self {
		match value {
			Value::Object(map) => Self { inner: map },
			_ => Self::new(),
		}
	}
}

impl From<Map<String, Value>> for Properties {
	fn from(map: Map<String, Value>) -> Self {
		Self { inner: map }
	}
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Properties {
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		Self {
			inner: iter
				.into_iter()
				.map(|(k, v)| (k.into(), v.into()))
				.collect(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn test_iter_visits_keys_in_order() {
		let props = Properties::new().insert("zeta", 1).insert("alpha", 2).insert("mid", 3);
		let keys: Vec<&str> = props.iter().map(|(k, _)| k.as_str()).collect();
		assert_eq!(keys, vec!["alpha", "mid", "zeta"]);
	}

	#[test]
	fn test_properties_new_is_empty() {
		let props = Properties::new();
		assert!(props.is_empty());
		assert_eq!(props.len(), 0);
	}

	#[test]
	fn test_properties_insert_mixed() {
		let props = Properties::new()
			.insert("name", "Bob")
			.insert("age", 30)
			.insert("active", true)
			.insert("missing", Value::Null);

		assert_eq!(props.len(), 4);
		assert_eq!(props.get("name"), Some(&Value::String("Bob".to_string())));
		assert_eq!(props.get("age"), Some(&Value::Number(30.into())));
		assert_eq!(props.get("active"), Some(&Value::Bool(true)));
		assert_eq!(props.get("missing"), Some(&Value::Null));
	}

	#[test]
	fn test_properties_set_and_remove() {
		let mut props = Properties::new();
		assert_eq!(props.set("a", 1), None);
		assert_eq!(props.set("a", 2), Some(Value::Number(1.into())));
		assert_eq!(props.remove("a"), Some(Value::Number(2.into())));
		assert!(!props.contains_key("a"));
	}

	#[test]
	fn test_properties_merge() {
		let props1 = Properties::new().insert("a", 1).insert("b", 2);
		let props2 = Properties::new().insert("b", 20).insert("c", 3);

		let merged = props1.merge(props2);

		assert_eq!(merged.len(), 3);
		assert_eq!(merged.get("a"), Some(&Value::Number(1.into())));
		assert_eq!(merged.get("b"), Some(&Value::Number(20.into())));
		assert_eq!(merged.get("c"), Some(&Value::Number(3.into())));
	}

	#[test]
	fn test_layered_event_wins() {
		let supers = Properties::new().insert("env", "prod").insert("app", "web");
		let event = Properties::new().insert("env", "staging");

		let layered = Properties::layered(&supers, event);

		assert_eq!(layered.get("env"), Some(&Value::String("staging".into())));
		assert_eq!(layered.get("app"), Some(&Value::String("web".into())));
		// base untouched
		assert_eq!(supers.get("env"), Some(&Value::String("prod".into())));
	}

	#[test]
	fn test_properties_serialize_as_plain_object() {
		let props = Properties::new().insert("x", 1);
		assert_eq!(serde_json::to_string(&props).unwrap(), r#"{"x":1}"#);
	}

	#[test]
	fn test_properties_from_non_object_value() {
		let props = Properties::from(Value::String("not an object".to_string()));
		assert!(props.is_empty());
	}

	#[test]
	fn test_properties_from_iter() {
		let props: Properties = [("a", 1), ("b", 2)].into_iter().collect();
		assert_eq!(props.len(), 2);
	}

	proptest! {
		#[test]
		fn properties_len_matches_insertions(keys in proptest::collection::vec("[a-z]{1,10}", 0..20)) {
			let unique_keys: std::collections::HashSet<_> = keys.iter().cloned().collect();
			let mut props = Properties::new();
			for key in &keys {
				props = props.insert(key.clone(), "value");
			}
			prop_assert_eq!(props.len(), unique_keys.len());
		}

		#[test]
		fn layered_prefers_override(key in "[a-z]{1,12}", base in "[a-z]{1,8}", over in "[A-Z]{1,8}") {
			let supers = Properties::new().insert(key.clone(), base);
			let layered = Properties::layered(&supers, Properties::new().insert(key.clone(), over.clone()));
			prop_assert_eq!(layered.get(&key), Some(&Value::String(over)));
		}
	}
}
