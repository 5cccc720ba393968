// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Key-value persistence for identity state.
//!
//! The client only stores a handful of short strings (device id, user id),
//! so the abstraction is a synchronous string map. [`FallbackStorage`] wraps
//! any backend and switches to memory after its first failure so identity
//! keeps working for the rest of the process.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StorageError {
	#[error("storage I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("storage file is corrupt: {0}")]
	Corrupt(#[from] serde_json::Error),

	#[error("storage quota exceeded")]
	QuotaExceeded,
}

/// A synchronous string key-value store.
pub trait Storage: Send + Sync {
	fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
	fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
	fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Process-local storage; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStorage {
	values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}
}

impl Storage for MemoryStorage {
	fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
		Ok(self.values.lock().get(key).cloned())
	}

	fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
		self.values.lock().insert(key.to_string(), value.to_string());
		Ok(())
	}

	fn remove(&self, key: &str) -> Result<(), StorageError> {
		self.values.lock().remove(key);
		Ok(())
	}
}

/// A JSON object on disk, rewritten on every change.
#[derive(Debug)]
pub struct FileStorage {
	path: PathBuf,
	cache: Mutex<Option<HashMap<String, String>>>,
}

impl FileStorage {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			cache: Mutex::new(None),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load(&self) -> Result<HashMap<String, String>, StorageError> {
		match std::fs::read_to_string(&self.path) {
			Ok(content) if content.trim().is_empty() => Ok(HashMap::new()),
			Ok(content) => Ok(serde_json::from_str(&content)?),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
			Err(e) => Err(e.into()),
		}
	}

	fn with_values<R>(
		&self,
		f: impl FnOnce(&mut HashMap<String, String>) -> (R, bool),
	) -> Result<R, StorageError> {
		let mut cache = self.cache.lock();
		if cache.is_none() {
			*cache = Some(self.load()?);
		}
		let values = cache.get_or_insert_with(HashMap::new);

		let (result, dirty) = f(values);
		if dirty {
			if let Some(parent) = self.path.parent() {
				std::fs::create_dir_all(parent)?;
			}
			std::fs::write(&self.path, serde_json::to_string_pretty(values)?)?;
			debug!(path = %self.path.display(), "Persisted storage file");
		}
		Ok(result)
	}
}

impl Storage for FileStorage {
	fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
		self.with_values(|values| (values.get(key).cloned(), false))
	}

	fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
		self.with_values(|values| {
			let changed = values.get(key).map(String::as_str) != Some(value);
			if changed {
				values.insert(key.to_string(), value.to_string());
			}
			((), changed)
		})
	}

	fn remove(&self, key: &str) -> Result<(), StorageError> {
		self.with_values(|values| ((), values.remove(key).is_some()))
	}
}

/// Uses `primary` until it fails once, then memory for the rest of the
/// process. Failures are logged, never returned.
pub struct FallbackStorage {
	primary: Arc<dyn Storage>,
	memory: MemoryStorage,
	degraded: AtomicBool,
}

impl FallbackStorage {
	pub fn new(primary: Arc<dyn Storage>) -> Self {
		Self {
			primary,
			memory: MemoryStorage::new(),
			degraded: AtomicBool::new(false),
		}
	}

	pub fn is_degraded(&self) -> bool {
		self.degraded.load(Ordering::SeqCst)
	}

	fn degrade(&self, op: &'static str, key: &str, err: &StorageError) {
		if !self.degraded.swap(true, Ordering::SeqCst) {
			warn!(op, key, error = %err, "Storage failed, falling back to memory");
		}
	}
}

impl fmt::Debug for FallbackStorage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FallbackStorage")
			.field("degraded", &self.is_degraded())
			.finish_non_exhaustive()
	}
}

impl Storage for FallbackStorage {
	fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
		if !self.is_degraded() {
			match self.primary.get(key) {
				Ok(value) => return Ok(value),
				Err(e) => self.degrade("get", key, &e),
			}
		}
		self.memory.get(key)
	}

	fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
		if !self.is_degraded() {
			match self.primary.set(key, value) {
				Ok(()) => return Ok(()),
				Err(e) => self.degrade("set", key, &e),
			}
		}
		self.memory.set(key, value)
	}

	fn remove(&self, key: &str) -> Result<(), StorageError> {
		if !self.is_degraded() {
			match self.primary.remove(key) {
				Ok(()) => return Ok(()),
				Err(e) => self.degrade("remove", key, &e),
			}
		}
		self.memory.remove(key)
	}
}

/// Where identity state is kept.
#[derive(Clone, Default)]
pub enum PersistenceMode {
	#[default]
	Memory,
	/// A JSON file at the given path.
	File(PathBuf),
	Custom(Arc<dyn Storage>),
}

impl PersistenceMode {
	/// File persistence under the platform data directory
	/// (`~/.local/share/tally/state.json` on Linux).
	///
	/// Falls back to memory when no data directory exists.
	pub fn default_file() -> Self {
		match dirs::data_dir() {
			Some(dir) => PersistenceMode::File(dir.join("tally").join("state.json")),
			None => PersistenceMode::Memory,
		}
	}

	/// Builds the backend, wrapped so that failures degrade to memory.
	pub(crate) fn open(&self) -> Arc<dyn Storage> {
		match self {
			PersistenceMode::Memory => Arc::new(MemoryStorage::new()),
			PersistenceMode::File(path) => {
				Arc::new(FallbackStorage::new(Arc::new(FileStorage::new(path.clone()))))
			}
			PersistenceMode::Custom(storage) => Arc::new(FallbackStorage::new(storage.clone())),
		}
	}
}

impl fmt::Debug for PersistenceMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PersistenceMode::Memory => f.write_str("Memory"),
			PersistenceMode::File(path) => f.debug_tuple("File").field(path).finish(),
			PersistenceMode::Custom(_) => f.write_str("Custom(..)"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct BrokenStorage;

	impl Storage for BrokenStorage {
		fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
			Err(StorageError::QuotaExceeded)
		}
		fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
			Err(StorageError::QuotaExceeded)
		}
		fn remove(&self, _key: &str) -> Result<(), StorageError> {
			Err(StorageError::QuotaExceeded)
		}
	}

	#[test]
	fn test_memory_roundtrip() {
		let storage = MemoryStorage::new();
		assert_eq!(storage.get("k").unwrap(), None);
		storage.set("k", "v").unwrap();
		assert_eq!(storage.get("k").unwrap().as_deref(), Some("v"));
		storage.remove("k").unwrap();
		assert_eq!(storage.get("k").unwrap(), None);
	}

	#[test]
	fn test_file_storage_survives_reopen() {
		let temp_dir = tempfile::tempdir().unwrap();
		let path = temp_dir.path().join("nested").join("state.json");

		FileStorage::new(&path).set("tally_device_id", "abc").unwrap();
		assert!(path.exists());

		let reopened = FileStorage::new(&path);
		assert_eq!(reopened.get("tally_device_id").unwrap().as_deref(), Some("abc"));

		reopened.remove("tally_device_id").unwrap();
		assert_eq!(FileStorage::new(&path).get("tally_device_id").unwrap(), None);
	}

	#[test]
	fn test_corrupt_file_is_an_error() {
		let temp_dir = tempfile::tempdir().unwrap();
		let path = temp_dir.path().join("state.json");
		std::fs::write(&path, "{not json").unwrap();

		let result = FileStorage::new(&path).get("k");
		assert!(matches!(result, Err(StorageError::Corrupt(_))));
	}

	#[test]
	fn test_fallback_switches_to_memory() {
		let storage = FallbackStorage::new(Arc::new(BrokenStorage));
		assert!(!storage.is_degraded());

		storage.set("k", "v").unwrap();
		assert!(storage.is_degraded());
		assert_eq!(storage.get("k").unwrap().as_deref(), Some("v"));
	}

	#[test]
	fn test_fallback_uses_primary_when_healthy() {
		let primary = Arc::new(MemoryStorage::new());
		primary.set("k", "from-primary").unwrap();

		let storage = FallbackStorage::new(primary);
		assert_eq!(storage.get("k").unwrap().as_deref(), Some("from-primary"));
		assert!(!storage.is_degraded());
	}

	#[test]
	fn test_default_file_lives_under_tally_dir() {
		if let PersistenceMode::File(path) = PersistenceMode::default_file() {
			assert!(path.ends_with("tally/state.json"));
		}
	}
}
