// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Device and user identity.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::storage::Storage;

pub(crate) const DEVICE_ID_KEY: &str = "tally_device_id";
pub(crate) const USER_ID_KEY: &str = "tally_user_id";

/// Source of device and session identifiers.
pub trait IdGenerator: Send + Sync {
	fn generate(&self) -> String;
}

/// Random UUIDv4 identifiers in simple (unhyphenated) form.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
	fn generate(&self) -> String {
		Uuid::new_v4().simple().to_string()
	}
}

/// Device id (stable across restarts when storage persists) and the
/// optional identified user.
pub(crate) struct Identity {
	storage: Arc<dyn Storage>,
	ids: Arc<dyn IdGenerator>,
	device_id: String,
	user_id: RwLock<Option<String>>,
}

impl Identity {
	/// Reads persisted identity, generating and storing a device id on first
	/// use.
	pub(crate) fn load(storage: Arc<dyn Storage>, ids: Arc<dyn IdGenerator>) -> Self {
		let device_id = match storage.get(DEVICE_ID_KEY) {
			Ok(Some(id)) if !id.is_empty() => id,
			stored => {
				if let Err(e) = &stored {
					warn!(error = %e, "Failed to read device id, generating a new one");
				}
				let id = ids.generate();
				if let Err(e) = storage.set(DEVICE_ID_KEY, &id) {
					warn!(error = %e, "Failed to persist device id");
				}
				debug!(device_id = %id, "Generated device id");
				id
			}
		};

		let user_id = match storage.get(USER_ID_KEY) {
			Ok(user_id) => user_id.filter(|id| !id.is_empty()),
			Err(e) => {
				warn!(error = %e, "Failed to read user id");
				None
			}
		};

		Self {
			storage,
			ids,
			device_id,
			user_id: RwLock::new(user_id),
		}
	}

	pub(crate) fn device_id(&self) -> &str {
		&self.device_id
	}

	pub(crate) fn user_id(&self) -> Option<String> {
		self.user_id.read().clone()
	}

	pub(crate) fn set_user_id(&self, user_id: &str) {
		*self.user_id.write() = Some(user_id.to_string());
		if let Err(e) = self.storage.set(USER_ID_KEY, user_id) {
			warn!(error = %e, "Failed to persist user id");
		}
	}

	pub(crate) fn clear_user_id(&self) {
		self.user_id.write().take();
		if let Err(e) = self.storage.remove(USER_ID_KEY) {
			warn!(error = %e, "Failed to remove persisted user id");
		}
	}

	pub(crate) fn generate_id(&self) -> String {
		self.ids.generate()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::storage::MemoryStorage;
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct Sequential(AtomicUsize);

	impl IdGenerator for Sequential {
		fn generate(&self) -> String {
			format!("id-{}", self.0.fetch_add(1, Ordering::SeqCst))
		}
	}

	#[test]
	fn test_uuid_generator_is_simple_hex() {
		let id = UuidGenerator.generate();
		assert_eq!(id.len(), 32);
		assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
		assert_ne!(id, UuidGenerator.generate());
	}

	#[test]
	fn test_device_id_generated_once_and_persisted() {
		let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
		let ids = Arc::new(Sequential(AtomicUsize::new(0)));

		let first = Identity::load(storage.clone(), ids.clone());
		assert_eq!(first.device_id(), "id-0");
		assert_eq!(storage.get(DEVICE_ID_KEY).unwrap().as_deref(), Some("id-0"));

		let second = Identity::load(storage, ids);
		assert_eq!(second.device_id(), "id-0");
	}

	#[test]
	fn test_user_id_persists_and_clears() {
		let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
		let identity = Identity::load(storage.clone(), Arc::new(UuidGenerator));
		assert_eq!(identity.user_id(), None);

		identity.set_user_id("user-42");
		let reloaded = Identity::load(storage.clone(), Arc::new(UuidGenerator));
		assert_eq!(reloaded.user_id().as_deref(), Some("user-42"));

		reloaded.clear_user_id();
		assert_eq!(reloaded.user_id(), None);
		assert_eq!(storage.get(USER_ID_KEY).unwrap(), None);
	}
}
