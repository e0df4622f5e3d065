//! Thread-safe in-memory [`StorageCapability`] implementation for local development and tests.

// self
use crate::{_prelude::*, error::StorageError, platform::StorageCapability};

type PartitionMap = Arc<RwLock<HashMap<String, String>>>;

/// Storage backend that keeps serialized records in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage(PartitionMap);
impl MemoryStorage {
	/// Number of records currently stored.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when the partition holds no records.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl StorageCapability for MemoryStorage {
	fn get(&self, key: &str) -> Option<String> {
		self.0.read().get(key).cloned()
	}

	fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
		self.0.write().insert(key.to_owned(), value.to_owned());

		Ok(())
	}

	fn remove(&self, key: &str) -> Result<(), StorageError> {
		self.0.write().remove(key);

		Ok(())
	}

	fn keys(&self) -> Vec<String> {
		self.0.read().keys().cloned().collect()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn memory_storage_round_trips_records() {
		let storage = MemoryStorage::default();

		storage.set("a-key", "{\"v\":1}").expect("Memory set should succeed.");

		assert_eq!(storage.get("a-key").as_deref(), Some("{\"v\":1}"));
		assert_eq!(storage.keys(), vec!["a-key".to_string()]);

		storage.remove("a-key").expect("Memory remove should succeed.");

		assert!(storage.is_empty());
	}
}
