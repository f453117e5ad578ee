//! In-memory storage backend.
//!
//! Entries live in a map behind a read-write lock. Expiry is honoured on
//! read and swept by `cleanup_expired`, which makes this backend suitable
//! for per-session data that should vanish after inactivity.

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use lifecycle_types::{ConfigSchema, ImplementationRegistry, Schema, ValidationError};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct Entry {
	value: Vec<u8>,
	expires_at: Option<Instant>,
}

impl Entry {
	fn is_expired(&self, now: Instant) -> bool {
		self.expires_at.is_some_and(|at| now >= at)
	}
}

/// In-memory storage implementation.
#[derive(Default)]
pub struct MemoryStorage {
	store: RwLock<HashMap<String, Entry>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let store = self.store.read().await;
		match store.get(key) {
			Some(entry) if !entry.is_expired(Instant::now()) => Ok(entry.value.clone()),
			_ => Err(StorageError::NotFound),
		}
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let expires_at = ttl
			.filter(|ttl| !ttl.is_zero())
			.map(|ttl| Instant::now() + ttl);
		let mut store = self.store.write().await;
		store.insert(key.to_string(), Entry { value, expires_at });
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let store = self.store.read().await;
		Ok(store
			.get(key)
			.is_some_and(|entry| !entry.is_expired(Instant::now())))
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let now = Instant::now();
		let mut store = self.store.write().await;
		let before = store.len();
		store.retain(|_, entry| !entry.is_expired(now));
		Ok(before - store.len())
	}
}

/// Configuration schema for MemoryStorage.
pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create a memory storage backend. No settings.
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	MemoryStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryStorage::new()))
}

/// Registry for the memory storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_basic_operations() {
		let storage = MemoryStorage::new();
		let key = "projects:p1";
		let value = b"payload".to_vec();

		storage.set_bytes(key, value.clone(), None).await.unwrap();
		assert_eq!(storage.get_bytes(key).await.unwrap(), value);
		assert!(storage.exists(key).await.unwrap());

		storage.delete(key).await.unwrap();
		assert!(!storage.exists(key).await.unwrap());
		assert!(matches!(
			storage.get_bytes(key).await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_expired_entries_are_hidden_and_swept() {
		let storage = MemoryStorage::new();
		storage
			.set_bytes("sessions:s1", b"a".to_vec(), Some(Duration::from_millis(10)))
			.await
			.unwrap();
		storage
			.set_bytes("sessions:s2", b"b".to_vec(), None)
			.await
			.unwrap();

		tokio::time::sleep(Duration::from_millis(30)).await;

		assert!(!storage.exists("sessions:s1").await.unwrap());
		assert!(matches!(
			storage.get_bytes("sessions:s1").await,
			Err(StorageError::NotFound)
		));
		assert_eq!(storage.cleanup_expired().await.unwrap(), 1);
		assert!(storage.exists("sessions:s2").await.unwrap());
	}

	#[tokio::test]
	async fn test_zero_ttl_never_expires() {
		let storage = MemoryStorage::new();
		storage
			.set_bytes("projects:p1", b"a".to_vec(), Some(Duration::ZERO))
			.await
			.unwrap();
		assert_eq!(storage.cleanup_expired().await.unwrap(), 0);
		assert!(storage.exists("projects:p1").await.unwrap());
	}
}
