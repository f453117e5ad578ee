//! File-based storage backend.
//!
//! Each key is one file under the configured directory. Files start with a
//! fixed header carrying the expiry time, and are written through a
//! temporary file plus rename so readers never see a partial record.

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use lifecycle_types::{
	current_timestamp, ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, StorageKey,
	ValidationError,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// Fixed-size record header.
///
/// Layout (16 bytes): magic `PLCF`, version u16 LE, expiry u64 LE in Unix
/// seconds (0 = never), two reserved bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RecordHeader {
	version: u16,
	expires_at: u64,
}

impl RecordHeader {
	const MAGIC: &'static [u8; 4] = b"PLCF";
	const VERSION: u16 = 1;
	const SIZE: usize = 16;

	fn new(ttl: Duration) -> Self {
		let expires_at = if ttl.is_zero() {
			0
		} else {
			current_timestamp().saturating_add(ttl.as_secs().max(1))
		};
		Self {
			version: Self::VERSION,
			expires_at,
		}
	}

	fn encode(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(Self::MAGIC);
		bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
		bytes[6..14].copy_from_slice(&self.expires_at.to_le_bytes());
		bytes
	}

	fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
		if bytes.len() < Self::SIZE || &bytes[0..4] != Self::MAGIC {
			return Err(StorageError::Backend("Missing record header".into()));
		}
		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported record version: {}",
				version
			)));
		}
		let mut expires = [0u8; 8];
		expires.copy_from_slice(&bytes[6..14]);
		Ok(Self {
			version,
			expires_at: u64::from_le_bytes(expires),
		})
	}

	fn is_expired(&self) -> bool {
		self.expires_at != 0 && current_timestamp() >= self.expires_at
	}
}

/// Default expiry per storage namespace, read from `ttl_<namespace>` keys.
#[derive(Debug, Clone, Default)]
pub struct TtlConfig {
	ttls: HashMap<StorageKey, Duration>,
}

impl TtlConfig {
	fn from_config(config: &toml::Value) -> Self {
		let ttls = StorageKey::all()
			.filter_map(|key| {
				config
					.get(format!("ttl_{}", key.as_str()))
					.and_then(|v| v.as_integer())
					.and_then(|secs| u64::try_from(secs).ok())
					.map(|secs| (key, Duration::from_secs(secs)))
			})
			.collect();
		Self { ttls }
	}

	/// TTL for a `namespace:id` key, zero when unset.
	fn for_key(&self, key: &str) -> Duration {
		key.split(':')
			.next()
			.and_then(|namespace| namespace.parse::<StorageKey>().ok())
			.and_then(|namespace| self.ttls.get(&namespace).copied())
			.unwrap_or(Duration::ZERO)
	}
}

/// File-based storage implementation.
pub struct FileStorage {
	base_path: PathBuf,
	ttl_config: TtlConfig,
}

impl FileStorage {
	pub fn new(base_path: PathBuf, ttl_config: TtlConfig) -> Self {
		Self {
			base_path,
			ttl_config,
		}
	}

	/// Maps a key to a filesystem-safe path.
	fn file_path(&self, key: &str) -> PathBuf {
		let safe_key = key.replace(['/', '\\', ':'], "_");
		self.base_path.join(format!("{}.rec", safe_key))
	}

	async fn read_record(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let data = match fs::read(self.file_path(key)).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(StorageError::NotFound)
			}
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};
		let header = RecordHeader::decode(&data)?;
		if header.is_expired() {
			return Err(StorageError::NotFound);
		}
		Ok(data[RecordHeader::SIZE..].to_vec())
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.read_record(key).await
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		fs::create_dir_all(&self.base_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		let ttl = ttl.unwrap_or_else(|| self.ttl_config.for_key(key));
		let mut record = Vec::with_capacity(RecordHeader::SIZE + value.len());
		record.extend_from_slice(&RecordHeader::new(ttl).encode());
		record.extend_from_slice(&value);

		let path = self.file_path(key);
		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, record)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		match fs::remove_file(self.file_path(key)).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		match self.read_record(key).await {
			Ok(_) => Ok(true),
			Err(StorageError::NotFound) => Ok(false),
			Err(e) => Err(e),
		}
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let mut entries = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let mut removed = 0;
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension() != Some(std::ffi::OsStr::new("rec")) {
				continue;
			}
			let expired = match fs::read(&path).await {
				Ok(data) => RecordHeader::decode(&data).is_ok_and(|h| h.is_expired()),
				Err(e) => {
					tracing::debug!("Skipping {:?}: {}", path, e);
					false
				}
			};
			if expired {
				match fs::remove_file(&path).await {
					Ok(()) => removed += 1,
					Err(e) => tracing::warn!("Failed to remove expired record {:?}: {}", path, e),
				}
			}
		}
		Ok(removed)
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let mut optional = vec![Field::new("storage_path", FieldType::String)];
		for key in StorageKey::all() {
			optional.push(Field::new(
				format!("ttl_{}", key.as_str()),
				FieldType::Integer {
					min: Some(0),
					max: None,
				},
			));
		}
		Schema::new(vec![], optional).validate(config)
	}
}

/// Factory function to create a file storage backend.
///
/// Configuration parameters:
/// - `storage_path`: base directory (default: "./data/lifecycle")
/// - `ttl_projects`, `ttl_sessions`: default expiry in seconds (default: 0)
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/lifecycle");

	Ok(Box::new(FileStorage::new(
		PathBuf::from(storage_path),
		TtlConfig::from_config(config),
	)))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}
