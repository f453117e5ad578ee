//! Remote file storage simulated in memory.

use crate::{FileTransferFactory, FileTransferInterface, FileTransferRegistry, OutboundError};
use async_trait::async_trait;
use lifecycle_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, ProcessFile, Schema, ValidationError,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory remote store. Clones share one bucket.
#[derive(Clone)]
pub struct MemoryFileTransfer {
	/// Prefix of every remote path, e.g. the target region.
	region: String,
	/// Remote path by file id.
	uploaded: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryFileTransfer {
	pub fn new(region: impl Into<String>) -> Self {
		Self {
			region: region.into(),
			uploaded: Arc::new(RwLock::new(HashMap::new())),
		}
	}

	pub async fn remote_path(&self, file_id: &str) -> Option<String> {
		self.uploaded.read().await.get(file_id).cloned()
	}
}

/// Configuration schema for MemoryFileTransfer.
pub struct MemoryFileTransferSchema;

impl ConfigSchema for MemoryFileTransferSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![Field::new("region", FieldType::String)]).validate(config)
	}
}

#[async_trait]
impl FileTransferInterface for MemoryFileTransfer {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryFileTransferSchema)
	}

	async fn upload(&self, process_id: &str, file: &ProcessFile) -> Result<String, OutboundError> {
		let remote_path = format!("{}/{}/{}", self.region, process_id, file.file_name);
		self.uploaded
			.write()
			.await
			.insert(file.id.clone(), remote_path.clone());
		Ok(remote_path)
	}
}

/// Factory function to create an in-memory file transfer.
///
/// Configuration parameters:
/// - `region`: remote path prefix (default: "remote")
pub fn create_transfer(
	config: &toml::Value,
) -> Result<Box<dyn FileTransferInterface>, OutboundError> {
	MemoryFileTransferSchema
		.validate(config)
		.map_err(|e| OutboundError::InvalidConfig(e.to_string()))?;
	let region = config
		.get("region")
		.and_then(|v| v.as_str())
		.unwrap_or("remote");
	Ok(Box::new(MemoryFileTransfer::new(region)))
}

/// Registry for the memory file transfer implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = FileTransferFactory;

	fn factory() -> Self::Factory {
		create_transfer
	}
}

impl FileTransferRegistry for Registry {}
