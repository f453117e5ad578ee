//! Remote file storage backed by a directory, e.g. a mounted share.
//!
//! Uploads copy the local file to `<root>/<process>/<file name>`.

use crate::{FileTransferFactory, FileTransferInterface, FileTransferRegistry, OutboundError};
use async_trait::async_trait;
use lifecycle_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, ProcessFile, Schema, ValidationError,
};
use std::path::{Path, PathBuf};
use tokio::fs;

pub struct DirectoryFileTransfer {
	root: PathBuf,
}

impl DirectoryFileTransfer {
	pub fn new(root: PathBuf) -> Self {
		Self { root }
	}
}

/// Configuration schema for DirectoryFileTransfer.
pub struct DirectoryFileTransferSchema;

impl ConfigSchema for DirectoryFileTransferSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![Field::new("root", FieldType::String)], vec![]).validate(config)
	}
}

#[async_trait]
impl FileTransferInterface for DirectoryFileTransfer {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(DirectoryFileTransferSchema)
	}

	async fn upload(&self, process_id: &str, file: &ProcessFile) -> Result<String, OutboundError> {
		let file_name = Path::new(&file.file_name)
			.file_name()
			.ok_or_else(|| OutboundError::Rejected(format!("Invalid file name: {}", file.file_name)))?;
		let target_dir = self.root.join(process_id);
		fs::create_dir_all(&target_dir)
			.await
			.map_err(|e| OutboundError::Delivery(e.to_string()))?;

		let target = target_dir.join(file_name);
		match fs::copy(&file.path, &target).await {
			Ok(_) => Ok(target.to_string_lossy().into_owned()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(OutboundError::Rejected(
				format!("Local file missing: {}", file.path),
			)),
			Err(e) => Err(OutboundError::Delivery(e.to_string())),
		}
	}
}

/// Factory function to create a directory file transfer.
///
/// Configuration parameters:
/// - `root`: directory receiving uploaded files
pub fn create_transfer(
	config: &toml::Value,
) -> Result<Box<dyn FileTransferInterface>, OutboundError> {
	DirectoryFileTransferSchema
		.validate(config)
		.map_err(|e| OutboundError::InvalidConfig(e.to_string()))?;
	let root = config
		.get("root")
		.and_then(|v| v.as_str())
		.ok_or_else(|| OutboundError::InvalidConfig("root is required".into()))?;
	Ok(Box::new(DirectoryFileTransfer::new(PathBuf::from(root))))
}

/// Registry for the directory file transfer implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "directory";
	type Factory = FileTransferFactory;

	fn factory() -> Self::Factory {
		create_transfer
	}
}

impl FileTransferRegistry for Registry {}
