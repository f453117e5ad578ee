//! File migration handler.
//!
//! Moves one local file of a sent process to remote storage and records the
//! new location on the process. Status is never touched.

use super::{classify, HandlerError, RetryPolicy};
use crate::engine::event_bus::EventBus;
use lifecycle_gateway::PersistenceGateway;
use lifecycle_outbound::FileTransferInterface;
use lifecycle_types::{
	truncate_id, FileLocation, LifecycleEvent, ProcessFile, Session, TaskEvent, UpdateType,
};
use std::sync::Arc;
use tracing::instrument;

/// Actor recorded for writes made by migration jobs.
const MIGRATION_ACTOR: &str = "file-migration";

pub struct MigrationHandler {
	gateway: Arc<dyn PersistenceGateway>,
	transfer: Arc<dyn FileTransferInterface>,
	policy: RetryPolicy,
	event_bus: EventBus,
}

impl MigrationHandler {
	pub fn new(
		gateway: Arc<dyn PersistenceGateway>,
		transfer: Arc<dyn FileTransferInterface>,
		policy: RetryPolicy,
		event_bus: EventBus,
	) -> Self {
		Self {
			gateway,
			transfer,
			policy,
			event_bus,
		}
	}

	#[instrument(skip_all, fields(process_id = %truncate_id(process_id), file_id = %file_id))]
	pub async fn migrate(
		&self,
		session: &Session,
		project_id: &str,
		process_id: &str,
		file_id: &str,
	) -> Result<(), HandlerError> {
		let process = self
			.gateway
			.get_process(session, project_id, process_id)
			.await?;
		let Some(file) = process.files.iter().find(|f| f.id == file_id).cloned() else {
			tracing::debug!("File no longer attached, skipping");
			return Ok(());
		};
		if file.location == FileLocation::Remote {
			tracing::debug!("File already remote, skipping");
			return Ok(());
		}

		let pending = &file;
		let remote_path = backoff::future::retry(self.policy.backoff(), || async move {
			self.transfer.upload(process_id, pending).await.map_err(classify)
		})
		.await?;

		let migrated = ProcessFile {
			location: FileLocation::Remote,
			path: remote_path.clone(),
			..file
		};
		let value = serde_json::to_value(&migrated)
			.map_err(|e| HandlerError::Serialization(e.to_string()))?;
		self.gateway
			.update_process(
				session,
				project_id,
				process_id,
				UpdateType::Files,
				value,
				MIGRATION_ACTOR,
			)
			.await?;

		tracing::info!(remote_path = %remote_path, "File migrated");
		self.event_bus
			.publish(LifecycleEvent::Task(TaskEvent::FileMigrated {
				process_id: process_id.to_string(),
				file_id: file_id.to_string(),
				remote_path,
			}))
			.ok();
		Ok(())
	}
}
