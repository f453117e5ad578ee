//! Project records shared by both gateway implementations.
//!
//! Projects are stored whole, one record per project. Every write loads the
//! record under a per-record lock, mutates it and stores it back, so writes
//! to one project never interleave.

use crate::mutations::{self, process_mut, touch};
use crate::{GatewayError, StatusCommit};
use dashmap::DashMap;
use lifecycle_storage::{StorageError, StorageService};
use lifecycle_types::{
	truncate_id, BackgroundJob, JobQueue, Mail, Process, ProcessStatus, Project, Session,
	UpdateType,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Where one project record lives.
#[derive(Debug, Clone)]
pub(crate) struct RecordKey {
	pub namespace: &'static str,
	pub id: String,
	/// Expiry applied on every write.
	pub ttl: Option<Duration>,
}

pub(crate) struct ProjectStore {
	storage: StorageService,
	jobs: JobQueue,
	locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ProjectStore {
	pub fn new(storage: StorageService, jobs: JobQueue) -> Self {
		Self {
			storage,
			jobs,
			locks: DashMap::new(),
		}
	}

	fn lock_for(&self, key: &RecordKey) -> Arc<Mutex<()>> {
		self.locks
			.entry(format!("{}:{}", key.namespace, key.id))
			.or_default()
			.clone()
	}

	pub async fn create(&self, key: &RecordKey, project: Project) -> Result<(), GatewayError> {
		let lock = self.lock_for(key);
		let _guard = lock.lock().await;
		if self.storage.exists(key.namespace, &key.id).await? {
			return Err(GatewayError::ProjectExists(project.id));
		}
		self.storage
			.store_with_ttl(key.namespace, &key.id, &project, key.ttl)
			.await?;
		Ok(())
	}

	pub async fn load(&self, key: &RecordKey, project_id: &str) -> Result<Project, GatewayError> {
		self.storage
			.retrieve(key.namespace, &key.id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => GatewayError::ProjectNotFound(project_id.to_string()),
				other => GatewayError::Storage(other.to_string()),
			})
	}

	pub async fn get_process(
		&self,
		key: &RecordKey,
		project_id: &str,
		process_id: &str,
	) -> Result<Process, GatewayError> {
		self.load(key, project_id)
			.await?
			.processes
			.remove(process_id)
			.ok_or_else(|| GatewayError::ProcessNotFound(process_id.to_string()))
	}

	/// Loads, mutates and stores a project while holding its lock.
	async fn modify<T, F>(&self, key: &RecordKey, project_id: &str, f: F) -> Result<T, GatewayError>
	where
		F: FnOnce(&mut Project) -> Result<T, GatewayError>,
	{
		let lock = self.lock_for(key);
		let _guard = lock.lock().await;
		let mut project = self.load(key, project_id).await?;
		let result = f(&mut project)?;
		project.updated_at = lifecycle_types::current_timestamp();
		self.storage
			.store_with_ttl(key.namespace, &key.id, &project, key.ttl)
			.await?;
		Ok(result)
	}

	pub async fn commit_status(
		&self,
		key: &RecordKey,
		commit: &StatusCommit,
		actor: &str,
	) -> Result<Process, GatewayError> {
		let process = self
			.modify(key, &commit.project_id, |project| {
				apply_commit(project, commit, actor)?;
				Ok(process_mut(project, &commit.process_id)?.clone())
			})
			.await?;

		tracing::info!(
			process_id = %truncate_id(&commit.process_id),
			from = %commit.from,
			to = %commit.to,
			changes = commit.changes.len(),
			actor = %actor,
			"Status committed"
		);
		Ok(process)
	}

	pub async fn update(
		&self,
		key: &RecordKey,
		project_id: &str,
		process_id: &str,
		update: UpdateType,
		value: Value,
		actor: &str,
	) -> Result<Process, GatewayError> {
		let process = self
			.modify(key, project_id, |project| {
				mutations::apply_update(project, process_id, update, value, actor)?;
				Ok(process_mut(project, process_id)?.clone())
			})
			.await?;
		tracing::debug!(process_id = %truncate_id(process_id), update = %update, actor = %actor, "Process updated");
		Ok(process)
	}

	pub async fn delete_from(
		&self,
		key: &RecordKey,
		project_id: &str,
		process_id: &str,
		update: UpdateType,
		value: Value,
		actor: &str,
	) -> Result<Process, GatewayError> {
		let process = self
			.modify(key, project_id, |project| {
				mutations::apply_delete(project, process_id, update, value)?;
				Ok(process_mut(project, process_id)?.clone())
			})
			.await?;
		tracing::debug!(process_id = %truncate_id(process_id), update = %update, actor = %actor, "Removed from process");
		Ok(process)
	}

	pub async fn delete_process(
		&self,
		key: &RecordKey,
		project_id: &str,
		process_id: &str,
		actor: &str,
	) -> Result<Process, GatewayError> {
		let removed = self
			.modify(key, project_id, |project| mutations::remove_process(project, process_id))
			.await?;
		tracing::info!(
			process_id = %truncate_id(process_id),
			dependents = removed.dependencies_out.len(),
			actor = %actor,
			"Process deleted"
		);
		Ok(removed)
	}

	pub fn verify(
		&self,
		session: &Session,
		process: &Process,
		actor: &str,
		then_request: bool,
	) -> Result<(), GatewayError> {
		self.enqueue(BackgroundJob::Verify {
			project_id: process.project_id.clone(),
			process_id: process.id.clone(),
			session: session.clone(),
			actor: actor.to_string(),
			then_request,
		})
	}

	/// Assigns the contractor and commits the status in one write, then
	/// hands file migration and mails to the job queue.
	pub async fn send(
		&self,
		key: &RecordKey,
		session: &Session,
		commit: &StatusCommit,
		actor: &str,
	) -> Result<Process, GatewayError> {
		let sent = self
			.modify(key, &commit.project_id, |project| {
				expect_status(project, commit)?;
				let stored = process_mut(project, &commit.process_id)?;
				if stored.status < ProcessStatus::VerificationCompleted {
					return Err(GatewayError::Precondition(format!(
						"Process {} is {} and has not been verified",
						stored.id, stored.status
					)));
				}
				let contractor = stored
					.provisional_contractor()
					.map(str::to_string)
					.ok_or_else(|| {
						GatewayError::Precondition(format!(
							"Process {} has no selected contractor",
							stored.id
						))
					})?;
				apply_commit(project, commit, actor)?;
				let stored = process_mut(project, &commit.process_id)?;
				stored.contractor = Some(contractor);
				Ok(stored.clone())
			})
			.await?;

		tracing::info!(
			process_id = %truncate_id(&sent.id),
			from = %commit.from,
			to = %commit.to,
			files = sent.local_files().count(),
			actor = %actor,
			"Process sent to contractor"
		);

		// The commit stands; a job that cannot be queued is only reported
		for file in sent.local_files() {
			self.enqueue_logged(BackgroundJob::MigrateFile {
				project_id: sent.project_id.clone(),
				process_id: sent.id.clone(),
				file_id: file.id.clone(),
				session: session.clone(),
			});
		}
		if let Some(contractor) = &sent.contractor {
			self.enqueue_logged(BackgroundJob::SendMail {
				mail: Mail {
					recipient: contractor.clone(),
					subject: "New request".into(),
					body: format!("You have received a request for process {}.", sent.id),
					process_id: sent.id.clone(),
				},
			});
		}
		self.enqueue_logged(BackgroundJob::SendMail {
			mail: Mail {
				recipient: sent.client.clone(),
				subject: "Request sent".into(),
				body: format!("Your request for process {} has been sent.", sent.id),
				process_id: sent.id.clone(),
			},
		});
		Ok(sent)
	}

	pub async fn cleanup_expired(&self) -> Result<usize, GatewayError> {
		Ok(self.storage.cleanup_expired().await?)
	}

	fn enqueue(&self, job: BackgroundJob) -> Result<(), GatewayError> {
		self.jobs
			.enqueue(job)
			.map_err(|e| GatewayError::Queue(e.to_string()))
	}

	fn enqueue_logged(&self, job: BackgroundJob) {
		let kind = job.kind();
		if let Err(e) = self.enqueue(job) {
			tracing::warn!(job = kind, error = %e, "Failed to enqueue job");
		}
	}
}

/// Checks the expected status, applies the commit's field changes and sets
/// the new status. The caller holds the project lock.
fn apply_commit(project: &mut Project, commit: &StatusCommit, actor: &str) -> Result<(), GatewayError> {
	expect_status(project, commit)?;
	for change in &commit.changes {
		mutations::apply_change(project, &commit.process_id, change, actor)?;
	}
	let process = process_mut(project, &commit.process_id)?;
	process.status = commit.to;
	touch(process);
	Ok(())
}

fn expect_status(project: &mut Project, commit: &StatusCommit) -> Result<(), GatewayError> {
	let found = process_mut(project, &commit.process_id)?.status;
	if found != commit.from {
		return Err(GatewayError::Conflict {
			process_id: commit.process_id.clone(),
			expected: commit.from,
			found,
		});
	}
	Ok(())
}
