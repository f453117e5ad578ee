//! Durable gateway.
//!
//! Projects live in the `projects` namespace keyed by project id and never
//! expire. Any session may reach any project; access control belongs to the
//! caller.

use crate::store::{ProjectStore, RecordKey};
use crate::{
	GatewayError, GatewayFactory, GatewayOptions, GatewayRegistry, PersistenceGateway,
	StatusCommit,
};
use async_trait::async_trait;
use lifecycle_storage::StorageService;
use lifecycle_types::{
	ImplementationRegistry, JobQueue, Process, Project, Session, StorageKey, UpdateType,
};
use serde_json::Value;

pub struct DurableGateway {
	store: ProjectStore,
}

impl DurableGateway {
	pub fn new(storage: StorageService, jobs: JobQueue) -> Self {
		Self {
			store: ProjectStore::new(storage, jobs),
		}
	}

	fn key(project_id: &str) -> RecordKey {
		RecordKey {
			namespace: StorageKey::Projects.as_str(),
			id: project_id.to_string(),
			ttl: None,
		}
	}
}

#[async_trait]
impl PersistenceGateway for DurableGateway {
	fn name(&self) -> &'static str {
		Registry::NAME
	}

	async fn create_project(&self, _session: &Session, project: Project) -> Result<(), GatewayError> {
		self.store.create(&Self::key(&project.id), project).await
	}

	async fn get_project(&self, _session: &Session, project_id: &str) -> Result<Project, GatewayError> {
		self.store.load(&Self::key(project_id), project_id).await
	}

	async fn get_process(
		&self,
		_session: &Session,
		project_id: &str,
		process_id: &str,
	) -> Result<Process, GatewayError> {
		self.store
			.get_process(&Self::key(project_id), project_id, process_id)
			.await
	}

	async fn update_process_status(
		&self,
		_session: &Session,
		commit: &StatusCommit,
		actor: &str,
	) -> Result<Process, GatewayError> {
		self.store
			.commit_status(&Self::key(&commit.project_id), commit, actor)
			.await
	}

	async fn update_process(
		&self,
		_session: &Session,
		project_id: &str,
		process_id: &str,
		update: UpdateType,
		value: Value,
		actor: &str,
	) -> Result<Process, GatewayError> {
		self.store
			.update(&Self::key(project_id), project_id, process_id, update, value, actor)
			.await
	}

	async fn delete_from_process(
		&self,
		_session: &Session,
		project_id: &str,
		process_id: &str,
		update: UpdateType,
		value: Value,
		actor: &str,
	) -> Result<Process, GatewayError> {
		self.store
			.delete_from(&Self::key(project_id), project_id, process_id, update, value, actor)
			.await
	}

	async fn delete_process(
		&self,
		_session: &Session,
		project_id: &str,
		process_id: &str,
		actor: &str,
	) -> Result<Process, GatewayError> {
		self.store
			.delete_process(&Self::key(project_id), project_id, process_id, actor)
			.await
	}

	async fn verify_process(
		&self,
		session: &Session,
		process: &Process,
		actor: &str,
		then_request: bool,
	) -> Result<(), GatewayError> {
		self.store.verify(session, process, actor, then_request)
	}

	async fn send_process(
		&self,
		session: &Session,
		commit: &StatusCommit,
		actor: &str,
	) -> Result<Process, GatewayError> {
		self.store
			.send(&Self::key(&commit.project_id), session, commit, actor)
			.await
	}

	fn get_current_user_id(&self, session: &Session) -> Option<String> {
		session.user_id.clone()
	}

	async fn cleanup_expired(&self) -> Result<usize, GatewayError> {
		self.store.cleanup_expired().await
	}
}

/// Factory function to create a durable gateway.
pub fn create_gateway(
	storage: StorageService,
	jobs: JobQueue,
	_options: &GatewayOptions,
) -> Box<dyn PersistenceGateway> {
	Box::new(DurableGateway::new(storage, jobs))
}

/// Registry for the durable gateway implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "durable";
	type Factory = GatewayFactory;

	fn factory() -> Self::Factory {
		create_gateway
	}
}

impl GatewayRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::FieldChange;
	use lifecycle_storage::implementations::memory::MemoryStorage;
	use lifecycle_types::{BackgroundJob, JobReceiver, ProcessStatus};
	use serde_json::json;
	use std::sync::Arc;

	fn gateway() -> (DurableGateway, JobReceiver) {
		let (jobs, receiver) = JobQueue::new();
		let storage = StorageService::new(Box::new(MemoryStorage::new()));
		(DurableGateway::new(storage, jobs), receiver)
	}

	fn session() -> Session {
		Session::authenticated("s1", "alice")
	}

	async fn seeded() -> (DurableGateway, JobReceiver) {
		let (gateway, receiver) = gateway();
		let project = Project::new("proj", "alice").with_process(Process::new("p1", "proj", "alice"));
		gateway.create_project(&session(), project).await.unwrap();
		(gateway, receiver)
	}

	#[tokio::test]
	async fn test_create_and_read_back() {
		let (gateway, _rx) = seeded().await;
		let process = gateway.get_process(&session(), "proj", "p1").await.unwrap();
		assert_eq!(process.status, ProcessStatus::Draft);

		let again = Project::new("proj", "alice");
		assert!(matches!(
			gateway.create_project(&session(), again).await,
			Err(GatewayError::ProjectExists(_))
		));
		assert!(matches!(
			gateway.get_process(&session(), "proj", "nope").await,
			Err(GatewayError::ProcessNotFound(_))
		));
	}

	#[tokio::test]
	async fn test_status_commit_is_compare_and_set() {
		let (gateway, _rx) = seeded().await;
		let process = gateway.get_process(&session(), "proj", "p1").await.unwrap();

		let commit = StatusCommit::new(&process, ProcessStatus::ServiceInProgress);
		let updated = gateway
			.update_process_status(&session(), &commit, "alice")
			.await
			.unwrap();
		assert_eq!(updated.status, ProcessStatus::ServiceInProgress);

		// Same commit again is stale
		let result = gateway.update_process_status(&session(), &commit, "alice").await;
		assert!(matches!(
			result,
			Err(GatewayError::Conflict { found: ProcessStatus::ServiceInProgress, .. })
		));
	}

	#[tokio::test]
	async fn test_concurrent_commits_do_not_interleave() {
		let (gateway, _rx) = seeded().await;
		let gateway = Arc::new(gateway);
		let process = gateway.get_process(&session(), "proj", "p1").await.unwrap();

		let mut handles = Vec::new();
		for target in [ProcessStatus::ServiceInProgress, ProcessStatus::WaitingForOtherProcess] {
			let gateway = gateway.clone();
			let commit = StatusCommit::new(&process, target);
			handles.push(tokio::spawn(async move {
				gateway.update_process_status(&session(), &commit, "alice").await
			}));
		}

		let mut successes = 0;
		for handle in handles {
			if handle.await.unwrap().is_ok() {
				successes += 1;
			}
		}
		assert_eq!(successes, 1);
	}

	#[tokio::test]
	async fn test_send_assigns_contractor_and_enqueues_jobs() {
		let (gateway, mut rx) = seeded().await;
		let s = session();
		gateway
			.update_process(&s, "proj", "p1", UpdateType::ProvisionalContractor, json!("fab"), "alice")
			.await
			.unwrap();
		gateway
			.update_process(
				&s,
				"proj",
				"p1",
				UpdateType::Files,
				json!([
					{"id": "f1", "fileName": "a.stl", "location": "local", "path": "a.stl"},
					{"id": "f2", "fileName": "b.stl", "location": "remote", "path": "eu/b.stl"}
				]),
				"alice",
			)
			.await
			.unwrap();

		let process = gateway.get_process(&s, "proj", "p1").await.unwrap();
		let premature = StatusCommit::new(&process, ProcessStatus::Requested);
		assert!(matches!(
			gateway.send_process(&s, &premature, "alice").await,
			Err(GatewayError::Precondition(_))
		));

		let commit = StatusCommit::new(&process, ProcessStatus::VerificationCompleted);
		let process = gateway.update_process_status(&s, &commit, "alice").await.unwrap();
		let send = StatusCommit::new(&process, ProcessStatus::Requested);
		let sent = gateway.send_process(&s, &send, "alice").await.unwrap();
		assert_eq!(sent.contractor.as_deref(), Some("fab"));
		assert_eq!(sent.status, ProcessStatus::Requested);

		let mut kinds = Vec::new();
		while let Ok(job) = rx.try_recv() {
			if let BackgroundJob::SendMail { mail } = &job {
				kinds.push(format!("mail:{}", mail.recipient));
			} else {
				kinds.push(job.kind().to_string());
			}
		}
		assert_eq!(kinds, vec!["migrate_file", "mail:fab", "mail:alice"]);
	}

	#[tokio::test]
	async fn test_stale_send_writes_and_enqueues_nothing() {
		let (gateway, mut rx) = seeded().await;
		let s = session();
		gateway
			.update_process(&s, "proj", "p1", UpdateType::ProvisionalContractor, json!("fab"), "alice")
			.await
			.unwrap();
		let process = gateway.get_process(&s, "proj", "p1").await.unwrap();
		let commit = StatusCommit::new(&process, ProcessStatus::VerificationCompleted);
		let verified = gateway.update_process_status(&s, &commit, "alice").await.unwrap();

		// Edited back before the send lands
		let edit = StatusCommit::new(&verified, ProcessStatus::ContractorSelected);
		gateway.update_process_status(&s, &edit, "alice").await.unwrap();

		let send = StatusCommit::new(&verified, ProcessStatus::Requested);
		assert!(matches!(
			gateway.send_process(&s, &send, "alice").await,
			Err(GatewayError::Conflict { found: ProcessStatus::ContractorSelected, .. })
		));
		let stored = gateway.get_process(&s, "proj", "p1").await.unwrap();
		assert_eq!(stored.status, ProcessStatus::ContractorSelected);
		assert!(stored.contractor.is_none());
		assert!(rx.try_recv().is_err());
	}

	#[tokio::test]
	async fn test_commit_writes_changes_only_when_status_matches() {
		let (gateway, _rx) = seeded().await;
		let s = session();
		let details = FieldChange::Set(UpdateType::ProcessDetails, json!({"validationResults": {"files": true}}));

		let stale = StatusCommit::expecting("proj", "p1", ProcessStatus::Verifying, ProcessStatus::VerificationCompleted)
			.with_change(details.clone());
		assert!(matches!(
			gateway.update_process_status(&s, &stale, "alice").await,
			Err(GatewayError::Conflict { found: ProcessStatus::Draft, .. })
		));
		let stored = gateway.get_process(&s, "proj", "p1").await.unwrap();
		assert!(stored.process_details.is_empty());
		assert_eq!(stored.version, 0);

		let commit = StatusCommit::expecting("proj", "p1", ProcessStatus::Draft, ProcessStatus::ServiceInProgress)
			.with_change(details);
		let committed = gateway.update_process_status(&s, &commit, "alice").await.unwrap();
		assert_eq!(committed.status, ProcessStatus::ServiceInProgress);
		assert_eq!(committed.process_details["validationResults"]["files"], json!(true));
	}

	#[tokio::test]
	async fn test_commit_with_invalid_change_is_not_applied() {
		let (gateway, _rx) = seeded().await;
		let s = session();
		let commit = StatusCommit::expecting("proj", "p1", ProcessStatus::Draft, ProcessStatus::ServiceInProgress)
			.with_change(FieldChange::Set(UpdateType::ServiceDetails, json!("not an object")));
		assert!(matches!(
			gateway.update_process_status(&s, &commit, "alice").await,
			Err(GatewayError::InvalidUpdate(_))
		));
		assert_eq!(
			gateway.get_process(&s, "proj", "p1").await.unwrap().status,
			ProcessStatus::Draft
		);
	}

	#[tokio::test]
	async fn test_delete_process() {
		let (gateway, _rx) = seeded().await;
		let removed = gateway.delete_process(&session(), "proj", "p1", "alice").await.unwrap();
		assert_eq!(removed.id, "p1");
		let project = gateway.get_project(&session(), "proj").await.unwrap();
		assert!(project.processes.is_empty());
	}
}
