//! Session-scoped gateway.
//!
//! Projects live in the `sessions` namespace under `{session}/{project}`, so
//! each session sees only its own data. Every write refreshes the expiry;
//! a session left idle for longer than the configured lifetime disappears.

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
use std::time::Duration;

pub struct SessionGateway {
	store: ProjectStore,
	ttl: Duration,
}

impl SessionGateway {
	pub fn new(storage: StorageService, jobs: JobQueue, ttl: Duration) -> Self {
		Self {
			store: ProjectStore::new(storage, jobs),
			ttl,
		}
	}

	fn key(&self, session: &Session, project_id: &str) -> RecordKey {
		RecordKey {
			namespace: StorageKey::Sessions.as_str(),
			id: format!("{}/{}", session.id, project_id),
			ttl: Some(self.ttl),
		}
	}
}

#[async_trait]
impl PersistenceGateway for SessionGateway {
	fn name(&self) -> &'static str {
		Registry::NAME
	}

	async fn create_project(&self, session: &Session, project: Project) -> Result<(), GatewayError> {
		let key = self.key(session, &project.id);
		self.store.create(&key, project).await
	}

	async fn get_project(&self, session: &Session, project_id: &str) -> Result<Project, GatewayError> {
		self.store.load(&self.key(session, project_id), project_id).await
	}

	async fn get_process(
		&self,
		session: &Session,
		project_id: &str,
		process_id: &str,
	) -> Result<Process, GatewayError> {
		self.store
			.get_process(&self.key(session, project_id), project_id, process_id)
			.await
	}

	async fn update_process_status(
		&self,
		session: &Session,
		commit: &StatusCommit,
		actor: &str,
	) -> Result<Process, GatewayError> {
		self.store
			.commit_status(&self.key(session, &commit.project_id), commit, actor)
			.await
	}

	async fn update_process(
		&self,
		session: &Session,
		project_id: &str,
		process_id: &str,
		update: UpdateType,
		value: Value,
		actor: &str,
	) -> Result<Process, GatewayError> {
		self.store
			.update(&self.key(session, project_id), project_id, process_id, update, value, actor)
			.await
	}

	async fn delete_from_process(
		&self,
		session: &Session,
		project_id: &str,
		process_id: &str,
		update: UpdateType,
		value: Value,
		actor: &str,
	) -> Result<Process, GatewayError> {
		self.store
			.delete_from(&self.key(session, project_id), project_id, process_id, update, value, actor)
			.await
	}

	async fn delete_process(
		&self,
		session: &Session,
		project_id: &str,
		process_id: &str,
		actor: &str,
	) -> Result<Process, GatewayError> {
		self.store
			.delete_process(&self.key(session, project_id), project_id, process_id, actor)
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
		let key = self.key(session, &commit.project_id);
		self.store.send(&key, session, commit, actor).await
	}

	/// Anonymous sessions have no user; the session itself is the owner.
	fn get_current_user_id(&self, session: &Session) -> Option<String> {
		session.user_id.clone()
	}

	async fn cleanup_expired(&self) -> Result<usize, GatewayError> {
		self.store.cleanup_expired().await
	}
}

/// Factory function to create a session gateway.
pub fn create_gateway(
	storage: StorageService,
	jobs: JobQueue,
	options: &GatewayOptions,
) -> Box<dyn PersistenceGateway> {
	Box::new(SessionGateway::new(storage, jobs, options.session_ttl))
}

/// Registry for the session gateway implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "session";
	type Factory = GatewayFactory;

	fn factory() -> Self::Factory {
		create_gateway
	}
}

impl GatewayRegistry for Registry {}
