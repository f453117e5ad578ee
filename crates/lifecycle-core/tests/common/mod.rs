//! Shared fixtures for the lifecycle integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use lifecycle_core::handlers::{JobHandlers, MailHandler, MigrationHandler, RetryPolicy, VerificationHandler};
use lifecycle_core::{EventBus, StateTable, TaskRunner, TransitionEngine};
use lifecycle_gateway::implementations::{durable::DurableGateway, session::SessionGateway};
use lifecycle_gateway::{GatewayError, PersistenceGateway, StatusCommit};
use lifecycle_outbound::implementations::files::memory::MemoryFileTransfer;
use lifecycle_outbound::implementations::mail::memory::MemoryMailer;
use lifecycle_services::{ServiceCatalog, ServiceError, ServiceInterface, ValidationResults};
use lifecycle_storage::implementations::memory::MemoryStorage;
use lifecycle_storage::StorageService;
use lifecycle_types::{
	ConfigSchema, FileLocation, JobQueue, Process, ProcessFile, ProcessStatus, Project, Session,
	UpdateType, PROVISIONAL_CONTRACTOR_KEY,
};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const PROJECT: &str = "proj-1";
pub const CLIENT: &str = "alice";
pub const CONTRACTOR: &str = "fab-lab";

/// Which gateway implementation backs a harness.
#[derive(Debug, Clone, Copy)]
pub enum GatewayKind {
	Durable,
	Session,
}

pub struct Harness {
	pub engine: Arc<TransitionEngine>,
	pub runner: TaskRunner,
	pub mailer: MemoryMailer,
	pub transfer: MemoryFileTransfer,
	pub session: Session,
}

impl Harness {
	pub fn new(kind: GatewayKind) -> Self {
		Self::with_services(kind, additive_catalog())
	}

	pub fn with_services(kind: GatewayKind, services: ServiceCatalog) -> Self {
		Self::build(kind, services, None)
	}

	/// A harness whose gateway misbehaves as described by `fault`.
	pub fn with_fault(kind: GatewayKind, fault: Fault) -> Self {
		Self::build(kind, additive_catalog(), Some(fault))
	}

	fn build(kind: GatewayKind, services: ServiceCatalog, fault: Option<Fault>) -> Self {
		let (jobs, receiver) = JobQueue::new();
		let event_bus = EventBus::new(256);
		let storage = StorageService::new(Box::new(MemoryStorage::new()));
		let mut gateway: Arc<dyn PersistenceGateway> = match kind {
			GatewayKind::Durable => Arc::new(DurableGateway::new(storage, jobs.clone())),
			GatewayKind::Session => Arc::new(SessionGateway::new(
				storage,
				jobs.clone(),
				Duration::from_secs(600),
			)),
		};
		if let Some(fault) = fault {
			gateway = Arc::new(FaultyGateway {
				inner: gateway,
				fault,
			});
		}

		let engine = Arc::new(TransitionEngine::new(
			gateway.clone(),
			Arc::new(StateTable::standard()),
			Arc::new(services),
			jobs.clone(),
			event_bus.clone(),
		));

		let mailer = MemoryMailer::new();
		let transfer = MemoryFileTransfer::new("remote");
		let policy = RetryPolicy {
			initial_interval: Duration::from_millis(1),
			max_elapsed: Duration::from_millis(20),
		};
		let handlers = JobHandlers::new(
			engine.clone(),
			VerificationHandler::new(engine.clone(), jobs, Duration::from_secs(2)),
			MigrationHandler::new(gateway, Arc::new(transfer.clone()), policy, event_bus.clone()),
			MailHandler::new(Arc::new(mailer.clone()), policy, event_bus),
		);
		let runner = TaskRunner::new(receiver, Arc::new(handlers), 4);

		Self {
			engine,
			runner,
			mailer,
			transfer,
			session: Session::authenticated("session-1", CLIENT),
		}
	}

	pub fn gateway(&self) -> &Arc<dyn PersistenceGateway> {
		self.engine.gateway()
	}

	pub async fn seed(&self, processes: Vec<Process>) {
		let project = processes
			.into_iter()
			.fold(Project::new(PROJECT, CLIENT), |project, process| {
				project.with_process(process)
			});
		self.gateway()
			.create_project(&self.session, project)
			.await
			.unwrap();
	}

	pub async fn process(&self, process_id: &str) -> Process {
		self.gateway()
			.get_process(&self.session, PROJECT, process_id)
			.await
			.unwrap()
	}

	pub async fn status(&self, process_id: &str) -> ProcessStatus {
		self.process(process_id).await.status
	}
}

pub fn additive_catalog() -> ServiceCatalog {
	let configs: HashMap<String, toml::Value> = toml::from_str("[additive]\n").unwrap();
	let factories = lifecycle_services::get_all_implementations()
		.into_iter()
		.map(|(name, factory)| (name.to_string(), factory))
		.collect();
	ServiceCatalog::from_config(&configs, &factories).unwrap()
}

/// A draft without a service.
pub fn draft(id: &str) -> Process {
	Process::new(id, PROJECT, CLIENT)
}

/// A process at `status` with the given service definition.
pub fn process_at(id: &str, status: ProcessStatus) -> Process {
	let mut process = draft(id);
	process.status = status;
	process
}

/// Complete additive definition, one local file and a selected contractor.
pub fn ready_for_verification(id: &str) -> Process {
	let mut process = process_at(id, ProcessStatus::ContractorSelected);
	process.service_type = "additive".into();
	process.service_details = ready_details();
	process.files.push(ProcessFile {
		id: format!("{}-model", id),
		file_name: "bracket.stl".into(),
		location: FileLocation::Local,
		path: format!("uploads/{}/bracket.stl", id),
	});
	process
		.process_details
		.insert(PROVISIONAL_CONTRACTOR_KEY.into(), json!(CONTRACTOR));
	process
}

pub fn ready_details() -> Map<String, Value> {
	match json!({"material": "PLA", "quantity": 4}) {
		Value::Object(map) => map,
		_ => unreachable!(),
	}
}

/// Additive plugin whose validation takes a while.
pub struct SlowService {
	inner: Box<dyn ServiceInterface>,
	delay: Duration,
}

impl SlowService {
	pub fn catalog(delay: Duration) -> ServiceCatalog {
		let inner = lifecycle_services::implementations::additive::create_service(
			&toml::Value::Table(Default::default()),
		)
		.unwrap();
		let mut services: HashMap<String, Box<dyn ServiceInterface>> = HashMap::new();
		services.insert("additive".into(), Box::new(SlowService { inner, delay }));
		ServiceCatalog::new(services)
	}
}

#[async_trait]
impl ServiceInterface for SlowService {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		self.inner.config_schema()
	}

	fn service_ready(&self, details: &Map<String, Value>) -> bool {
		self.inner.service_ready(details)
	}

	async fn validate(&self, process: &Process) -> Result<ValidationResults, ServiceError> {
		tokio::time::sleep(self.delay).await;
		self.inner.validate(process).await
	}
}

/// Misbehaviour injected by [`FaultyGateway`].
#[derive(Debug, Clone, Copy)]
pub enum Fault {
	/// Commits to this status fail with a storage error before anything is written.
	FailCommitTo(ProcessStatus),
	/// Verification jobs cannot be queued.
	FailVerify,
	/// Another writer moves the process to `to` just before a commit to
	/// `before` is applied.
	MoveFirst {
		before: ProcessStatus,
		to: ProcessStatus,
	},
}

/// Gateway wrapper that injects a [`Fault`] into status commits.
pub struct FaultyGateway {
	inner: Arc<dyn PersistenceGateway>,
	fault: Fault,
}

impl FaultyGateway {
	async fn intercept(&self, session: &Session, commit: &StatusCommit) -> Result<(), GatewayError> {
		match self.fault {
			Fault::FailCommitTo(status) if commit.to == status => {
				Err(GatewayError::Storage("disk full".into()))
			}
			Fault::MoveFirst { before, to } if commit.to == before => {
				let current = self
					.inner
					.get_process(session, &commit.project_id, &commit.process_id)
					.await?;
				self.inner
					.update_process_status(session, &StatusCommit::new(&current, to), "other-tab")
					.await?;
				Ok(())
			}
			_ => Ok(()),
		}
	}
}

#[async_trait]
impl PersistenceGateway for FaultyGateway {
	fn name(&self) -> &'static str {
		"faulty"
	}

	async fn create_project(&self, session: &Session, project: Project) -> Result<(), GatewayError> {
		self.inner.create_project(session, project).await
	}

	async fn get_project(&self, session: &Session, project_id: &str) -> Result<Project, GatewayError> {
		self.inner.get_project(session, project_id).await
	}

	async fn get_process(
		&self,
		session: &Session,
		project_id: &str,
		process_id: &str,
	) -> Result<Process, GatewayError> {
		self.inner.get_process(session, project_id, process_id).await
	}

	async fn update_process_status(
		&self,
		session: &Session,
		commit: &StatusCommit,
		actor: &str,
	) -> Result<Process, GatewayError> {
		self.intercept(session, commit).await?;
		self.inner.update_process_status(session, commit, actor).await
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
		self.inner
			.update_process(session, project_id, process_id, update, value, actor)
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
		self.inner
			.delete_from_process(session, project_id, process_id, update, value, actor)
			.await
	}

	async fn delete_process(
		&self,
		session: &Session,
		project_id: &str,
		process_id: &str,
		actor: &str,
	) -> Result<Process, GatewayError> {
		self.inner
			.delete_process(session, project_id, process_id, actor)
			.await
	}

	async fn verify_process(
		&self,
		session: &Session,
		process: &Process,
		actor: &str,
		then_request: bool,
	) -> Result<(), GatewayError> {
		if let Fault::FailVerify = self.fault {
			return Err(GatewayError::Queue("job queue closed".into()));
		}
		self.inner
			.verify_process(session, process, actor, then_request)
			.await
	}

	async fn send_process(
		&self,
		session: &Session,
		commit: &StatusCommit,
		actor: &str,
	) -> Result<Process, GatewayError> {
		self.intercept(session, commit).await?;
		self.inner.send_process(session, commit, actor).await
	}

	fn get_current_user_id(&self, session: &Session) -> Option<String> {
		self.inner.get_current_user_id(session)
	}

	async fn cleanup_expired(&self) -> Result<usize, GatewayError> {
		self.inner.cleanup_expired().await
	}
}
