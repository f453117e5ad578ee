//! Persistence gateway for the process lifecycle system.
//!
//! The state machine never touches storage directly. Every read, status
//! commit, field update and background hand-off goes through a
//! [`PersistenceGateway`]. Two interchangeable implementations exist: a
//! durable store keyed by project, and an ephemeral store scoped to the
//! caller's session that expires when idle.

use async_trait::async_trait;
use lifecycle_storage::{StorageError, StorageService};
use lifecycle_types::{
	ImplementationRegistry, JobQueue, Process, ProcessStatus, Project, Session, UpdateType,
};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod durable;
	pub mod session;
}

mod mutations;
mod store;

/// Errors that can occur during gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
	#[error("Project not found: {0}")]
	ProjectNotFound(String),
	#[error("Process not found: {0}")]
	ProcessNotFound(String),
	#[error("Project already exists: {0}")]
	ProjectExists(String),
	/// A status commit found a different status than the one it expected.
	#[error("Status conflict on {process_id}: expected {expected}, found {found}")]
	Conflict {
		process_id: String,
		expected: ProcessStatus,
		found: ProcessStatus,
	},
	#[error("Invalid update: {0}")]
	InvalidUpdate(String),
	#[error("Precondition failed: {0}")]
	Precondition(String),
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Job queue error: {0}")]
	Queue(String),
}

impl From<StorageError> for GatewayError {
	fn from(err: StorageError) -> Self {
		GatewayError::Storage(err.to_string())
	}
}

/// A field write carried by a [`StatusCommit`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldChange {
	/// Same as [`PersistenceGateway::update_process`].
	Set(UpdateType, Value),
	/// Same as [`PersistenceGateway::delete_from_process`].
	Remove(UpdateType, Value),
}

/// A status change together with the status it was computed from.
///
/// Field changes attached to the commit are written in the same locked
/// write as the status, and only when the status check passes.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusCommit {
	pub project_id: String,
	pub process_id: String,
	/// Status the caller observed; the commit fails if it changed meanwhile.
	pub from: ProcessStatus,
	pub to: ProcessStatus,
	pub changes: Vec<FieldChange>,
}

impl StatusCommit {
	pub fn new(process: &Process, to: ProcessStatus) -> Self {
		Self::expecting(&process.project_id, &process.id, process.status, to)
	}

	/// A commit that only applies while the process is still at `from`.
	pub fn expecting(project_id: &str, process_id: &str, from: ProcessStatus, to: ProcessStatus) -> Self {
		Self {
			project_id: project_id.to_string(),
			process_id: process_id.to_string(),
			from,
			to,
			changes: Vec::new(),
		}
	}

	pub fn with_change(mut self, change: FieldChange) -> Self {
		self.changes.push(change);
		self
	}
}

/// Contract between the state machine and persistence.
///
/// Writes to one project are serialized; status commits are compare-and-set
/// on the expected current status.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
	/// Name of the implementation, as used in configuration.
	fn name(&self) -> &'static str;

	/// Stores a new project. Used by the external creation flow.
	async fn create_project(&self, session: &Session, project: Project)
		-> Result<(), GatewayError>;

	async fn get_project(&self, session: &Session, project_id: &str)
		-> Result<Project, GatewayError>;

	async fn get_process(
		&self,
		session: &Session,
		project_id: &str,
		process_id: &str,
	) -> Result<Process, GatewayError>;

	/// Commits a new status and its field changes, returning the updated
	/// process. Fails with [`GatewayError::Conflict`] without writing when
	/// the stored status is not `commit.from`.
	async fn update_process_status(
		&self,
		session: &Session,
		commit: &StatusCommit,
		actor: &str,
	) -> Result<Process, GatewayError>;

	/// Sets or merges the field named by `update`.
	///
	/// `processStatus` is refused; status only changes through
	/// [`PersistenceGateway::update_process_status`].
	async fn update_process(
		&self,
		session: &Session,
		project_id: &str,
		process_id: &str,
		update: UpdateType,
		value: Value,
		actor: &str,
	) -> Result<Process, GatewayError>;

	/// Removes entries from the field named by `update`.
	async fn delete_from_process(
		&self,
		session: &Session,
		project_id: &str,
		process_id: &str,
		update: UpdateType,
		value: Value,
		actor: &str,
	) -> Result<Process, GatewayError>;

	/// Removes a process and every dependency link pointing at it. Returns
	/// the removed record.
	async fn delete_process(
		&self,
		session: &Session,
		project_id: &str,
		process_id: &str,
		actor: &str,
	) -> Result<Process, GatewayError>;

	/// Enqueues verification of a process that has entered VERIFYING.
	async fn verify_process(
		&self,
		session: &Session,
		process: &Process,
		actor: &str,
		then_request: bool,
	) -> Result<(), GatewayError>;

	/// Assigns the provisional contractor and commits `commit` in one write,
	/// then enqueues file migration and notification mails. Nothing is
	/// enqueued when the write fails. Returns the committed process.
	async fn send_process(
		&self,
		session: &Session,
		commit: &StatusCommit,
		actor: &str,
	) -> Result<Process, GatewayError>;

	fn get_current_user_id(&self, session: &Session) -> Option<String>;

	/// Drops expired records; zero for stores without expiry.
	async fn cleanup_expired(&self) -> Result<usize, GatewayError>;
}

/// Settings shared by gateway factories.
#[derive(Debug, Clone)]
pub struct GatewayOptions {
	/// Idle lifetime of session-scoped data.
	pub session_ttl: Duration,
}

impl Default for GatewayOptions {
	fn default() -> Self {
		Self {
			session_ttl: Duration::from_secs(3600),
		}
	}
}

/// Type alias for gateway factory functions.
pub type GatewayFactory =
	fn(StorageService, JobQueue, &GatewayOptions) -> Box<dyn PersistenceGateway>;

/// Registry trait for gateway implementations.
pub trait GatewayRegistry: ImplementationRegistry<Factory = GatewayFactory> {}

/// Get all registered gateway implementations.
pub fn get_all_implementations() -> Vec<(&'static str, GatewayFactory)> {
	use implementations::{durable, session};

	vec![
		(durable::Registry::NAME, durable::Registry::factory()),
		(session::Registry::NAME, session::Registry::factory()),
	]
}
