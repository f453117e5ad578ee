//! Transition engine driving processes through the state table.
//!
//! The engine is the only component that changes a process's status. It
//! loads the process through the gateway, evaluates the current state's
//! rules and commits the new status against the status the rule was chosen
//! for. Field writes tied to a rule travel inside that commit. Background
//! work is only enqueued after it; the task runner executes it.

pub mod event_bus;
pub mod lifecycle;
pub mod runner;

use crate::state::{
	ButtonDescriptor, ButtonEffect, Edge, Role, StateError, StateMachine, StateTable,
	TransitionContext,
};
use event_bus::EventBus;
use lifecycle_gateway::{FieldChange, GatewayError, PersistenceGateway, StatusCommit};
use lifecycle_services::ServiceCatalog;
use lifecycle_types::{
	truncate_id, BackgroundJob, JobQueue, LifecycleEvent, Process, ProcessStatus, Session,
	TaskEvent, TransitionEvent, UpdateType,
};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Upper bound on consecutive update transitions settled by one event.
const MAX_SETTLE_STEPS: usize = ProcessStatus::ALL.len();

/// Errors returned to callers of the engine.
#[derive(Debug, Error)]
pub enum TransitionError {
	/// Broken status data or state table.
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Gateway error: {0}")]
	Gateway(#[from] GatewayError),
	/// The action was refused; nothing was written.
	#[error("Precondition failed: {0}")]
	Precondition(String),
}

impl From<StateError> for TransitionError {
	fn from(err: StateError) -> Self {
		TransitionError::Config(err.to_string())
	}
}

/// What an event did to a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
	/// No rule matched, or the action is not declared in this state.
	Unchanged(ProcessStatus),
	Transitioned {
		from: ProcessStatus,
		to: ProcessStatus,
	},
	Deleted,
}

impl TransitionOutcome {
	/// Status after the event; `None` once deleted.
	pub fn status(&self) -> Option<ProcessStatus> {
		match self {
			TransitionOutcome::Unchanged(status) => Some(*status),
			TransitionOutcome::Transitioned { to, .. } => Some(*to),
			TransitionOutcome::Deleted => None,
		}
	}
}

/// Dispatches data-changed events and user actions.
pub struct TransitionEngine {
	gateway: Arc<dyn PersistenceGateway>,
	table: Arc<StateTable>,
	services: Arc<ServiceCatalog>,
	jobs: JobQueue,
	event_bus: EventBus,
}

impl TransitionEngine {
	pub fn new(
		gateway: Arc<dyn PersistenceGateway>,
		table: Arc<StateTable>,
		services: Arc<ServiceCatalog>,
		jobs: JobQueue,
		event_bus: EventBus,
	) -> Self {
		Self {
			gateway,
			table,
			services,
			jobs,
			event_bus,
		}
	}

	pub fn gateway(&self) -> &Arc<dyn PersistenceGateway> {
		&self.gateway
	}

	pub fn services(&self) -> &ServiceCatalog {
		&self.services
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	pub fn table(&self) -> &StateTable {
		&self.table
	}

	/// Re-evaluates a process after its data changed.
	///
	/// Update rules are applied until none matches, so a second call without
	/// intervening changes is a no-op. A failing rule leaves the process
	/// where it is.
	#[instrument(skip_all, fields(process_id = %truncate_id(process_id)))]
	pub async fn apply_data_changed_event(
		&self,
		session: &Session,
		project_id: &str,
		process_id: &str,
	) -> Result<TransitionOutcome, TransitionError> {
		let mut project = self.gateway.get_project(session, project_id).await?;
		let mut process = project
			.processes
			.get(process_id)
			.cloned()
			.ok_or_else(|| GatewayError::ProcessNotFound(process_id.to_string()))?;
		let from = process.status;
		let actor = self.actor_for(session);

		for _ in 0..MAX_SETTLE_STEPS {
			let target = {
				let machine = StateMachine::new(&self.table, process.status)?;
				let ctx = TransitionContext {
					process: &process,
					project: &project,
					service_ready: self.services.service_ready(&process),
				};
				match machine.evaluate_update(&ctx) {
					Ok(Some(rule)) => {
						tracing::debug!(rule = rule.name, status = %process.status, "Update rule matched");
						rule.target
					}
					Ok(None) => break,
					Err(e) => {
						tracing::warn!(status = %process.status, error = %e, "Update rule failed, keeping status");
						break;
					}
				}
			};
			let commit = StatusCommit::new(&process, target);
			process = self.commit(session, &commit, &actor).await?;
			project.processes.insert(process.id.clone(), process.clone());
		}

		if process.status == from {
			Ok(TransitionOutcome::Unchanged(from))
		} else {
			Ok(TransitionOutcome::Transitioned {
				from,
				to: process.status,
			})
		}
	}

	/// Handles a button press.
	///
	/// Actions the current state does not declare are ignored. Declared
	/// actions pressed by the wrong party, and guarded actions pressed too
	/// early, are rejected without writing anything.
	#[instrument(skip_all, fields(process_id = %truncate_id(process_id), action = %action))]
	pub async fn apply_user_action(
		&self,
		session: &Session,
		project_id: &str,
		process_id: &str,
		action: &str,
	) -> Result<TransitionOutcome, TransitionError> {
		let process = self
			.gateway
			.get_process(session, project_id, process_id)
			.await?;

		if let Some(guard) = self.table.guard_for(action, process.status) {
			let reason = format!(
				"{} requires {} or later, process is {}",
				action, guard.minimum, process.status
			);
			return Err(self.reject(&process, action, reason));
		}

		let machine = StateMachine::new(&self.table, process.status)?;
		let Some(rule) = machine.button(action) else {
			tracing::debug!(status = %process.status, "Action not declared, ignoring");
			return Ok(TransitionOutcome::Unchanged(process.status));
		};

		let user_id = self.gateway.get_current_user_id(session);
		if !rule.audience.admits(Role::of(&process, user_id.as_deref())) {
			let reason = format!("{} is not available to this user", action);
			return Err(self.reject(&process, action, reason));
		}

		let actor = self.actor_for(session);
		let from = process.status;
		let Some(target) = rule.target else {
			if rule.effect == ButtonEffect::Delete {
				return self.delete(session, project_id, process_id, &actor).await;
			}
			return Ok(TransitionOutcome::Unchanged(from));
		};

		// Every write below is checked against the status the rule was chosen for
		let commit = StatusCommit::new(&process, target);
		let committed = match rule.effect {
			ButtonEffect::Send => {
				let sent = self.gateway.send_process(session, &commit, &actor).await?;
				self.committed(session, &commit, &sent);
				sent
			}
			ButtonEffect::ClearContractor => {
				let commit = commit.with_change(FieldChange::Remove(
					UpdateType::ProvisionalContractor,
					Value::Null,
				));
				self.commit(session, &commit, &actor).await?
			}
			_ => self.commit(session, &commit, &actor).await?,
		};

		match rule.effect {
			ButtonEffect::Verify => self.start_verification(session, &committed, from, &actor, false).await?,
			ButtonEffect::VerifyThenRequest => {
				self.start_verification(session, &committed, from, &actor, true).await?
			}
			_ => {}
		}

		Ok(TransitionOutcome::Transitioned { from, to: target })
	}

	/// Applies a gateway update, then re-evaluates the process.
	pub async fn update_and_evaluate(
		&self,
		session: &Session,
		project_id: &str,
		process_id: &str,
		update: UpdateType,
		value: Value,
	) -> Result<TransitionOutcome, TransitionError> {
		let actor = self.actor_for(session);
		self.gateway
			.update_process(session, project_id, process_id, update, value, &actor)
			.await?;
		self.apply_data_changed_event(session, project_id, process_id)
			.await
	}

	/// Buttons the caller may press on a process right now.
	pub async fn buttons(
		&self,
		session: &Session,
		project_id: &str,
		process_id: &str,
	) -> Result<Vec<ButtonDescriptor>, TransitionError> {
		let process = self
			.gateway
			.get_process(session, project_id, process_id)
			.await?;
		let machine = StateMachine::new(&self.table, process.status)?;
		let user_id = self.gateway.get_current_user_id(session);
		Ok(match Role::of(&process, user_id.as_deref()) {
			Role::Client => machine.buttons(true),
			Role::Contractor => machine.buttons(false),
			Role::Observer => Vec::new(),
		})
	}

	/// Every declared transition as `(source, target, trigger)`.
	pub fn compute_reachability_graph(&self) -> Vec<Edge> {
		self.table.edges()
	}

	/// Commits a status change and announces it.
	///
	/// Entering a terminal status schedules re-evaluation of every process
	/// waiting on this one.
	pub(crate) async fn commit(
		&self,
		session: &Session,
		commit: &StatusCommit,
		actor: &str,
	) -> Result<Process, TransitionError> {
		let committed = self
			.gateway
			.update_process_status(session, commit, actor)
			.await?;
		self.committed(session, commit, &committed);
		Ok(committed)
	}

	fn committed(&self, session: &Session, commit: &StatusCommit, committed: &Process) {
		self.event_bus
			.publish(LifecycleEvent::Transition(TransitionEvent::StatusChanged {
				project_id: committed.project_id.clone(),
				process_id: committed.id.clone(),
				from: commit.from,
				to: commit.to,
			}))
			.ok();

		if commit.to.is_terminal() {
			self.schedule_reevaluation(session, &committed.project_id, &committed.dependencies_out);
		}
	}

	async fn delete(
		&self,
		session: &Session,
		project_id: &str,
		process_id: &str,
		actor: &str,
	) -> Result<TransitionOutcome, TransitionError> {
		let removed = self
			.gateway
			.delete_process(session, project_id, process_id, actor)
			.await?;
		self.event_bus
			.publish(LifecycleEvent::Transition(TransitionEvent::ProcessDeleted {
				project_id: project_id.to_string(),
				process_id: process_id.to_string(),
			}))
			.ok();
		// Former dependents may no longer have anything to wait for
		self.schedule_reevaluation(session, project_id, &removed.dependencies_out);
		Ok(TransitionOutcome::Deleted)
	}

	/// Hands a process that just entered VERIFYING to the job queue. When
	/// that fails the status goes back to `previous`, so the process is not
	/// left waiting for a job that never runs.
	async fn start_verification(
		&self,
		session: &Session,
		verifying: &Process,
		previous: ProcessStatus,
		actor: &str,
		then_request: bool,
	) -> Result<(), TransitionError> {
		let Err(e) = self
			.gateway
			.verify_process(session, verifying, actor, then_request)
			.await
		else {
			return Ok(());
		};

		tracing::error!(error = %e, "Failed to enqueue verification, reverting status");
		self.event_bus
			.publish(LifecycleEvent::Task(TaskEvent::JobFailed {
				job: BackgroundJob::Verify {
					project_id: verifying.project_id.clone(),
					process_id: verifying.id.clone(),
					session: session.clone(),
					actor: actor.to_string(),
					then_request,
				},
				error: e.to_string(),
			}))
			.ok();

		let revert = StatusCommit::new(verifying, previous);
		if let Err(revert_err) = self.commit(session, &revert, actor).await {
			tracing::warn!(error = %revert_err, "Failed to revert status after enqueue failure");
		}
		Err(e.into())
	}

	fn schedule_reevaluation(&self, session: &Session, project_id: &str, dependents: &BTreeSet<String>) {
		for dependent in dependents {
			let job = BackgroundJob::Reevaluate {
				project_id: project_id.to_string(),
				process_id: dependent.clone(),
				session: session.clone(),
			};
			if let Err(e) = self.jobs.enqueue(job) {
				tracing::warn!(dependent = %truncate_id(dependent), error = %e, "Failed to schedule re-evaluation");
			}
		}
	}

	fn reject(&self, process: &Process, action: &str, reason: String) -> TransitionError {
		tracing::info!(status = %process.status, reason = %reason, "Action rejected");
		self.event_bus
			.publish(LifecycleEvent::Transition(TransitionEvent::ActionRejected {
				process_id: process.id.clone(),
				action: action.to_string(),
				reason: reason.clone(),
			}))
			.ok();
		TransitionError::Precondition(reason)
	}

	/// Identity recorded with writes made on behalf of `session`.
	fn actor_for(&self, session: &Session) -> String {
		self.gateway
			.get_current_user_id(session)
			.unwrap_or_else(|| format!("session:{}", session.id))
	}
}
