//! Verification handler.
//!
//! Runs the service plugin's checks for a process sitting in VERIFYING and
//! commits VERIFICATION_COMPLETED or VERIFICATION_FAILED together with the
//! per-step results. The process may be moved on while the checks run; the
//! commit then fails its status check and nothing is written.

use super::HandlerError;
use crate::engine::{TransitionEngine, TransitionError};
use lifecycle_gateway::{FieldChange, GatewayError, StatusCommit};
use lifecycle_types::{
	truncate_id, BackgroundJob, JobQueue, LifecycleEvent, Mail, Process, ProcessStatus, Session,
	TaskEvent, UpdateType, VALIDATION_RESULTS_KEY,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Step recorded when the service definition is incomplete.
pub const STEP_SERVICE_READY: &str = "serviceReady";
/// Step recorded when the plugin itself failed.
pub const STEP_SERVICE: &str = "service";
/// Step recorded when the plugin did not answer in time.
pub const STEP_TIMEOUT: &str = "timeout";

pub struct VerificationHandler {
	engine: Arc<TransitionEngine>,
	jobs: JobQueue,
	timeout: Duration,
}

impl VerificationHandler {
	pub fn new(engine: Arc<TransitionEngine>, jobs: JobQueue, timeout: Duration) -> Self {
		Self {
			engine,
			jobs,
			timeout,
		}
	}

	#[instrument(skip_all, fields(process_id = %truncate_id(process_id)))]
	pub async fn verify(
		&self,
		session: &Session,
		project_id: &str,
		process_id: &str,
		actor: &str,
		then_request: bool,
	) -> Result<(), HandlerError> {
		let gateway = self.engine.gateway();
		let process = gateway.get_process(session, project_id, process_id).await?;
		if process.status != ProcessStatus::Verifying {
			self.aborted(process_id, process.status);
			return Ok(());
		}

		let results = self.run_steps(&process).await;
		let passed = results.values().all(|passed| *passed);

		let mut details = Map::new();
		details.insert(
			VALIDATION_RESULTS_KEY.to_string(),
			serde_json::to_value(&results).map_err(|e| HandlerError::Serialization(e.to_string()))?,
		);
		let target = if passed {
			ProcessStatus::VerificationCompleted
		} else {
			ProcessStatus::VerificationFailed
		};
		// Results and verdict land together, and only if nobody moved the
		// process while the checks ran
		let commit = StatusCommit::expecting(project_id, process_id, ProcessStatus::Verifying, target)
			.with_change(FieldChange::Set(UpdateType::ProcessDetails, Value::Object(details)));
		let current = match self.engine.commit(session, &commit, actor).await {
			Ok(current) => current,
			Err(TransitionError::Gateway(GatewayError::Conflict { found, .. })) => {
				self.aborted(process_id, found);
				return Ok(());
			}
			Err(e) => return Err(e.into()),
		};

		tracing::info!(passed, "Verification finished");
		self.engine
			.event_bus()
			.publish(LifecycleEvent::Task(TaskEvent::VerificationFinished {
				process_id: process_id.to_string(),
				passed,
				results,
			}))
			.ok();

		let mail = verification_mail(&current, passed);
		if let Err(e) = self.jobs.enqueue(BackgroundJob::SendMail { mail }) {
			tracing::warn!(error = %e, "Failed to enqueue verification mail");
		}

		if passed && then_request {
			self.engine
				.apply_user_action(session, project_id, process_id, ProcessStatus::Requested.name())
				.await?;
		}
		Ok(())
	}

	/// Readiness check followed by the plugin's own steps.
	async fn run_steps(&self, process: &Process) -> BTreeMap<String, bool> {
		let services = self.engine.services();
		let mut results = BTreeMap::new();

		let ready = services.service_ready(process);
		results.insert(STEP_SERVICE_READY.to_string(), ready);
		if !ready {
			return results;
		}

		match tokio::time::timeout(self.timeout, services.validate(process)).await {
			Ok(Ok(steps)) => results.extend(steps),
			Ok(Err(e)) => {
				tracing::warn!(error = %e, "Service validation failed");
				results.insert(STEP_SERVICE.to_string(), false);
			}
			Err(_) => {
				tracing::warn!(timeout_secs = self.timeout.as_secs(), "Service validation timed out");
				results.insert(STEP_TIMEOUT.to_string(), false);
			}
		}
		results
	}

	fn aborted(&self, process_id: &str, found: ProcessStatus) {
		tracing::info!(found = %found, "Process left VERIFYING, discarding verification");
		self.engine
			.event_bus()
			.publish(LifecycleEvent::Task(TaskEvent::VerificationAborted {
				process_id: process_id.to_string(),
				found,
			}))
			.ok();
	}
}

fn verification_mail(process: &Process, passed: bool) -> Mail {
	let (subject, outcome) = if passed {
		("Verification completed", "passed verification")
	} else {
		("Verification failed", "did not pass verification")
	};
	Mail {
		recipient: process.client.clone(),
		subject: subject.to_string(),
		body: format!("Process {} {}.", process.id, outcome),
		process_id: process.id.clone(),
	}
}
