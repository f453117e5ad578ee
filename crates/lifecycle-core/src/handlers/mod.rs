//! Background job handlers.
//!
//! Each job kind has a handler; [`JobHandlers`] routes a dequeued job to
//! the right one. Handlers re-enter the state machine through the engine,
//! the same way a caller would.

pub mod mail;
pub mod migration;
pub mod verification;

use crate::engine::{TransitionEngine, TransitionError};
use lifecycle_gateway::GatewayError;
use lifecycle_outbound::OutboundError;
use lifecycle_types::{BackgroundJob, LifecycleEvent, TaskEvent};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use mail::MailHandler;
pub use migration::MigrationHandler;
pub use verification::VerificationHandler;

/// Errors that can occur while handling a background job.
#[derive(Debug, Error)]
pub enum HandlerError {
	#[error("Transition error: {0}")]
	Transition(#[from] TransitionError),
	#[error("Gateway error: {0}")]
	Gateway(#[from] GatewayError),
	#[error("Outbound error: {0}")]
	Outbound(#[from] OutboundError),
	#[error("Serialization error: {0}")]
	Serialization(String),
}

/// Exponential backoff bounds for retried jobs.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
	pub initial_interval: Duration,
	/// Total time spent retrying; zero means a single attempt.
	pub max_elapsed: Duration,
}

impl RetryPolicy {
	pub(crate) fn backoff(&self) -> backoff::ExponentialBackoff {
		backoff::ExponentialBackoffBuilder::new()
			.with_initial_interval(self.initial_interval)
			.with_max_elapsed_time(Some(self.max_elapsed))
			.build()
	}
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			initial_interval: Duration::from_millis(500),
			max_elapsed: Duration::from_secs(60),
		}
	}
}

/// Maps an outbound failure onto the retry decision.
pub(crate) fn classify(err: OutboundError) -> backoff::Error<OutboundError> {
	if err.is_transient() {
		tracing::debug!(error = %err, "Transient failure, retrying");
		backoff::Error::transient(err)
	} else {
		backoff::Error::permanent(err)
	}
}

/// Routes jobs to their handlers.
pub struct JobHandlers {
	engine: Arc<TransitionEngine>,
	verification: VerificationHandler,
	migration: MigrationHandler,
	mail: MailHandler,
}

impl JobHandlers {
	pub fn new(
		engine: Arc<TransitionEngine>,
		verification: VerificationHandler,
		migration: MigrationHandler,
		mail: MailHandler,
	) -> Self {
		Self {
			engine,
			verification,
			migration,
			mail,
		}
	}

	/// Runs one job. Failures are logged and published, never propagated:
	/// the job is dropped.
	pub async fn handle(&self, job: BackgroundJob) {
		if let Err(e) = self.dispatch(&job).await {
			tracing::error!(job = job.kind(), error = %e, "Background job failed");
			self.engine
				.event_bus()
				.publish(LifecycleEvent::Task(TaskEvent::JobFailed {
					job,
					error: e.to_string(),
				}))
				.ok();
		}
	}

	async fn dispatch(&self, job: &BackgroundJob) -> Result<(), HandlerError> {
		match job {
			BackgroundJob::Verify {
				project_id,
				process_id,
				session,
				actor,
				then_request,
			} => {
				self.verification
					.verify(session, project_id, process_id, actor, *then_request)
					.await
			}
			BackgroundJob::MigrateFile {
				project_id,
				process_id,
				file_id,
				session,
			} => {
				self.migration
					.migrate(session, project_id, process_id, file_id)
					.await
			}
			BackgroundJob::SendMail { mail } => self.mail.send(mail).await,
			BackgroundJob::Reevaluate {
				project_id,
				process_id,
				session,
			} => {
				self.engine
					.apply_data_changed_event(session, project_id, process_id)
					.await?;
				Ok(())
			}
		}
	}
}
