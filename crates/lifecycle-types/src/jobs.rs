//! Background job descriptions and the queue that carries them.
//!
//! Jobs are produced on the synchronous transition path and executed later by
//! the task runner. Producing never blocks; the queue is unbounded and the
//! runner bounds concurrency instead.

use crate::Session;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that can occur when enqueuing a job.
#[derive(Debug, Error)]
pub enum JobQueueError {
	/// The runner side of the queue has been dropped.
	#[error("Job queue closed")]
	Closed,
}

/// A notification e-mail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Mail {
	/// Identity of the recipient.
	pub recipient: String,
	pub subject: String,
	pub body: String,
	/// Process the mail is about.
	pub process_id: String,
}

/// Work deferred off the transition path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum BackgroundJob {
	/// Verify the service definition of a process sitting in VERIFYING.
	Verify {
		project_id: String,
		process_id: String,
		session: Session,
		actor: String,
		/// Re-enter the machine with the request action when verification passes.
		then_request: bool,
	},
	/// Move one local file of a process to remote storage.
	MigrateFile {
		project_id: String,
		process_id: String,
		file_id: String,
		session: Session,
	},
	/// Deliver a notification e-mail.
	SendMail { mail: Mail },
	/// Fire a data-changed event on a process, e.g. after a dependency finished.
	Reevaluate {
		project_id: String,
		process_id: String,
		session: Session,
	},
}

impl BackgroundJob {
	/// Short label used in logs.
	pub fn kind(&self) -> &'static str {
		match self {
			BackgroundJob::Verify { .. } => "verify",
			BackgroundJob::MigrateFile { .. } => "migrate_file",
			BackgroundJob::SendMail { .. } => "send_mail",
			BackgroundJob::Reevaluate { .. } => "reevaluate",
		}
	}
}

/// Receiving half handed to the task runner.
pub type JobReceiver = mpsc::UnboundedReceiver<BackgroundJob>;

/// Producer side of the background job queue.
#[derive(Debug, Clone)]
pub struct JobQueue {
	sender: mpsc::UnboundedSender<BackgroundJob>,
}

impl JobQueue {
	/// Creates a queue and its receiving half.
	pub fn new() -> (Self, JobReceiver) {
		let (sender, receiver) = mpsc::unbounded_channel();
		(Self { sender }, receiver)
	}

	/// Enqueues a job without waiting for it to run.
	pub fn enqueue(&self, job: BackgroundJob) -> Result<(), JobQueueError> {
		tracing::debug!(job = job.kind(), "Enqueued background job");
		self.sender.send(job).map_err(|_| JobQueueError::Closed)
	}
}
