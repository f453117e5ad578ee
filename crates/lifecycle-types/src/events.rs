//! Event types for observing the lifecycle.
//!
//! Events are published on the engine's event bus after the fact; nothing in
//! the state machine depends on them being received.

use crate::{BackgroundJob, ProcessStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Main event type encompassing all lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LifecycleEvent {
	/// Events from the transition engine.
	Transition(TransitionEvent),
	/// Events from background jobs.
	Task(TaskEvent),
}

/// Events related to status transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TransitionEvent {
	/// A new status has been committed.
	StatusChanged {
		project_id: String,
		process_id: String,
		from: ProcessStatus,
		to: ProcessStatus,
	},
	/// A button press was rejected before anything was committed.
	ActionRejected {
		process_id: String,
		action: String,
		reason: String,
	},
	/// A deletion was forwarded to the gateway.
	ProcessDeleted {
		project_id: String,
		process_id: String,
	},
}

/// Events related to background jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskEvent {
	/// Verification wrote its result.
	VerificationFinished {
		process_id: String,
		passed: bool,
		results: BTreeMap<String, bool>,
	},
	/// Verification found the process had moved on and wrote nothing.
	VerificationAborted {
		process_id: String,
		found: ProcessStatus,
	},
	/// A local file now lives in remote storage.
	FileMigrated {
		process_id: String,
		file_id: String,
		remote_path: String,
	},
	/// A notification e-mail was handed to the mailer.
	MailSent { recipient: String, subject: String },
	/// A job gave up.
	JobFailed { job: BackgroundJob, error: String },
}
