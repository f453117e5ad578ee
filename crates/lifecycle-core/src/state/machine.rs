//! State machine for one process instance.

use super::table::{ButtonDescriptor, ButtonRule, StateSpec, StateTable, TransitionContext, UpdateRule};
use super::RuleError;
use lifecycle_types::{ProcessStatus, StatusError};
use thiserror::Error;

/// Errors raised when resolving a state. Both indicate broken data or a
/// broken table and are fatal for the event at hand.
#[derive(Debug, Error)]
pub enum StateError {
	#[error("Unknown status: {0}")]
	UnknownStatus(#[from] StatusError),
	#[error("No state declared for {0}")]
	MissingState(ProcessStatus),
}

/// The current state of one process, borrowed from the shared table.
pub struct StateMachine<'t> {
	spec: &'t StateSpec,
}

impl<'t> StateMachine<'t> {
	pub fn new(table: &'t StateTable, status: ProcessStatus) -> Result<Self, StateError> {
		let spec = table
			.state(status)
			.ok_or(StateError::MissingState(status))?;
		Ok(Self { spec })
	}

	/// Resolves a persisted status code.
	pub fn from_code(table: &'t StateTable, code: i64) -> Result<Self, StateError> {
		Self::new(table, ProcessStatus::from_code(code)?)
	}

	/// Resolves a symbolic status name.
	pub fn from_name(table: &'t StateTable, name: &str) -> Result<Self, StateError> {
		Self::new(table, ProcessStatus::from_name(name)?)
	}

	pub fn status(&self) -> ProcessStatus {
		self.spec.status
	}

	/// First update rule of the current state whose predicate holds.
	pub fn evaluate_update(
		&self,
		ctx: &TransitionContext<'_>,
	) -> Result<Option<&'t UpdateRule>, RuleError> {
		for rule in &self.spec.update_rules {
			if (rule.predicate)(ctx)? {
				return Ok(Some(rule));
			}
		}
		Ok(None)
	}

	/// Button rule declared for `action`, if the current state has one.
	pub fn button(&self, action: &str) -> Option<&'t ButtonRule> {
		self.spec.button(action)
	}

	pub fn buttons(&self, is_client: bool) -> Vec<ButtonDescriptor> {
		self.spec.buttons(is_client)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use lifecycle_types::{Process, Project, PROVISIONAL_CONTRACTOR_KEY};
	use serde_json::json;

	fn evaluate(table: &StateTable, project: &Project, id: &str, service_ready: bool) -> Option<ProcessStatus> {
		let process = &project.processes[id];
		let machine = StateMachine::new(table, process.status).unwrap();
		let ctx = TransitionContext {
			process,
			project,
			service_ready,
		};
		machine.evaluate_update(&ctx).unwrap().map(|rule| rule.target)
	}

	#[test]
	fn test_construction_from_code_and_name() {
		let table = StateTable::standard();
		assert_eq!(
			StateMachine::from_code(&table, 402).unwrap().status(),
			ProcessStatus::VerificationCompleted
		);
		assert_eq!(
			StateMachine::from_name(&table, "DISPUTE").unwrap().status(),
			ProcessStatus::Dispute
		);
		assert!(matches!(
			StateMachine::from_code(&table, 7),
			Err(StateError::UnknownStatus(StatusError::UnknownCode(7)))
		));
		assert!(StateMachine::from_name(&table, "SHIPPED").is_err());
	}

	#[test]
	fn test_draft_without_service_stays() {
		let table = StateTable::standard();
		let project = Project::new("proj", "alice").with_process(Process::new("a", "proj", "alice"));
		assert_eq!(evaluate(&table, &project, "a", false), None);
	}

	#[test]
	fn test_first_matching_rule_wins() {
		let table = StateTable::standard();
		let mut process = Process::new("a", "proj", "alice");
		process.status = ProcessStatus::ServiceReady;
		process.service_type = "additive".into();
		process
			.process_details
			.insert(PROVISIONAL_CONTRACTOR_KEY.into(), json!("fab"));
		let project = Project::new("proj", "alice").with_process(process);

		// Incomplete service outranks the contractor selection
		assert_eq!(
			evaluate(&table, &project, "a", false),
			Some(ProcessStatus::ServiceInProgress)
		);
		assert_eq!(
			evaluate(&table, &project, "a", true),
			Some(ProcessStatus::ContractorSelected)
		);
	}

	#[test]
	fn test_unknown_action_has_no_rule() {
		let table = StateTable::standard();
		let machine = StateMachine::new(&table, ProcessStatus::Production).unwrap();
		assert!(machine.button("COMPLETED").is_none());
		assert!(machine.button("DELIVERY").is_some());
	}
}
