//! The state table: declared transitions of every lifecycle stage.
//!
//! Transitions are data. An update rule pairs a predicate with a target; a
//! button rule pairs an action name with a target and a side effect. The
//! reachability graph is read straight off these declarations.

use super::dependency::DependencyGate;
use super::RuleError;
use lifecycle_types::{Process, ProcessStatus, Project, ServiceStatus};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Action deleting the process, available in every state.
pub const DELETE_ACTION: &str = "deleteProcess";

/// Action starting verification that sends the request once it passes.
pub const VERIFY_AND_REQUEST_ACTION: &str = "VERIFYING_AND_REQUESTED";

/// Everything an update predicate may look at, loaded before evaluation.
pub struct TransitionContext<'a> {
	pub process: &'a Process,
	/// Project holding the process and its siblings.
	pub project: &'a Project,
	/// Readiness reported by the service plugin.
	pub service_ready: bool,
}

impl TransitionContext<'_> {
	pub fn dependencies_complete(&self) -> Result<bool, RuleError> {
		DependencyGate::evaluate(self.project, self.process).map(|gate| gate.is_open())
	}
}

pub type Predicate = fn(&TransitionContext<'_>) -> Result<bool, RuleError>;

/// A data-driven transition.
pub struct UpdateRule {
	/// Short description used in logs.
	pub name: &'static str,
	pub target: ProcessStatus,
	pub predicate: Predicate,
}

/// Who may press a button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Audience {
	Client,
	Contractor,
	Any,
}

impl Audience {
	pub fn admits(&self, role: Role) -> bool {
		match self {
			Audience::Client => role == Role::Client,
			Audience::Contractor => role == Role::Contractor,
			Audience::Any => role != Role::Observer,
		}
	}
}

/// Relation of the caller to a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
	Client,
	/// The assigned or selected contractor.
	Contractor,
	/// Anyone else; may look but not press.
	Observer,
}

impl Role {
	/// Role of `user_id` on `process`.
	///
	/// A session without a user acts for the client: such sessions only
	/// reach data they created themselves.
	pub fn of(process: &Process, user_id: Option<&str>) -> Self {
		let Some(user_id) = user_id else {
			return Role::Client;
		};
		if process.is_client(user_id) {
			Role::Client
		} else if process.contractor.as_deref() == Some(user_id)
			|| process.provisional_contractor() == Some(user_id)
		{
			Role::Contractor
		} else {
			Role::Observer
		}
	}
}

/// Side effect attached to a button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEffect {
	None,
	/// Enqueue verification after the commit.
	Verify,
	/// Enqueue verification that presses the request action when it passes.
	VerifyThenRequest,
	/// Assign the contractor and hand files and mails to the job queue.
	Send,
	/// Drop the selected contractor in the same write as the commit.
	ClearContractor,
	/// Delete the process instead of committing a status.
	Delete,
}

/// A user-driven transition.
pub struct ButtonRule {
	pub action: &'static str,
	/// Status committed by the press; `None` for deletion.
	pub target: Option<ProcessStatus>,
	pub effect: ButtonEffect,
	pub audience: Audience,
	pub label: &'static str,
}

impl ButtonRule {
	/// A button named after the status it leads to.
	fn to(target: ProcessStatus, audience: Audience, label: &'static str) -> Self {
		Self {
			action: target.name(),
			target: Some(target),
			effect: ButtonEffect::None,
			audience,
			label,
		}
	}

	fn with_effect(mut self, effect: ButtonEffect) -> Self {
		self.effect = effect;
		self
	}

	fn delete() -> Self {
		Self {
			action: DELETE_ACTION,
			target: None,
			effect: ButtonEffect::Delete,
			audience: Audience::Client,
			label: "Delete",
		}
	}
}

/// Presentation view of a button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonDescriptor {
	pub action: String,
	pub label: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub target: Option<ProcessStatus>,
}

/// An action that is refused outright below a minimum status.
#[derive(Debug, Clone, Copy)]
pub struct ActionGuard {
	pub action: &'static str,
	pub minimum: ProcessStatus,
}

/// Declared behaviour of one status.
pub struct StateSpec {
	pub status: ProcessStatus,
	/// Evaluated in order; the first match wins.
	pub update_rules: Vec<UpdateRule>,
	pub button_rules: Vec<ButtonRule>,
	/// Statuses a background job may move this state to.
	pub background_targets: Vec<ProcessStatus>,
}

impl StateSpec {
	fn new(status: ProcessStatus) -> Self {
		Self {
			status,
			update_rules: Vec::new(),
			button_rules: vec![ButtonRule::delete()],
			background_targets: Vec::new(),
		}
	}

	fn on_update(mut self, name: &'static str, target: ProcessStatus, predicate: Predicate) -> Self {
		self.update_rules.push(UpdateRule {
			name,
			target,
			predicate,
		});
		self
	}

	fn on_button(mut self, rule: ButtonRule) -> Self {
		// deleteProcess stays last
		let at = self.button_rules.len().saturating_sub(1);
		self.button_rules.insert(at, rule);
		self
	}

	fn on_job(mut self, target: ProcessStatus) -> Self {
		self.background_targets.push(target);
		self
	}

	pub fn button(&self, action: &str) -> Option<&ButtonRule> {
		self.button_rules.iter().find(|rule| rule.action == action)
	}

	pub fn buttons(&self, is_client: bool) -> Vec<ButtonDescriptor> {
		let role = if is_client {
			Role::Client
		} else {
			Role::Contractor
		};
		self.button_rules
			.iter()
			.filter(|rule| rule.audience.admits(role))
			.map(|rule| ButtonDescriptor {
				action: rule.action.to_string(),
				label: rule.label.to_string(),
				target: rule.target,
			})
			.collect()
	}
}

/// How a transition is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TriggerKind {
	Update,
	Button,
	Background,
}

/// One declared transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Edge {
	pub source: ProcessStatus,
	pub target: ProcessStatus,
	pub trigger: TriggerKind,
}

/// Read-only table of every state.
pub struct StateTable {
	states: BTreeMap<ProcessStatus, StateSpec>,
	guards: Vec<ActionGuard>,
}

impl StateTable {
	/// The process lifecycle.
	pub fn standard() -> Self {
		let states = ProcessStatus::ALL
			.iter()
			.map(|status| (*status, standard_spec(*status)))
			.collect();
		Self {
			states,
			guards: vec![ActionGuard {
				action: ProcessStatus::Requested.name(),
				minimum: ProcessStatus::VerificationCompleted,
			}],
		}
	}

	pub fn state(&self, status: ProcessStatus) -> Option<&StateSpec> {
		self.states.get(&status)
	}

	/// Guard refusing `action` while the process is at `status`, if any.
	pub fn guard_for(&self, action: &str, status: ProcessStatus) -> Option<&ActionGuard> {
		self.guards
			.iter()
			.find(|guard| guard.action == action && status < guard.minimum)
	}

	/// Every declared transition, deduplicated and sorted.
	pub fn edges(&self) -> Vec<Edge> {
		let mut edges = BTreeSet::new();
		for spec in self.states.values() {
			let source = spec.status;
			for rule in &spec.update_rules {
				edges.insert(Edge {
					source,
					target: rule.target,
					trigger: TriggerKind::Update,
				});
			}
			for target in spec.button_rules.iter().filter_map(|rule| rule.target) {
				edges.insert(Edge {
					source,
					target,
					trigger: TriggerKind::Button,
				});
			}
			for target in &spec.background_targets {
				edges.insert(Edge {
					source,
					target: *target,
					trigger: TriggerKind::Background,
				});
			}
		}
		edges.into_iter().collect()
	}
}

fn service_removed(ctx: &TransitionContext<'_>) -> Result<bool, RuleError> {
	Ok(!ctx.process.has_service())
}

fn service_with_dependencies_complete(ctx: &TransitionContext<'_>) -> Result<bool, RuleError> {
	Ok(ctx.process.has_service() && ctx.dependencies_complete()?)
}

fn service_with_dependencies_pending(ctx: &TransitionContext<'_>) -> Result<bool, RuleError> {
	Ok(ctx.process.has_service() && !ctx.dependencies_complete()?)
}

fn dependencies_complete(ctx: &TransitionContext<'_>) -> Result<bool, RuleError> {
	ctx.dependencies_complete()
}

fn complication(ctx: &TransitionContext<'_>) -> Result<bool, RuleError> {
	Ok(ctx.process.service_status == ServiceStatus::Complication)
}

fn complication_cleared(ctx: &TransitionContext<'_>) -> Result<bool, RuleError> {
	Ok(ctx.process.service_status == ServiceStatus::Active)
}

fn complication_cleared_and_ready(ctx: &TransitionContext<'_>) -> Result<bool, RuleError> {
	Ok(ctx.process.service_status == ServiceStatus::Active && ctx.service_ready)
}

fn service_ready(ctx: &TransitionContext<'_>) -> Result<bool, RuleError> {
	Ok(ctx.service_ready)
}

fn service_incomplete(ctx: &TransitionContext<'_>) -> Result<bool, RuleError> {
	Ok(!ctx.service_ready)
}

fn contractor_selected(ctx: &TransitionContext<'_>) -> Result<bool, RuleError> {
	Ok(ctx.process.provisional_contractor().is_some())
}

fn contractor_removed(ctx: &TransitionContext<'_>) -> Result<bool, RuleError> {
	Ok(ctx.process.provisional_contractor().is_none())
}

fn standard_spec(status: ProcessStatus) -> StateSpec {
	use Audience::{Any, Client, Contractor};
	use ProcessStatus::*;

	let spec = StateSpec::new(status);
	match status {
		Draft => spec
			.on_update("service chosen, dependencies complete", ServiceInProgress, service_with_dependencies_complete)
			.on_update("service chosen, dependencies pending", WaitingForOtherProcess, service_with_dependencies_pending),
		WaitingForOtherProcess => spec
			.on_update("service removed", Draft, service_removed)
			.on_update("dependencies complete", ServiceInProgress, dependencies_complete)
			.on_button(ButtonRule::to(Draft, Client, "Back to draft")),
		ServiceInProgress => spec
			.on_update("service removed", Draft, service_removed)
			.on_update("complication reported", ServiceComplication, complication)
			.on_update("service ready", ServiceReady, service_ready)
			.on_button(ButtonRule::to(Draft, Client, "Back to draft")),
		ServiceComplication => spec
			.on_update("service removed", Draft, service_removed)
			.on_update("complication cleared, service ready", ServiceReady, complication_cleared_and_ready)
			.on_update("complication cleared", ServiceInProgress, complication_cleared)
			.on_button(ButtonRule::to(Draft, Client, "Back to draft")),
		ServiceReady => spec
			.on_update("service removed", Draft, service_removed)
			.on_update("complication reported", ServiceComplication, complication)
			.on_update("service incomplete", ServiceInProgress, service_incomplete)
			.on_update("contractor selected", ContractorSelected, contractor_selected),
		ContractorSelected => spec
			.on_update("service incomplete", ServiceInProgress, service_incomplete)
			.on_update("contractor removed", ServiceReady, contractor_removed)
			.on_button(ButtonRule::to(Verifying, Client, "Verify").with_effect(ButtonEffect::Verify))
			.on_button(ButtonRule {
				action: VERIFY_AND_REQUEST_ACTION,
				target: Some(Verifying),
				effect: ButtonEffect::VerifyThenRequest,
				audience: Client,
				label: "Verify and send request",
			})
			.on_button(
				ButtonRule::to(ServiceReady, Client, "Choose another contractor")
					.with_effect(ButtonEffect::ClearContractor),
			),
		Verifying => spec
			.on_job(VerificationCompleted)
			.on_job(VerificationFailed)
			.on_button(ButtonRule::to(ContractorSelected, Client, "Cancel verification")),
		VerificationFailed => spec
			.on_update("service incomplete", ServiceInProgress, service_incomplete)
			.on_button(ButtonRule::to(ContractorSelected, Client, "Edit"))
			.on_button(ButtonRule::to(Verifying, Client, "Verify again").with_effect(ButtonEffect::Verify)),
		VerificationCompleted => spec
			.on_update("service incomplete", ServiceInProgress, service_incomplete)
			.on_button(ButtonRule::to(Requested, Client, "Send request").with_effect(ButtonEffect::Send))
			.on_button(ButtonRule::to(ContractorSelected, Client, "Edit")),
		Requested => spec
			.on_button(ButtonRule::to(Clarification, Contractor, "Ask for clarification"))
			.on_button(ButtonRule::to(ConfirmedByContractor, Contractor, "Confirm"))
			.on_button(ButtonRule::to(RejectedByContractor, Contractor, "Reject"))
			.on_button(ButtonRule::to(Canceled, Client, "Cancel request")),
		Clarification => spec
			.on_button(ButtonRule::to(ConfirmedByContractor, Contractor, "Confirm"))
			.on_button(ButtonRule::to(RejectedByContractor, Contractor, "Reject"))
			.on_button(ButtonRule::to(Canceled, Client, "Cancel request")),
		ConfirmedByContractor => spec
			.on_button(ButtonRule::to(ConfirmedByClient, Client, "Accept offer"))
			.on_button(ButtonRule::to(RejectedByClient, Client, "Decline offer")),
		RejectedByContractor => spec
			.on_button(
				ButtonRule::to(ServiceReady, Client, "Choose another contractor")
					.with_effect(ButtonEffect::ClearContractor),
			)
			.on_button(ButtonRule::to(Failed, Client, "Give up")),
		ConfirmedByClient => spec.on_button(ButtonRule::to(Production, Contractor, "Start production")),
		RejectedByClient => spec.on_button(ButtonRule::to(Canceled, Any, "Close")),
		Production => spec.on_button(ButtonRule::to(Delivery, Contractor, "Ship")),
		Delivery => spec
			.on_button(ButtonRule::to(Completed, Client, "Confirm receipt"))
			.on_button(ButtonRule::to(Dispute, Client, "Open dispute")),
		Dispute => spec
			.on_button(ButtonRule::to(Completed, Any, "Resolve"))
			.on_button(ButtonRule::to(Failed, Any, "Close as failed")),
		Completed | Failed | Canceled => spec,
	}
}
