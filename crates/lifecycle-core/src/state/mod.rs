//! Lifecycle states and the rules that move a process between them.
//!
//! The [`StateTable`] holds one [`StateSpec`] per status. It is built once
//! and shared read-only; a [`StateMachine`] borrows the spec of one
//! process's current status to evaluate events against it.

pub mod dependency;
pub mod machine;
pub mod table;

pub use dependency::{DependencyGate, GateStatus};
pub use machine::{StateError, StateMachine};
pub use table::{
	ActionGuard, Audience, ButtonDescriptor, ButtonEffect, ButtonRule, Edge, Role, StateSpec,
	StateTable, TransitionContext, TriggerKind, UpdateRule, DELETE_ACTION, VERIFY_AND_REQUEST_ACTION,
};

use thiserror::Error;

/// Errors raised while evaluating an update rule.
///
/// These never escape the engine: the event is logged and treated as
/// "no transition".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleError {
	#[error("Dependency cycle through {0}")]
	DependencyCycle(String),
	#[error("Process {process_id} depends on missing process {dependency}")]
	MissingDependency {
		process_id: String,
		dependency: String,
	},
}
