//! Gate on a process's incoming dependencies.

use super::RuleError;
use lifecycle_types::{Process, ProcessStatus, Project};
use std::collections::HashMap;

/// Outcome of a gate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateStatus {
	/// Every dependency has reached COMPLETED or a later status.
	Open,
	/// Dependencies that have not finished yet.
	Waiting { pending: Vec<String> },
}

impl GateStatus {
	pub fn is_open(&self) -> bool {
		matches!(self, GateStatus::Open)
	}
}

/// Evaluates `dependencies_in` against the sibling processes of a project.
///
/// A dependency counts as done once its status is at least COMPLETED, so a
/// sibling that FAILED or was CANCELED also releases the gate. An empty
/// dependency set is open.
pub struct DependencyGate;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
	Visiting,
	Done,
}

impl DependencyGate {
	pub fn evaluate(project: &Project, process: &Process) -> Result<GateStatus, RuleError> {
		Self::check_acyclic(project, &process.id)?;

		let mut pending = Vec::new();
		for dependency in &process.dependencies_in {
			let sibling = project.processes.get(dependency).ok_or_else(|| {
				RuleError::MissingDependency {
					process_id: process.id.clone(),
					dependency: dependency.clone(),
				}
			})?;
			if sibling.status < ProcessStatus::Completed {
				pending.push(dependency.clone());
			}
		}

		if pending.is_empty() {
			Ok(GateStatus::Open)
		} else {
			Ok(GateStatus::Waiting { pending })
		}
	}

	/// Fails if any chain of dependencies reachable from `start` loops.
	fn check_acyclic(project: &Project, start: &str) -> Result<(), RuleError> {
		fn visit<'a>(
			project: &'a Project,
			id: &'a str,
			marks: &mut HashMap<&'a str, Mark>,
		) -> Result<(), RuleError> {
			match marks.get(id) {
				Some(Mark::Done) => return Ok(()),
				Some(Mark::Visiting) => return Err(RuleError::DependencyCycle(id.to_string())),
				None => {}
			}
			marks.insert(id, Mark::Visiting);
			if let Some(process) = project.processes.get(id) {
				for dependency in &process.dependencies_in {
					visit(project, dependency, marks)?;
				}
			}
			marks.insert(id, Mark::Done);
			Ok(())
		}

		visit(project, start, &mut HashMap::new())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn project(edges: &[(&str, &str)]) -> Project {
		let mut project = Project::new("proj", "alice");
		for id in ["a", "b", "c"] {
			project = project.with_process(Process::new(id, "proj", "alice"));
		}
		for (dependent, dependency) in edges {
			if let Some(p) = project.processes.get_mut(*dependent) {
				p.dependencies_in.insert(dependency.to_string());
			}
			if let Some(p) = project.processes.get_mut(*dependency) {
				p.dependencies_out.insert(dependent.to_string());
			}
		}
		project
	}

	#[test]
	fn test_no_dependencies_is_open() {
		let project = project(&[]);
		let gate = DependencyGate::evaluate(&project, &project.processes["a"]).unwrap();
		assert_eq!(gate, GateStatus::Open);
	}

	#[test]
	fn test_pending_until_completed_or_later() {
		let mut project = project(&[("a", "b"), ("a", "c")]);
		let gate = DependencyGate::evaluate(&project, &project.processes["a"]).unwrap();
		assert_eq!(
			gate,
			GateStatus::Waiting {
				pending: vec!["b".into(), "c".into()]
			}
		);

		project.processes.get_mut("b").unwrap().status = ProcessStatus::Completed;
		project.processes.get_mut("c").unwrap().status = ProcessStatus::Delivery;
		let gate = DependencyGate::evaluate(&project, &project.processes["a"]).unwrap();
		assert_eq!(gate, GateStatus::Waiting { pending: vec!["c".into()] });

		project.processes.get_mut("c").unwrap().status = ProcessStatus::Canceled;
		assert!(DependencyGate::evaluate(&project, &project.processes["a"])
			.unwrap()
			.is_open());
	}

	#[test]
	fn test_cycle_is_a_rule_error() {
		let project = project(&[("a", "b"), ("b", "c"), ("c", "b")]);
		let result = DependencyGate::evaluate(&project, &project.processes["a"]);
		assert!(matches!(result, Err(RuleError::DependencyCycle(_))));
	}

	#[test]
	fn test_missing_dependency_is_a_rule_error() {
		let mut project = project(&[]);
		project
			.processes
			.get_mut("a")
			.unwrap()
			.dependencies_in
			.insert("ghost".into());
		let result = DependencyGate::evaluate(&project, &project.processes["a"]);
		assert!(matches!(result, Err(RuleError::MissingDependency { .. })));
	}
}
