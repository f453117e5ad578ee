//! Field updates applied to a loaded project.
//!
//! Each function mutates one process (and, for dependency links, its
//! sibling) in memory. The caller holds the project lock and persists the
//! result.

use crate::{FieldChange, GatewayError};
use lifecycle_types::{
	current_timestamp, Process, ProcessFile, ProcessMessage, Project, ServiceStatus,
	UpdateType, PROVISIONAL_CONTRACTOR_KEY, SERVICE_TYPE_NONE,
};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Applies an update tag to a process.
pub(crate) fn apply_update(
	project: &mut Project,
	process_id: &str,
	update: UpdateType,
	value: Value,
	actor: &str,
) -> Result<(), GatewayError> {
	match update {
		UpdateType::ProcessStatus => Err(GatewayError::InvalidUpdate(
			"processStatus is only changed by status commits".into(),
		)),
		UpdateType::DependenciesIn => {
			for dependency in string_list(update, &value)? {
				link(project, process_id, &dependency)?;
			}
			Ok(())
		}
		UpdateType::DependenciesOut => {
			for dependent in string_list(update, &value)? {
				link(project, &dependent, process_id)?;
			}
			Ok(())
		}
		_ => {
			let process = process_mut(project, process_id)?;
			update_field(process, update, value, actor)
		}
	}
}

/// Removes entries named by an update tag from a process.
pub(crate) fn apply_delete(
	project: &mut Project,
	process_id: &str,
	update: UpdateType,
	value: Value,
) -> Result<(), GatewayError> {
	match update {
		UpdateType::ProcessStatus => Err(GatewayError::InvalidUpdate(
			"processStatus cannot be deleted".into(),
		)),
		UpdateType::DependenciesIn => {
			for dependency in string_list(update, &value)? {
				unlink(project, process_id, &dependency)?;
			}
			Ok(())
		}
		UpdateType::DependenciesOut => {
			for dependent in string_list(update, &value)? {
				unlink(project, &dependent, process_id)?;
			}
			Ok(())
		}
		_ => {
			let process = process_mut(project, process_id)?;
			delete_field(process, update, value)
		}
	}
}

/// Applies a field change carried by a status commit.
pub(crate) fn apply_change(
	project: &mut Project,
	process_id: &str,
	change: &FieldChange,
	actor: &str,
) -> Result<(), GatewayError> {
	match change {
		FieldChange::Set(update, value) => apply_update(project, process_id, *update, value.clone(), actor),
		FieldChange::Remove(update, value) => apply_delete(project, process_id, *update, value.clone()),
	}
}

/// Removes a process and the dependency links of its siblings that name it.
pub(crate) fn remove_process(project: &mut Project, process_id: &str) -> Result<Process, GatewayError> {
	let removed = project
		.processes
		.remove(process_id)
		.ok_or_else(|| GatewayError::ProcessNotFound(process_id.to_string()))?;
	for sibling in project.processes.values_mut() {
		let touched = sibling.dependencies_in.remove(process_id)
			| sibling.dependencies_out.remove(process_id);
		if touched {
			touch(sibling);
		}
	}
	project.updated_at = current_timestamp();
	Ok(removed)
}

pub(crate) fn process_mut<'a>(
	project: &'a mut Project,
	process_id: &str,
) -> Result<&'a mut Process, GatewayError> {
	project
		.processes
		.get_mut(process_id)
		.ok_or_else(|| GatewayError::ProcessNotFound(process_id.to_string()))
}

/// Bumps the version and modification time of a changed process.
pub(crate) fn touch(process: &mut Process) {
	process.version += 1;
	process.updated_at = current_timestamp();
}

fn update_field(
	process: &mut Process,
	update: UpdateType,
	value: Value,
	actor: &str,
) -> Result<(), GatewayError> {
	match update {
		UpdateType::Messages => {
			let text = match &value {
				Value::String(text) => text.clone(),
				Value::Object(map) => map
					.get("text")
					.and_then(Value::as_str)
					.map(str::to_string)
					.ok_or_else(|| invalid(update, "expected a message text"))?,
				_ => return Err(invalid(update, "expected a string or {\"text\": ..}")),
			};
			process.messages.push(ProcessMessage {
				id: uuid::Uuid::new_v4().to_string(),
				author: actor.to_string(),
				text,
				created_at: current_timestamp(),
			});
		}
		UpdateType::Files => {
			let files: Vec<ProcessFile> = match value {
				Value::Array(_) => serde_json::from_value(value),
				other => serde_json::from_value(other).map(|file| vec![file]),
			}
			.map_err(|e| invalid(update, &e.to_string()))?;
			for file in files {
				match process.files.iter_mut().find(|f| f.id == file.id) {
					Some(existing) => *existing = file,
					None => process.files.push(file),
				}
			}
		}
		UpdateType::ServiceDetails => {
			merge(&mut process.service_details, object(update, value)?);
		}
		UpdateType::ProcessDetails => {
			merge(&mut process.process_details, object(update, value)?);
		}
		UpdateType::ServiceType => {
			let service_type = value
				.as_str()
				.filter(|s| !s.is_empty())
				.ok_or_else(|| invalid(update, "expected a service type name"))?;
			if process.service_type != service_type {
				process.service_type = service_type.to_string();
				process.service_details.clear();
				process.service_status = ServiceStatus::Active;
			}
		}
		UpdateType::ServiceStatus => {
			process.service_status =
				serde_json::from_value(value).map_err(|e| invalid(update, &e.to_string()))?;
		}
		UpdateType::ProvisionalContractor => {
			let contractor = value
				.as_str()
				.filter(|s| !s.is_empty())
				.ok_or_else(|| invalid(update, "expected a contractor identity"))?;
			process.process_details.insert(
				PROVISIONAL_CONTRACTOR_KEY.to_string(),
				Value::String(contractor.to_string()),
			);
		}
		UpdateType::ProcessStatus | UpdateType::DependenciesIn | UpdateType::DependenciesOut => {
			return Err(invalid(update, "not a plain field"));
		}
	}
	touch(process);
	Ok(())
}

fn delete_field(process: &mut Process, update: UpdateType, value: Value) -> Result<(), GatewayError> {
	match update {
		UpdateType::Messages => {
			let ids = string_list(update, &value)?;
			process.messages.retain(|m| !ids.contains(&m.id));
		}
		UpdateType::Files => {
			let ids = string_list(update, &value)?;
			process.files.retain(|f| !ids.contains(&f.id));
		}
		UpdateType::ServiceDetails => {
			for key in string_list(update, &value)? {
				process.service_details.remove(&key);
			}
		}
		UpdateType::ProcessDetails => {
			for key in string_list(update, &value)? {
				process.process_details.remove(&key);
			}
		}
		UpdateType::ServiceType => {
			process.service_type = SERVICE_TYPE_NONE.to_string();
			process.service_details.clear();
			process.service_status = ServiceStatus::Active;
		}
		UpdateType::ServiceStatus => {
			process.service_status = ServiceStatus::Active;
		}
		UpdateType::ProvisionalContractor => {
			// Clearing the selection also withdraws an assigned contractor
			process.process_details.remove(PROVISIONAL_CONTRACTOR_KEY);
			process.contractor = None;
		}
		UpdateType::ProcessStatus | UpdateType::DependenciesIn | UpdateType::DependenciesOut => {
			return Err(invalid(update, "not a plain field"));
		}
	}
	touch(process);
	Ok(())
}

/// Makes `dependent` wait for `dependency`, mirroring the edge on both sides.
fn link(project: &mut Project, dependent: &str, dependency: &str) -> Result<(), GatewayError> {
	if dependent == dependency {
		return Err(GatewayError::InvalidUpdate(format!(
			"Process {} cannot depend on itself",
			dependent
		)));
	}
	for id in [dependent, dependency] {
		if !project.processes.contains_key(id) {
			return Err(GatewayError::ProcessNotFound(id.to_string()));
		}
	}
	if depends_on(project, dependency, dependent) {
		return Err(GatewayError::InvalidUpdate(format!(
			"Dependency {} -> {} would create a cycle",
			dependent, dependency
		)));
	}

	let process = process_mut(project, dependent)?;
	if process.dependencies_in.insert(dependency.to_string()) {
		touch(process);
	}
	let process = process_mut(project, dependency)?;
	if process.dependencies_out.insert(dependent.to_string()) {
		touch(process);
	}
	Ok(())
}

fn unlink(project: &mut Project, dependent: &str, dependency: &str) -> Result<(), GatewayError> {
	let process = process_mut(project, dependent)?;
	if process.dependencies_in.remove(dependency) {
		touch(process);
	}
	if let Some(process) = project.processes.get_mut(dependency) {
		if process.dependencies_out.remove(dependent) {
			touch(process);
		}
	}
	Ok(())
}

/// Whether `from` transitively waits for `target`.
fn depends_on(project: &Project, from: &str, target: &str) -> bool {
	let mut visited = BTreeSet::new();
	let mut stack = vec![from.to_string()];
	while let Some(id) = stack.pop() {
		if id == target {
			return true;
		}
		if !visited.insert(id.clone()) {
			continue;
		}
		if let Some(process) = project.processes.get(&id) {
			stack.extend(process.dependencies_in.iter().cloned());
		}
	}
	false
}

fn merge(target: &mut Map<String, Value>, source: Map<String, Value>) {
	for (key, value) in source {
		target.insert(key, value);
	}
}

fn object(update: UpdateType, value: Value) -> Result<Map<String, Value>, GatewayError> {
	match value {
		Value::Object(map) => Ok(map),
		_ => Err(invalid(update, "expected an object")),
	}
}

/// Accepts a single string or an array of strings.
fn string_list(update: UpdateType, value: &Value) -> Result<Vec<String>, GatewayError> {
	match value {
		Value::String(s) => Ok(vec![s.clone()]),
		Value::Array(items) => items
			.iter()
			.map(|item| {
				item.as_str()
					.map(str::to_string)
					.ok_or_else(|| invalid(update, "expected strings"))
			})
			.collect(),
		_ => Err(invalid(update, "expected a string or an array of strings")),
	}
}

fn invalid(update: UpdateType, message: &str) -> GatewayError {
	GatewayError::InvalidUpdate(format!("{}: {}", update, message))
}
