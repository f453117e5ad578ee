//! Process and project records.
//!
//! A project groups sibling processes; a process is one service order inside
//! it and is the unit the lifecycle state machine drives.

use crate::utils::current_timestamp;
use crate::ProcessStatus;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Service type of a process that has not chosen a service yet.
pub const SERVICE_TYPE_NONE: &str = "none";

/// Process details key holding the contractor picked before the request is sent.
pub const PROVISIONAL_CONTRACTOR_KEY: &str = "provisionalContractor";

/// Process details key holding the per-step verification outcome.
pub const VALIDATION_RESULTS_KEY: &str = "validationResults";

/// A single service order within a project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Process {
	/// Unique identifier for this process.
	pub id: String,
	/// Project this process belongs to.
	pub project_id: String,
	/// Identity of the ordering client.
	pub client: String,
	/// Identity of the contractor, assigned when the request is sent.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub contractor: Option<String>,
	/// Current lifecycle status, persisted as its integer code.
	pub status: ProcessStatus,
	/// Chosen service, or [`SERVICE_TYPE_NONE`].
	pub service_type: String,
	/// Whether the service flagged a complication.
	#[serde(default)]
	pub service_status: ServiceStatus,
	/// Service-specific definition, interpreted by the service plugin.
	#[serde(default)]
	pub service_details: Map<String, Value>,
	/// Free-form details owned by the lifecycle.
	#[serde(default)]
	pub process_details: Map<String, Value>,
	/// Siblings this process waits for.
	#[serde(default)]
	pub dependencies_in: BTreeSet<String>,
	/// Siblings waiting for this process.
	#[serde(default)]
	pub dependencies_out: BTreeSet<String>,
	/// Files attached to the process.
	#[serde(default)]
	pub files: Vec<ProcessFile>,
	/// Conversation between client and contractor.
	#[serde(default)]
	pub messages: Vec<ProcessMessage>,
	/// Incremented on every persisted change.
	#[serde(default)]
	pub version: u64,
	pub created_at: u64,
	pub updated_at: u64,
}

impl Process {
	/// Creates a draft process without a service.
	pub fn new(id: impl Into<String>, project_id: impl Into<String>, client: impl Into<String>) -> Self {
		let now = current_timestamp();
		Self {
			id: id.into(),
			project_id: project_id.into(),
			client: client.into(),
			contractor: None,
			status: ProcessStatus::Draft,
			service_type: SERVICE_TYPE_NONE.to_string(),
			service_status: ServiceStatus::Active,
			service_details: Map::new(),
			process_details: Map::new(),
			dependencies_in: BTreeSet::new(),
			dependencies_out: BTreeSet::new(),
			files: Vec::new(),
			messages: Vec::new(),
			version: 0,
			created_at: now,
			updated_at: now,
		}
	}

	/// True once a service other than [`SERVICE_TYPE_NONE`] has been chosen.
	pub fn has_service(&self) -> bool {
		!self.service_type.is_empty() && self.service_type != SERVICE_TYPE_NONE
	}

	/// Contractor selected by the client but not yet assigned.
	pub fn provisional_contractor(&self) -> Option<&str> {
		self.process_details
			.get(PROVISIONAL_CONTRACTOR_KEY)
			.and_then(Value::as_str)
			.filter(|contractor| !contractor.is_empty())
	}

	/// Files that still live only in local storage.
	pub fn local_files(&self) -> impl Iterator<Item = &ProcessFile> {
		self.files
			.iter()
			.filter(|file| file.location == FileLocation::Local)
	}

	/// Whether `user_id` is the ordering client of this process.
	pub fn is_client(&self, user_id: &str) -> bool {
		self.client == user_id
	}
}

/// Complication flag reported by the service.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ServiceStatus {
	#[default]
	Active,
	Complication,
}

/// Storage tier of an attached file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FileLocation {
	Local,
	Remote,
}

/// A file attached to a process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessFile {
	pub id: String,
	pub file_name: String,
	pub location: FileLocation,
	/// Path inside the storage tier named by `location`.
	pub path: String,
}

/// A message exchanged on a process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessMessage {
	pub id: String,
	pub author: String,
	pub text: String,
	pub created_at: u64,
}

/// A collection of sibling processes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
	pub id: String,
	pub client: String,
	#[serde(default)]
	pub processes: BTreeMap<String, Process>,
	pub created_at: u64,
	pub updated_at: u64,
}

impl Project {
	pub fn new(id: impl Into<String>, client: impl Into<String>) -> Self {
		let now = current_timestamp();
		Self {
			id: id.into(),
			client: client.into(),
			processes: BTreeMap::new(),
			created_at: now,
			updated_at: now,
		}
	}

	/// Adds a process, pointing its project reference at this project.
	pub fn with_process(mut self, mut process: Process) -> Self {
		process.project_id = self.id.clone();
		self.processes.insert(process.id.clone(), process);
		self
	}
}
