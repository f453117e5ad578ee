//! Configurable checklist service.
//!
//! For services without dedicated rules: a definition is ready when every
//! configured field is filled in, and verification reports one step per
//! field plus an attachment check when files are required.

use crate::{is_filled, ServiceError, ServiceFactory, ServiceInterface, ServiceRegistry, ValidationResults};
use async_trait::async_trait;
use lifecycle_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Process, Schema, ValidationError,
};
use serde_json::{Map, Value};

pub struct ChecklistService {
	required_fields: Vec<String>,
	require_files: bool,
}

impl ChecklistService {
	pub fn new(required_fields: Vec<String>, require_files: bool) -> Self {
		Self {
			required_fields,
			require_files,
		}
	}
}

/// Configuration schema for ChecklistService.
pub struct ChecklistServiceSchema;

impl ConfigSchema for ChecklistServiceSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new(
				"required_fields",
				FieldType::Array(Box::new(FieldType::String)),
			)
			.with_validator(|value| match value.as_array() {
				Some(items) if items.is_empty() => Err("must name at least one field".into()),
				_ => Ok(()),
			})],
			vec![Field::new("require_files", FieldType::Boolean)],
		);
		schema.validate(config)
	}
}

#[async_trait]
impl ServiceInterface for ChecklistService {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(ChecklistServiceSchema)
	}

	fn service_ready(&self, details: &Map<String, Value>) -> bool {
		self.required_fields
			.iter()
			.all(|field| is_filled(details.get(field)))
	}

	async fn validate(&self, process: &Process) -> Result<ValidationResults, ServiceError> {
		let mut results: ValidationResults = self
			.required_fields
			.iter()
			.map(|field| (field.clone(), is_filled(process.service_details.get(field))))
			.collect();
		if self.require_files {
			results.insert("files".into(), !process.files.is_empty());
		}
		Ok(results)
	}
}

/// Factory function to create a checklist service.
///
/// Configuration parameters:
/// - `required_fields`: service detail keys that must be filled in
/// - `require_files`: whether at least one file must be attached (default: false)
pub fn create_service(config: &toml::Value) -> Result<Box<dyn ServiceInterface>, ServiceError> {
	ChecklistServiceSchema
		.validate(config)
		.map_err(|e| ServiceError::InvalidConfig(e.to_string()))?;

	let required_fields = config
		.get("required_fields")
		.and_then(|v| v.as_array())
		.map(|items| {
			items
				.iter()
				.filter_map(|item| item.as_str().map(str::to_string))
				.collect()
		})
		.unwrap_or_default();
	let require_files = config
		.get("require_files")
		.and_then(|v| v.as_bool())
		.unwrap_or(false);

	Ok(Box::new(ChecklistService::new(required_fields, require_files)))
}

/// Registry for the checklist service implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "checklist";
	type Factory = ServiceFactory;

	fn factory() -> Self::Factory {
		create_service
	}
}

impl ServiceRegistry for Registry {}
