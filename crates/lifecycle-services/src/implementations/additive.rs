//! Additive manufacturing (3D printing) service.
//!
//! A definition is ready once it names a supported material and a positive
//! quantity. Verification additionally checks the quantity limit and that a
//! print file is attached.

use crate::{ServiceError, ServiceFactory, ServiceInterface, ServiceRegistry, ValidationResults};
use async_trait::async_trait;
use lifecycle_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Process, Schema, ValidationError,
};
use serde_json::{Map, Value};

const DEFAULT_MATERIALS: [&str; 4] = ["PLA", "PETG", "ABS", "NYLON"];

/// Additive manufacturing service plugin.
pub struct AdditiveService {
	/// Accepted materials, upper case.
	materials: Vec<String>,
	/// Largest quantity accepted for one order.
	max_quantity: u64,
}

impl AdditiveService {
	pub fn new(materials: Vec<String>, max_quantity: u64) -> Self {
		Self {
			materials: materials.into_iter().map(|m| m.to_uppercase()).collect(),
			max_quantity,
		}
	}

	fn material_supported(&self, details: &Map<String, Value>) -> bool {
		details
			.get("material")
			.and_then(Value::as_str)
			.is_some_and(|m| self.materials.contains(&m.to_uppercase()))
	}

	fn quantity(details: &Map<String, Value>) -> Option<u64> {
		details
			.get("quantity")
			.and_then(Value::as_u64)
			.filter(|q| *q > 0)
	}
}

/// Configuration schema for AdditiveService.
pub struct AdditiveServiceSchema;

impl ConfigSchema for AdditiveServiceSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("materials", FieldType::Array(Box::new(FieldType::String))),
				Field::new(
					"max_quantity",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
			],
		);
		schema.validate(config)
	}
}

#[async_trait]
impl ServiceInterface for AdditiveService {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(AdditiveServiceSchema)
	}

	fn service_ready(&self, details: &Map<String, Value>) -> bool {
		self.material_supported(details) && Self::quantity(details).is_some()
	}

	async fn validate(&self, process: &Process) -> Result<ValidationResults, ServiceError> {
		let details = &process.service_details;
		let mut results = ValidationResults::new();
		results.insert("material".into(), self.material_supported(details));
		results.insert(
			"quantity".into(),
			Self::quantity(details).is_some_and(|q| q <= self.max_quantity),
		);
		results.insert("files".into(), !process.files.is_empty());
		if details.contains_key("layerHeight") {
			let layer_ok = details
				.get("layerHeight")
				.and_then(Value::as_f64)
				.is_some_and(|h| h > 0.0 && h <= 1.0);
			results.insert("layerHeight".into(), layer_ok);
		}
		Ok(results)
	}
}

/// Factory function to create the additive service.
///
/// Configuration parameters:
/// - `materials`: accepted materials (default: PLA, PETG, ABS, NYLON)
/// - `max_quantity`: largest accepted quantity (default: 1000)
pub fn create_service(config: &toml::Value) -> Result<Box<dyn ServiceInterface>, ServiceError> {
	AdditiveServiceSchema
		.validate(config)
		.map_err(|e| ServiceError::InvalidConfig(e.to_string()))?;

	let materials = config
		.get("materials")
		.and_then(|v| v.as_array())
		.map(|items| {
			items
				.iter()
				.filter_map(|item| item.as_str().map(str::to_string))
				.collect()
		})
		.unwrap_or_else(|| DEFAULT_MATERIALS.iter().map(|m| m.to_string()).collect());
	let max_quantity = config
		.get("max_quantity")
		.and_then(|v| v.as_integer())
		.and_then(|v| u64::try_from(v).ok())
		.unwrap_or(1000);

	Ok(Box::new(AdditiveService::new(materials, max_quantity)))
}

/// Registry for the additive service implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "additive";
	type Factory = ServiceFactory;

	fn factory() -> Self::Factory {
		create_service
	}
}

impl ServiceRegistry for Registry {}
