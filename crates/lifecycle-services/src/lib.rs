//! Service plugins for the process lifecycle system.
//!
//! A service plugin knows one kind of manufacturing service. The lifecycle
//! asks it two things: whether a service definition is complete, and, during
//! verification, which validation steps pass. Everything else about a
//! service is opaque to the state machine.

use async_trait::async_trait;
use lifecycle_types::{ConfigSchema, ImplementationRegistry, Process};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod additive;
	pub mod checklist;
}

/// Errors that can occur in service plugins.
#[derive(Debug, Error)]
pub enum ServiceError {
	/// No plugin is configured for the service type.
	#[error("Unknown service type: {0}")]
	UnknownService(String),
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),
	/// A validation step could not be evaluated at all.
	#[error("Validation error: {0}")]
	Validation(String),
}

/// Per-step outcome of a verification, keyed by step name.
pub type ValidationResults = BTreeMap<String, bool>;

/// Trait defining the interface for service plugins.
#[async_trait]
pub trait ServiceInterface: Send + Sync {
	/// Returns the configuration schema for this plugin.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Whether the service definition carries everything needed to order it.
	fn service_ready(&self, details: &Map<String, Value>) -> bool;

	/// Runs the plugin's validation steps against a process.
	async fn validate(&self, process: &Process) -> Result<ValidationResults, ServiceError>;
}

/// Type alias for service factory functions.
pub type ServiceFactory = fn(&toml::Value) -> Result<Box<dyn ServiceInterface>, ServiceError>;

/// Registry trait for service implementations.
pub trait ServiceRegistry: ImplementationRegistry<Factory = ServiceFactory> {}

/// Get all registered service implementations.
pub fn get_all_implementations() -> Vec<(&'static str, ServiceFactory)> {
	use implementations::{additive, checklist};

	vec![
		(additive::Registry::NAME, additive::Registry::factory()),
		(checklist::Registry::NAME, checklist::Registry::factory()),
	]
}

/// Configuration key selecting the implementation for a service type.
///
/// When absent the service type itself names the implementation.
pub const IMPLEMENTATION_KEY: &str = "implementation";

/// Plugins keyed by the service type they handle.
#[derive(Default)]
pub struct ServiceCatalog {
	services: HashMap<String, Box<dyn ServiceInterface>>,
}

impl ServiceCatalog {
	pub fn new(services: HashMap<String, Box<dyn ServiceInterface>>) -> Self {
		Self { services }
	}

	/// Builds a catalog from `[services.implementations.<type>]` tables.
	pub fn from_config(
		configs: &HashMap<String, toml::Value>,
		factories: &HashMap<String, ServiceFactory>,
	) -> Result<Self, ServiceError> {
		let mut services = HashMap::new();
		for (service_type, config) in configs {
			let implementation = config
				.get(IMPLEMENTATION_KEY)
				.and_then(|v| v.as_str())
				.unwrap_or(service_type.as_str());
			let factory = factories.get(implementation).ok_or_else(|| {
				ServiceError::InvalidConfig(format!(
					"Service '{}' uses unknown implementation '{}'",
					service_type, implementation
				))
			})?;
			services.insert(service_type.clone(), factory(config)?);
			tracing::info!(
				component = "services",
				service_type = %service_type,
				implementation = %implementation,
				"Loaded"
			);
		}
		Ok(Self { services })
	}

	pub fn get(&self, service_type: &str) -> Result<&dyn ServiceInterface, ServiceError> {
		self.services
			.get(service_type)
			.map(|service| service.as_ref())
			.ok_or_else(|| ServiceError::UnknownService(service_type.to_string()))
	}

	/// Readiness of a process's service definition.
	///
	/// False without a chosen service or without a plugin for it.
	pub fn service_ready(&self, process: &Process) -> bool {
		if !process.has_service() {
			return false;
		}
		match self.get(&process.service_type) {
			Ok(service) => service.service_ready(&process.service_details),
			Err(e) => {
				tracing::warn!(error = %e, "Service readiness unknown");
				false
			}
		}
	}

	pub async fn validate(&self, process: &Process) -> Result<ValidationResults, ServiceError> {
		self.get(&process.service_type)?.validate(process).await
	}

	pub fn service_types(&self) -> impl Iterator<Item = &str> {
		self.services.keys().map(String::as_str)
	}
}

/// True for values that count as filled in: not null, not an empty string
/// or collection.
pub(crate) fn is_filled(value: Option<&Value>) -> bool {
	match value {
		None | Some(Value::Null) => false,
		Some(Value::String(s)) => !s.trim().is_empty(),
		Some(Value::Array(items)) => !items.is_empty(),
		Some(Value::Object(map)) => !map.is_empty(),
		Some(_) => true,
	}
}
