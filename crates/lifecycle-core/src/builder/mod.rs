//! Builder for assembling a lifecycle engine.
//!
//! Every pluggable component is created from its configuration table by a
//! factory looked up by implementation name. The builder wires storage, the
//! persistence gateway, service plugins and outbound adapters into a
//! [`TransitionEngine`] and the [`TaskRunner`] that executes its jobs.

use crate::engine::{event_bus::EventBus, lifecycle::Lifecycle, runner::TaskRunner, TransitionEngine};
use crate::handlers::{JobHandlers, MailHandler, MigrationHandler, RetryPolicy, VerificationHandler};
use crate::state::StateTable;
use lifecycle_config::Config;
use lifecycle_gateway::{GatewayFactory, GatewayOptions, PersistenceGateway};
use lifecycle_outbound::{FileTransferFactory, FileTransferInterface, MailerFactory, MailerInterface};
use lifecycle_services::{ServiceCatalog, ServiceFactory};
use lifecycle_storage::{StorageFactory, StorageService};
use lifecycle_types::JobQueue;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while assembling the engine.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every pluggable component, keyed by implementation name.
#[derive(Default)]
pub struct LifecycleFactories {
	pub storage_factories: HashMap<String, StorageFactory>,
	pub gateway_factories: HashMap<String, GatewayFactory>,
	pub service_factories: HashMap<String, ServiceFactory>,
	pub mailer_factories: HashMap<String, MailerFactory>,
	pub file_transfer_factories: HashMap<String, FileTransferFactory>,
}

impl LifecycleFactories {
	/// Factories for every implementation shipped with the workspace.
	pub fn registered() -> Self {
		fn collect<F>(entries: Vec<(&'static str, F)>) -> HashMap<String, F> {
			entries
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect()
		}

		Self {
			storage_factories: collect(lifecycle_storage::get_all_implementations()),
			gateway_factories: collect(lifecycle_gateway::get_all_implementations()),
			service_factories: collect(lifecycle_services::get_all_implementations()),
			mailer_factories: collect(lifecycle_outbound::get_all_mailer_implementations()),
			file_transfer_factories: collect(
				lifecycle_outbound::get_all_file_transfer_implementations(),
			),
		}
	}
}

/// Builder for a [`Lifecycle`] with pluggable implementations.
pub struct LifecycleBuilder {
	config: Config,
}

impl LifecycleBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	pub fn build(self, factories: LifecycleFactories) -> Result<Lifecycle, BuilderError> {
		let config = &self.config;
		let (jobs, receiver) = JobQueue::new();
		let event_bus = EventBus::new(config.engine.event_capacity);

		let storage_backend = load_primary(
			"storage",
			&config.storage.primary,
			&config.storage.implementations,
			&factories.storage_factories,
		)?;
		let storage = StorageService::new(storage_backend);

		let gateway_name = &config.gateway.primary;
		let gateway_factory = factories.gateway_factories.get(gateway_name).ok_or_else(|| {
			BuilderError::MissingComponent(format!("gateway implementation '{}'", gateway_name))
		})?;
		let options = GatewayOptions {
			session_ttl: Duration::from_secs(config.gateway.session_ttl_seconds),
		};
		let gateway: Arc<dyn PersistenceGateway> =
			Arc::from(gateway_factory(storage, jobs.clone(), &options));
		tracing::info!(component = "gateway", implementation = %gateway.name(), "Loaded");

		let services = ServiceCatalog::from_config(
			&config.services.implementations,
			&factories.service_factories,
		)
		.map_err(|e| {
			tracing::error!(component = "services", error = %e, "Failed to create service plugins");
			BuilderError::Config(format!("Failed to create service plugins: {}", e))
		})?;
		if services.service_types().next().is_none() {
			tracing::warn!("No service plugins configured - no process will ever become ready");
		}

		let mailer: Arc<dyn MailerInterface> = Arc::from(load_primary(
			"mail",
			&config.mail.primary,
			&config.mail.implementations,
			&factories.mailer_factories,
		)?);
		let transfer: Arc<dyn FileTransferInterface> = Arc::from(load_primary(
			"files",
			&config.files.primary,
			&config.files.implementations,
			&factories.file_transfer_factories,
		)?);

		let engine = Arc::new(TransitionEngine::new(
			gateway.clone(),
			Arc::new(StateTable::standard()),
			Arc::new(services),
			jobs.clone(),
			event_bus.clone(),
		));

		let policy = RetryPolicy {
			initial_interval: Duration::from_millis(config.retry.initial_interval_ms),
			max_elapsed: Duration::from_secs(config.retry.max_elapsed_seconds),
		};
		let handlers = JobHandlers::new(
			engine.clone(),
			VerificationHandler::new(
				engine.clone(),
				jobs,
				Duration::from_secs(config.engine.verification_timeout_seconds),
			),
			MigrationHandler::new(gateway, transfer, policy, event_bus.clone()),
			MailHandler::new(mailer, policy, event_bus),
		);
		let runner = TaskRunner::new(
			receiver,
			Arc::new(handlers),
			config.engine.max_concurrent_jobs,
		);

		tracing::info!(engine_id = %config.engine.id, "Lifecycle engine assembled");
		Ok(Lifecycle::new(
			engine,
			runner,
			Duration::from_secs(config.storage.cleanup_interval_seconds),
		))
	}
}

/// Creates the primary implementation of one pluggable section.
fn load_primary<F, T, E>(
	component: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
) -> Result<T, BuilderError>
where
	F: Fn(&toml::Value) -> Result<T, E>,
	E: Display,
{
	let table = implementations.get(primary).ok_or_else(|| {
		BuilderError::Config(format!("No configuration for primary {} '{}'", component, primary))
	})?;
	let factory = factories.get(primary).ok_or_else(|| {
		BuilderError::MissingComponent(format!("{} implementation '{}'", component, primary))
	})?;

	match factory(table) {
		Ok(implementation) => {
			tracing::info!(component = %component, implementation = %primary, "Loaded");
			Ok(implementation)
		}
		Err(e) => {
			tracing::error!(
				component = %component,
				implementation = %primary,
				error = %e,
				"Failed to create implementation"
			);
			Err(BuilderError::Config(format!(
				"Failed to create {} implementation '{}': {}",
				component, primary, e
			)))
		}
	}
}
