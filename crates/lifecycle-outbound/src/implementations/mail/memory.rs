//! Mailer that keeps every mail in memory. Useful in demos and tests.

use crate::{MailerFactory, MailerInterface, MailerRegistry, OutboundError};
use async_trait::async_trait;
use lifecycle_types::{ConfigSchema, ImplementationRegistry, Mail, Schema, ValidationError};
use std::sync::Arc;
use tokio::sync::Mutex;

/// In-memory mailer. Clones share one outbox.
#[derive(Clone, Default)]
pub struct MemoryMailer {
	outbox: Arc<Mutex<Vec<Mail>>>,
}

impl MemoryMailer {
	pub fn new() -> Self {
		Self::default()
	}

	/// Mails sent so far, oldest first.
	pub async fn sent(&self) -> Vec<Mail> {
		self.outbox.lock().await.clone()
	}
}

/// Configuration schema for MemoryMailer.
pub struct MemoryMailerSchema;

impl ConfigSchema for MemoryMailerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

#[async_trait]
impl MailerInterface for MemoryMailer {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryMailerSchema)
	}

	async fn send(&self, mail: &Mail) -> Result<(), OutboundError> {
		self.outbox.lock().await.push(mail.clone());
		Ok(())
	}
}

/// Factory function to create a memory mailer. No settings.
pub fn create_mailer(config: &toml::Value) -> Result<Box<dyn MailerInterface>, OutboundError> {
	MemoryMailerSchema
		.validate(config)
		.map_err(|e| OutboundError::InvalidConfig(e.to_string()))?;
	Ok(Box::new(MemoryMailer::new()))
}

/// Registry for the memory mailer implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = MailerFactory;

	fn factory() -> Self::Factory {
		create_mailer
	}
}

impl MailerRegistry for Registry {}
