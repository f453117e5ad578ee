//! Mailer that writes notifications to the log.

use crate::{MailerFactory, MailerInterface, MailerRegistry, OutboundError};
use async_trait::async_trait;
use lifecycle_types::{
	truncate_id, ConfigSchema, Field, FieldType, ImplementationRegistry, Mail, Schema,
	ValidationError,
};

pub struct LogMailer {
	sender: String,
}

impl LogMailer {
	pub fn new(sender: impl Into<String>) -> Self {
		Self {
			sender: sender.into(),
		}
	}
}

/// Configuration schema for LogMailer.
pub struct LogMailerSchema;

impl ConfigSchema for LogMailerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![Field::new("sender", FieldType::String)]).validate(config)
	}
}

#[async_trait]
impl MailerInterface for LogMailer {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LogMailerSchema)
	}

	async fn send(&self, mail: &Mail) -> Result<(), OutboundError> {
		if mail.recipient.is_empty() {
			return Err(OutboundError::Rejected("empty recipient".into()));
		}
		tracing::info!(
			sender = %self.sender,
			recipient = %mail.recipient,
			process_id = %truncate_id(&mail.process_id),
			subject = %mail.subject,
			"Mail"
		);
		Ok(())
	}
}

/// Factory function to create a log mailer.
///
/// Configuration parameters:
/// - `sender`: sender shown in the log (default: "lifecycle")
pub fn create_mailer(config: &toml::Value) -> Result<Box<dyn MailerInterface>, OutboundError> {
	LogMailerSchema
		.validate(config)
		.map_err(|e| OutboundError::InvalidConfig(e.to_string()))?;
	let sender = config
		.get("sender")
		.and_then(|v| v.as_str())
		.unwrap_or("lifecycle");
	Ok(Box::new(LogMailer::new(sender)))
}

/// Registry for the log mailer implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "log";
	type Factory = MailerFactory;

	fn factory() -> Self::Factory {
		create_mailer
	}
}

impl MailerRegistry for Registry {}
