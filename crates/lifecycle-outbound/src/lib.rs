//! Outbound side effects of the process lifecycle system.
//!
//! Two interfaces leave the system: notification mail and remote file
//! transfer. Both are invoked only from background jobs, never on the
//! transition path.

use async_trait::async_trait;
use lifecycle_types::{ConfigSchema, ImplementationRegistry, Mail, ProcessFile};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod mail {
		pub mod log;
		pub mod memory;
	}
	pub mod files {
		pub mod directory;
		pub mod memory;
	}
}

/// Errors that can occur when talking to outbound collaborators.
#[derive(Debug, Error)]
pub enum OutboundError {
	/// A failure worth retrying, e.g. an unreachable server.
	#[error("Delivery failed: {0}")]
	Delivery(String),
	/// The collaborator refused the request; retrying will not help.
	#[error("Rejected: {0}")]
	Rejected(String),
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),
}

impl OutboundError {
	pub fn is_transient(&self) -> bool {
		matches!(self, OutboundError::Delivery(_))
	}
}

/// Trait defining the interface for notification mailers.
#[async_trait]
pub trait MailerInterface: Send + Sync {
	/// Returns the configuration schema for this mailer.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Hands one mail to the transport.
	async fn send(&self, mail: &Mail) -> Result<(), OutboundError>;
}

/// Trait defining the interface for remote file storage.
#[async_trait]
pub trait FileTransferInterface: Send + Sync {
	/// Returns the configuration schema for this transfer.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Copies a local file to remote storage and returns its remote path.
	async fn upload(&self, process_id: &str, file: &ProcessFile) -> Result<String, OutboundError>;
}

/// Type alias for mailer factory functions.
pub type MailerFactory = fn(&toml::Value) -> Result<Box<dyn MailerInterface>, OutboundError>;

/// Type alias for file transfer factory functions.
pub type FileTransferFactory =
	fn(&toml::Value) -> Result<Box<dyn FileTransferInterface>, OutboundError>;

/// Registry trait for mailer implementations.
pub trait MailerRegistry: ImplementationRegistry<Factory = MailerFactory> {}

/// Registry trait for file transfer implementations.
pub trait FileTransferRegistry: ImplementationRegistry<Factory = FileTransferFactory> {}

/// Get all registered mailer implementations.
pub fn get_all_mailer_implementations() -> Vec<(&'static str, MailerFactory)> {
	use implementations::mail::{log, memory};

	vec![
		(log::Registry::NAME, log::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Get all registered file transfer implementations.
pub fn get_all_file_transfer_implementations() -> Vec<(&'static str, FileTransferFactory)> {
	use implementations::files::{directory, memory};

	vec![
		(directory::Registry::NAME, directory::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}
