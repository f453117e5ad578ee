//! Configuration module for the process lifecycle system.
//!
//! Configuration is a single TOML document. String values may reference
//! environment variables as `${VAR}` or `${VAR:-default}`; references are
//! resolved before parsing. Pluggable sections (`storage`, `services`, `mail`,
//! `files`) keep each implementation's table as raw TOML so the
//! implementation can validate it against its own schema.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message, drop the input dump
		ConfigError::Parse(err.message().to_string())
	}
}

/// Names accepted for `gateway.primary`.
pub const GATEWAY_IMPLEMENTATIONS: [&str; 2] = ["durable", "session"];

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Engine identity and background job limits.
	pub engine: EngineConfig,
	/// Which persistence gateway drives the state machine.
	pub gateway: GatewayConfig,
	/// Key/value storage backends.
	pub storage: StorageConfig,
	/// Service plugins keyed by service type.
	pub services: ServicesConfig,
	/// Mailer implementations.
	pub mail: PluginConfig,
	/// Remote file transfer implementations.
	pub files: PluginConfig,
	/// Retry policy for mail and file migration jobs.
	#[serde(default)]
	pub retry: RetryConfig,
}

/// Engine identity and background job limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
	/// Identifier used in logs.
	pub id: String,
	/// Upper bound on background jobs running at once.
	#[serde(default = "default_max_concurrent_jobs")]
	pub max_concurrent_jobs: usize,
	/// Time allowed for one service verification before it counts as failed.
	#[serde(default = "default_verification_timeout_seconds")]
	pub verification_timeout_seconds: u64,
	/// Capacity of the event bus broadcast channel.
	#[serde(default = "default_event_capacity")]
	pub event_capacity: usize,
}

fn default_max_concurrent_jobs() -> usize {
	100
}

fn default_verification_timeout_seconds() -> u64 {
	30
}

fn default_event_capacity() -> usize {
	1024
}

/// Persistence gateway selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
	/// `durable` or `session`.
	pub primary: String,
	/// Idle lifetime of data held by the session gateway.
	#[serde(default = "default_session_ttl_seconds")]
	pub session_ttl_seconds: u64,
}

fn default_session_ttl_seconds() -> u64 {
	3600
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Interval in seconds for cleaning up expired storage entries.
	pub cleanup_interval_seconds: u64,
}

/// Service plugin tables keyed by the service type they handle.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServicesConfig {
	#[serde(default)]
	pub implementations: HashMap<String, toml::Value>,
}

/// A pluggable section with one primary implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
}

/// Exponential backoff bounds for retried jobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
	#[serde(default = "default_initial_interval_ms")]
	pub initial_interval_ms: u64,
	/// Total time spent retrying one job; zero disables retries.
	#[serde(default = "default_max_elapsed_seconds")]
	pub max_elapsed_seconds: u64,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			initial_interval_ms: default_initial_interval_ms(),
			max_elapsed_seconds: default_max_elapsed_seconds(),
		}
	}
}

fn default_initial_interval_ms() -> u64 {
	500
}

fn default_max_elapsed_seconds() -> u64 {
	60
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of VAR_NAME and supports defaults
/// with ${VAR_NAME:-default_value}. Input is limited to 1MB.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last = 0;
	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)))
				}
			},
		};
		result.push_str(&input[last..full_match.start()]);
		result.push_str(&value);
		last = full_match.end();
	}
	result.push_str(&input[last..]);

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, resolving environment variables.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let content = tokio::fs::read_to_string(path.as_ref()).await?;
		resolve_env_vars(&content)?.parse()
	}

	/// Checks cross-section consistency that serde cannot express.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.engine.id.is_empty() {
			return Err(ConfigError::Validation("Engine ID cannot be empty".into()));
		}
		if self.engine.max_concurrent_jobs == 0 {
			return Err(ConfigError::Validation(
				"engine.max_concurrent_jobs must be at least 1".into(),
			));
		}
		if self.engine.verification_timeout_seconds == 0 {
			return Err(ConfigError::Validation(
				"engine.verification_timeout_seconds must be at least 1".into(),
			));
		}

		if !GATEWAY_IMPLEMENTATIONS.contains(&self.gateway.primary.as_str()) {
			return Err(ConfigError::Validation(format!(
				"Unknown gateway '{}', expected one of {:?}",
				self.gateway.primary, GATEWAY_IMPLEMENTATIONS
			)));
		}

		check_primary("storage", &self.storage.primary, &self.storage.implementations)?;
		if self.storage.cleanup_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"storage.cleanup_interval_seconds must be at least 1".into(),
			));
		}
		check_primary("mail", &self.mail.primary, &self.mail.implementations)?;
		check_primary("files", &self.files.primary, &self.files.implementations)?;

		Ok(())
	}
}

fn check_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{}.primary cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} implementation '{}' is not configured under [{}.implementations]",
			section, primary, section
		)));
	}
	Ok(())
}

impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let config: Config = toml::from_str(s)?;
		config.validate()?;
		Ok(config)
	}
}
