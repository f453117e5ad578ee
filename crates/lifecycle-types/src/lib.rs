//! Common types for the process lifecycle system.
//!
//! This crate defines the data shared by every lifecycle component: the
//! status vocabulary, process and project records, gateway update tags,
//! sessions, background jobs, events and configuration validation.

/// Event types published on the engine's event bus.
pub mod events;
/// Background jobs and the queue that carries them.
pub mod jobs;
/// Process and project records.
pub mod process;
/// Registry trait for pluggable implementations.
pub mod registry;
/// Caller sessions.
pub mod session;
/// The process status vocabulary.
pub mod status;
/// Storage namespaces.
pub mod storage;
/// Gateway update tags.
pub mod update;
/// Utility functions.
pub mod utils;
/// Configuration validation types.
pub mod validation;

pub use events::*;
pub use jobs::*;
pub use process::*;
pub use registry::ImplementationRegistry;
pub use session::Session;
pub use status::{ProcessStatus, StatusError};
pub use storage::StorageKey;
pub use update::UpdateType;
pub use utils::{current_timestamp, truncate_id};
pub use validation::*;
