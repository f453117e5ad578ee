//! Utility functions shared across the lifecycle crates.

pub mod formatting;

pub use formatting::truncate_id;

/// Current Unix time in seconds, zero if the clock is before the epoch.
pub fn current_timestamp() -> u64 {
	u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}
