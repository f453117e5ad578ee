//! Storage-related types for the lifecycle system.

use std::str::FromStr;

/// Storage namespaces for different data collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Durable project records, processes included.
	Projects,
	/// Snapshots of ephemeral per-session stores.
	Sessions,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Projects => "projects",
			StorageKey::Sessions => "sessions",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Projects, Self::Sessions].into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::all().find(|key| key.as_str() == s).ok_or(())
	}
}
