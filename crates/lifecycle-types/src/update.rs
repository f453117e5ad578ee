//! Update tags accepted by the persistence gateway.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of process fields a gateway update or deletion may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateType {
	Messages,
	Files,
	ServiceDetails,
	ServiceType,
	ServiceStatus,
	ProcessDetails,
	ProcessStatus,
	ProvisionalContractor,
	DependenciesIn,
	DependenciesOut,
}

impl UpdateType {
	/// Returns the wire tag.
	pub fn as_str(&self) -> &'static str {
		match self {
			UpdateType::Messages => "messages",
			UpdateType::Files => "files",
			UpdateType::ServiceDetails => "serviceDetails",
			UpdateType::ServiceType => "serviceType",
			UpdateType::ServiceStatus => "serviceStatus",
			UpdateType::ProcessDetails => "processDetails",
			UpdateType::ProcessStatus => "processStatus",
			UpdateType::ProvisionalContractor => "provisionalContractor",
			UpdateType::DependenciesIn => "dependenciesIn",
			UpdateType::DependenciesOut => "dependenciesOut",
		}
	}

	/// Returns an iterator over all tags.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Messages,
			Self::Files,
			Self::ServiceDetails,
			Self::ServiceType,
			Self::ServiceStatus,
			Self::ProcessDetails,
			Self::ProcessStatus,
			Self::ProvisionalContractor,
			Self::DependenciesIn,
			Self::DependenciesOut,
		]
		.into_iter()
	}
}

impl FromStr for UpdateType {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::all()
			.find(|tag| tag.as_str() == s)
			.ok_or_else(|| format!("Unknown update type: {}", s))
	}
}

impl fmt::Display for UpdateType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
