//! Process status vocabulary.
//!
//! Every status carries a symbolic name, used for dispatch and in action
//! names, and a stable integer code, which is what gets persisted. Codes are
//! grouped by hundreds per macro-stage and the gaps are reserved.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised when translating persisted or symbolic status values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StatusError {
	/// A persisted code that is not part of the vocabulary.
	#[error("Unknown process status code: {0}")]
	UnknownCode(i64),
	/// A symbolic name that is not part of the vocabulary.
	#[error("Unknown process status name: {0}")]
	UnknownName(String),
}

/// Lifecycle status of a process.
///
/// Ordering follows the integer code, so `status >= ProcessStatus::Completed`
/// reads the same way it does on persisted data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum ProcessStatus {
	Draft,
	WaitingForOtherProcess,
	ServiceReady,
	ServiceInProgress,
	ServiceComplication,
	ContractorSelected,
	Verifying,
	VerificationFailed,
	VerificationCompleted,
	Requested,
	Clarification,
	ConfirmedByContractor,
	RejectedByContractor,
	ConfirmedByClient,
	RejectedByClient,
	Production,
	Delivery,
	Dispute,
	Completed,
	Failed,
	Canceled,
}

impl ProcessStatus {
	/// Every status, in code order.
	pub const ALL: [ProcessStatus; 21] = [
		ProcessStatus::Draft,
		ProcessStatus::WaitingForOtherProcess,
		ProcessStatus::ServiceReady,
		ProcessStatus::ServiceInProgress,
		ProcessStatus::ServiceComplication,
		ProcessStatus::ContractorSelected,
		ProcessStatus::Verifying,
		ProcessStatus::VerificationFailed,
		ProcessStatus::VerificationCompleted,
		ProcessStatus::Requested,
		ProcessStatus::Clarification,
		ProcessStatus::ConfirmedByContractor,
		ProcessStatus::RejectedByContractor,
		ProcessStatus::ConfirmedByClient,
		ProcessStatus::RejectedByClient,
		ProcessStatus::Production,
		ProcessStatus::Delivery,
		ProcessStatus::Dispute,
		ProcessStatus::Completed,
		ProcessStatus::Failed,
		ProcessStatus::Canceled,
	];

	/// Returns the persisted integer code.
	pub fn code(&self) -> i64 {
		match self {
			ProcessStatus::Draft => 0,
			ProcessStatus::WaitingForOtherProcess => 100,
			ProcessStatus::ServiceReady => 200,
			ProcessStatus::ServiceInProgress => 201,
			ProcessStatus::ServiceComplication => 202,
			ProcessStatus::ContractorSelected => 300,
			ProcessStatus::Verifying => 400,
			ProcessStatus::VerificationFailed => 401,
			ProcessStatus::VerificationCompleted => 402,
			ProcessStatus::Requested => 600,
			ProcessStatus::Clarification => 601,
			ProcessStatus::ConfirmedByContractor => 700,
			ProcessStatus::RejectedByContractor => 701,
			ProcessStatus::ConfirmedByClient => 702,
			ProcessStatus::RejectedByClient => 703,
			ProcessStatus::Production => 800,
			ProcessStatus::Delivery => 900,
			ProcessStatus::Dispute => 1000,
			ProcessStatus::Completed => 1001,
			ProcessStatus::Failed => 1002,
			ProcessStatus::Canceled => 1003,
		}
	}

	/// Returns the symbolic name used for dispatch.
	pub fn name(&self) -> &'static str {
		match self {
			ProcessStatus::Draft => "DRAFT",
			ProcessStatus::WaitingForOtherProcess => "WAITING_FOR_OTHER_PROCESS",
			ProcessStatus::ServiceReady => "SERVICE_READY",
			ProcessStatus::ServiceInProgress => "SERVICE_IN_PROGRESS",
			ProcessStatus::ServiceComplication => "SERVICE_COMPLICATION",
			ProcessStatus::ContractorSelected => "CONTRACTOR_SELECTED",
			ProcessStatus::Verifying => "VERIFYING",
			ProcessStatus::VerificationFailed => "VERIFICATION_FAILED",
			ProcessStatus::VerificationCompleted => "VERIFICATION_COMPLETED",
			ProcessStatus::Requested => "REQUESTED",
			ProcessStatus::Clarification => "CLARIFICATION",
			ProcessStatus::ConfirmedByContractor => "CONFIRMED_BY_CONTRACTOR",
			ProcessStatus::RejectedByContractor => "REJECTED_BY_CONTRACTOR",
			ProcessStatus::ConfirmedByClient => "CONFIRMED_BY_CLIENT",
			ProcessStatus::RejectedByClient => "REJECTED_BY_CLIENT",
			ProcessStatus::Production => "PRODUCTION",
			ProcessStatus::Delivery => "DELIVERY",
			ProcessStatus::Dispute => "DISPUTE",
			ProcessStatus::Completed => "COMPLETED",
			ProcessStatus::Failed => "FAILED",
			ProcessStatus::Canceled => "CANCELED",
		}
	}

	/// Resolves a persisted code. Codes outside the vocabulary are corrupt data.
	pub fn from_code(code: i64) -> Result<Self, StatusError> {
		Self::ALL
			.iter()
			.copied()
			.find(|status| status.code() == code)
			.ok_or(StatusError::UnknownCode(code))
	}

	/// Resolves a symbolic name.
	pub fn from_name(name: &str) -> Result<Self, StatusError> {
		Self::ALL
			.iter()
			.copied()
			.find(|status| status.name() == name)
			.ok_or_else(|| StatusError::UnknownName(name.to_string()))
	}

	/// COMPLETED, FAILED and CANCELED end the lifecycle.
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			ProcessStatus::Completed | ProcessStatus::Failed | ProcessStatus::Canceled
		)
	}
}

impl PartialOrd for ProcessStatus {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for ProcessStatus {
	fn cmp(&self, other: &Self) -> Ordering {
		self.code().cmp(&other.code())
	}
}

impl TryFrom<i64> for ProcessStatus {
	type Error = StatusError;

	fn try_from(code: i64) -> Result<Self, Self::Error> {
		Self::from_code(code)
	}
}

impl From<ProcessStatus> for i64 {
	fn from(status: ProcessStatus) -> Self {
		status.code()
	}
}

impl FromStr for ProcessStatus {
	type Err = StatusError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::from_name(s)
	}
}

impl fmt::Display for ProcessStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_codes_are_unique_and_ordered() {
		let codes: Vec<i64> = ProcessStatus::ALL.iter().map(|s| s.code()).collect();
		let mut sorted = codes.clone();
		sorted.sort_unstable();
		sorted.dedup();
		assert_eq!(codes, sorted);
	}

	#[test]
	fn test_name_and_code_resolution() {
		for status in ProcessStatus::ALL {
			assert_eq!(ProcessStatus::from_code(status.code()).unwrap(), status);
			assert_eq!(status.name().parse::<ProcessStatus>().unwrap(), status);
		}
	}

	#[test]
	fn test_unknown_code_is_rejected() {
		assert_eq!(
			ProcessStatus::from_code(500),
			Err(StatusError::UnknownCode(500))
		);
		assert!(serde_json::from_str::<ProcessStatus>("42").is_err());
	}

	#[test]
	fn test_serializes_as_code() {
		let json = serde_json::to_string(&ProcessStatus::VerificationCompleted).unwrap();
		assert_eq!(json, "402");
		let status: ProcessStatus = serde_json::from_str("1001").unwrap();
		assert_eq!(status, ProcessStatus::Completed);
	}

	#[test]
	fn test_ordering_follows_codes() {
		assert!(ProcessStatus::Failed >= ProcessStatus::Completed);
		assert!(ProcessStatus::VerificationFailed < ProcessStatus::VerificationCompleted);
		assert!(ProcessStatus::Requested > ProcessStatus::VerificationCompleted);
	}
}
