//! Caller session carried through transitions and background jobs.

use serde::{Deserialize, Serialize};

/// Identifies the caller of a transition.
///
/// The session id scopes data held by the ephemeral gateway; background jobs
/// carry the triggering session so they re-enter the same store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Session {
	pub id: String,
	/// Authenticated user, if any.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_id: Option<String>,
}

impl Session {
	/// Session of an authenticated user.
	pub fn authenticated(id: impl Into<String>, user_id: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			user_id: Some(user_id.into()),
		}
	}

	/// Session without a logged in user.
	pub fn anonymous(id: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			user_id: None,
		}
	}
}
