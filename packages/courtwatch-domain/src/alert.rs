use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{InvalidQueryError, rate::Rate};

pub const MAX_ALERT_NAME_CHARS: usize = 75;
pub const SECRET_KEY_LEN: usize = 40;

/// A user's saved search plus its delivery rate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredQuery {
	pub query_id: Uuid,
	pub user_id: i64,
	pub name: String,
	/// Canonical form of the query string, rewritten by every successful compile.
	pub query_string: Value,
	pub rate: Rate,
	pub secret_key: String,
	pub date_last_hit: Option<OffsetDateTime>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

/// Trims and checks an alert name.
pub fn normalize_alert_name(raw: &str) -> Result<String, InvalidQueryError> {
	let name = raw.trim();

	if name.is_empty() {
		return Err(InvalidQueryError::new("$.name", "alert name must be non-empty."));
	}
	if name.chars().count() > MAX_ALERT_NAME_CHARS {
		return Err(InvalidQueryError::new(
			"$.name",
			format!("alert name exceeds {MAX_ALERT_NAME_CHARS} characters."),
		));
	}

	Ok(name.to_string())
}
