use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{AlertService, Error, Result, events::AlertEvent};
use courtwatch_domain::{
	CompiledQuery, QuerySpec, Rate, StoredQuery,
	alert::{self, SECRET_KEY_LEN},
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateAlertRequest {
	pub user_id: i64,
	pub name: String,
	/// A query string object: `type`, optional `q`, optional `filter`.
	pub query: Value,
	pub rate: Rate,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateAlertResponse {
	pub alert: StoredQuery,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpdateAlertRequest {
	pub query_id: Uuid,
	pub user_id: i64,
	pub name: Option<String>,
	pub query: Option<Value>,
	pub rate: Option<Rate>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpdateAlertResponse {
	pub alert: StoredQuery,
	pub query_changed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAlertResponse {
	pub query_id: Uuid,
	pub deleted: bool,
}

fn compile(raw: &Value) -> Result<CompiledQuery> {
	Ok(QuerySpec::from_value(raw)?.compile()?)
}

/// 40 hex characters derived from fresh randomness and the alert identity.
fn generate_secret_key(query_id: Uuid, user_id: i64, now: OffsetDateTime) -> String {
	let mut hasher = blake3::Hasher::new();

	hasher.update(query_id.as_bytes());
	hasher.update(Uuid::new_v4().as_bytes());
	hasher.update(&user_id.to_le_bytes());
	hasher.update(&now.unix_timestamp_nanos().to_le_bytes());

	let mut key = hasher.finalize().to_hex().to_string();

	key.truncate(SECRET_KEY_LEN);

	key
}

impl AlertService {
	/// Accepts an alert only if its query compiles, then announces it for indexing.
	pub async fn create_alert(&self, req: CreateAlertRequest) -> Result<CreateAlertResponse> {
		let name = alert::normalize_alert_name(&req.name)?;
		let compiled = compile(&req.query)?;
		let now = self.now();
		let query_id = Uuid::new_v4();
		let stored = StoredQuery {
			query_id,
			user_id: req.user_id,
			name,
			query_string: compiled.canonical().clone(),
			rate: req.rate,
			secret_key: generate_secret_key(query_id, req.user_id, now),
			date_last_hit: None,
			created_at: now,
			updated_at: now,
		};

		let event =
			AlertEvent::QueryCommitted { query_id, compiled: Some(compiled.canonical().clone()) };

		self.backends.queries.insert(&stored, &event).await?;

		tracing::info!(%query_id, user_id = stored.user_id, rate = %stored.rate, "Alert created.");

		Ok(CreateAlertResponse { alert: stored })
	}

	/// Edits name, query or rate. The secret key never changes.
	///
	/// Hits already pending under a previous rate stay there and flush with that rate.
	pub async fn update_alert(&self, req: UpdateAlertRequest) -> Result<UpdateAlertResponse> {
		let mut stored = self.owned_alert(req.query_id, req.user_id).await?;
		let mut query_changed = false;

		if let Some(name) = &req.name {
			stored.name = alert::normalize_alert_name(name)?;
		}
		if let Some(raw) = &req.query {
			let canonical = compile(raw)?.canonical().clone();

			query_changed = canonical != stored.query_string;
			stored.query_string = canonical;
		}
		if let Some(rate) = req.rate {
			stored.rate = rate;
		}

		stored.updated_at = self.now();

		let event = AlertEvent::QueryCommitted {
			query_id: stored.query_id,
			compiled: Some(stored.query_string.clone()),
		};

		if !self.backends.queries.update(&stored, &event).await? {
			return Err(Error::NotFound { message: format!("alert {} not found.", req.query_id) });
		}

		tracing::info!(query_id = %stored.query_id, query_changed, "Alert updated.");

		Ok(UpdateAlertResponse { alert: stored, query_changed })
	}

	/// Deleting an alert that is already gone succeeds with `deleted: false`.
	pub async fn delete_alert(&self, query_id: Uuid, user_id: i64) -> Result<DeleteAlertResponse> {
		if let Some(stored) = self.backends.queries.get(query_id).await?
			&& stored.user_id != user_id
		{
			return Err(Error::NotFound { message: format!("alert {query_id} not found.") });
		}

		self.remove_alert(query_id).await
	}

	/// One-click removal through the link built from the alert's secret key.
	pub async fn unsubscribe(&self, secret_key: &str) -> Result<DeleteAlertResponse> {
		let stored = self
			.backends
			.queries
			.find_by_secret_key(secret_key.trim())
			.await?
			.ok_or_else(|| Error::NotFound { message: "no alert has this secret key.".to_string() })?;

		self.remove_alert(stored.query_id).await
	}

	pub async fn build_unsubscribe_token(&self, query_id: Uuid) -> Result<String> {
		let stored = self
			.backends
			.queries
			.get(query_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: format!("alert {query_id} not found.") })?;

		Ok(stored.secret_key)
	}

	async fn remove_alert(&self, query_id: Uuid) -> Result<DeleteAlertResponse> {
		// Queued even when the row was already gone.
		let event = AlertEvent::QueryCommitted { query_id, compiled: None };
		let deleted = self.backends.queries.delete(query_id, &event).await?;

		tracing::info!(%query_id, deleted, "Alert deleted.");

		Ok(DeleteAlertResponse { query_id, deleted })
	}

	async fn owned_alert(&self, query_id: Uuid, user_id: i64) -> Result<StoredQuery> {
		self.backends
			.queries
			.get(query_id)
			.await?
			.filter(|stored| stored.user_id == user_id)
			.ok_or_else(|| Error::NotFound { message: format!("alert {query_id} not found.") })
	}
}
