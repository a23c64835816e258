use serde_json::Value;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredQueryRow {
	pub query_id: Uuid,
	pub user_id: i64,
	pub name: String,
	pub query_string: Value,
	pub rate: String,
	pub secret_key: String,
	pub date_last_hit: Option<OffsetDateTime>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PercolatorEntry {
	pub query_id: Uuid,
	pub document_type: String,
	pub compiled: Value,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IndexedDocumentRow {
	pub document_id: i64,
	pub document_type: String,
	pub parent_id: Option<i64>,
	pub fields: Value,
	pub searchable_text: String,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ParentDocumentRow {
	pub parent_id: i64,
	pub document_type: String,
	pub fields: Value,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AlertOutboxEntry {
	pub outbox_id: Uuid,
	pub event_kind: String,
	pub payload: Value,
	pub status: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DigestRunRow {
	pub rate: String,
	pub last_run_on: Date,
	pub updated_at: OffsetDateTime,
}
