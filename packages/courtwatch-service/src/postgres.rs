//! Backends over the Postgres tables in `courtwatch-storage`.

use std::sync::Arc;

use sqlx::{PgConnection, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Backends, BoxFuture, Clock, DeliverySink, DocumentIndex, Error, NoveltyStore, PercolatorIndex,
	QueryStore, Result,
	events::AlertEvent,
	percolation::PercolatorMatch,
};
use courtwatch_domain::{
	CandidateDocument, CompiledQuery, DocumentType, IndexedDocument, MatchTarget, ParentDocument,
	Rate, StoredQuery,
};
use courtwatch_storage::{
	documents, novelty, outbox, percolator,
	models::{IndexedDocumentRow, ParentDocumentRow, StoredQueryRow},
	queries,
};

/// Rows read per round-trip while scanning percolator entries.
const PERCOLATE_SCAN_ROWS: i64 = 256;

fn corrupt(message: String) -> Error {
	Error::Storage { message }
}

fn unavailable(err: courtwatch_storage::Error) -> Error {
	Error::PercolationUnavailable { message: err.to_string() }
}

fn parse_document_type(raw: &str) -> Result<DocumentType> {
	raw.parse().map_err(corrupt)
}

fn stored_query_row(query: &StoredQuery) -> StoredQueryRow {
	StoredQueryRow {
		query_id: query.query_id,
		user_id: query.user_id,
		name: query.name.clone(),
		query_string: query.query_string.clone(),
		rate: query.rate.as_str().to_string(),
		secret_key: query.secret_key.clone(),
		date_last_hit: query.date_last_hit,
		created_at: query.created_at,
		updated_at: query.updated_at,
	}
}

fn stored_query(row: StoredQueryRow) -> Result<StoredQuery> {
	Ok(StoredQuery {
		query_id: row.query_id,
		user_id: row.user_id,
		name: row.name,
		query_string: row.query_string,
		rate: row.rate.parse::<Rate>().map_err(corrupt)?,
		secret_key: row.secret_key,
		date_last_hit: row.date_last_hit,
		created_at: row.created_at,
		updated_at: row.updated_at,
	})
}

fn candidate_document(row: IndexedDocumentRow) -> Result<CandidateDocument> {
	Ok(CandidateDocument {
		id: row.document_id,
		document_type: parse_document_type(&row.document_type)?,
		parent_id: row.parent_id,
		fields: serde_json::from_value(row.fields).map_err(|err| corrupt(err.to_string()))?,
		searchable_text: row.searchable_text,
	})
}

fn parent_document(row: ParentDocumentRow) -> Result<ParentDocument> {
	Ok(ParentDocument {
		id: row.parent_id,
		document_type: parse_document_type(&row.document_type)?,
		fields: serde_json::from_value(row.fields).map_err(|err| corrupt(err.to_string()))?,
	})
}

/// Stored queries in `stored_queries`. Writes enqueue their event into `alert_outbox` in the
/// same transaction.
pub struct PgQueryStore {
	pool: PgPool,
	clock: Arc<dyn Clock>,
}
impl PgQueryStore {
	async fn enqueue(&self, conn: &mut PgConnection, event: &AlertEvent) -> Result<()> {
		let payload = event.to_payload()?;
		let outbox_id =
			outbox::enqueue_alert_event(conn, event.kind().as_str(), &payload, self.clock.now())
				.await?;

		tracing::debug!(%outbox_id, kind = %event.kind(), "Alert event queued.");

		Ok(())
	}
}
impl QueryStore for PgQueryStore {
	fn insert<'a>(
		&'a self,
		query: &'a StoredQuery,
		event: &'a AlertEvent,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut tx = self.pool.begin().await?;

			queries::insert_stored_query(&mut *tx, &stored_query_row(query)).await?;
			self.enqueue(&mut *tx, event).await?;
			tx.commit().await?;

			Ok(())
		})
	}

	fn update<'a>(
		&'a self,
		query: &'a StoredQuery,
		event: &'a AlertEvent,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let mut tx = self.pool.begin().await?;

			if !queries::update_stored_query(&mut *tx, &stored_query_row(query)).await? {
				tx.rollback().await?;

				return Ok(false);
			}

			self.enqueue(&mut *tx, event).await?;
			tx.commit().await?;

			Ok(true)
		})
	}

	fn delete<'a>(&'a self, query_id: Uuid, event: &'a AlertEvent) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let mut tx = self.pool.begin().await?;
			let deleted = queries::delete_stored_query(&mut *tx, query_id).await?;

			self.enqueue(&mut *tx, event).await?;
			tx.commit().await?;

			Ok(deleted)
		})
	}

	fn get<'a>(&'a self, query_id: Uuid) -> BoxFuture<'a, Result<Option<StoredQuery>>> {
		Box::pin(async move {
			queries::get_stored_query(&self.pool, query_id).await?.map(stored_query).transpose()
		})
	}

	fn list_after<'a>(
		&'a self,
		after: Option<Uuid>,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<StoredQuery>>> {
		Box::pin(async move {
			queries::list_stored_queries_after(&self.pool, after, i64::from(limit))
				.await?
				.into_iter()
				.map(stored_query)
				.collect()
		})
	}

	fn find_by_secret_key<'a>(
		&'a self,
		secret_key: &'a str,
	) -> BoxFuture<'a, Result<Option<StoredQuery>>> {
		Box::pin(async move {
			queries::find_stored_query_by_secret_key(&self.pool, secret_key)
				.await?
				.map(stored_query)
				.transpose()
		})
	}

	fn touch_last_hit<'a>(
		&'a self,
		query_ids: &'a [Uuid],
		at: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			queries::touch_date_last_hit(&self.pool, query_ids, at).await?;

			Ok(())
		})
	}
}

/// Percolator entries in `percolator_queries`, matched in process.
///
/// Any storage failure here is reported as the percolator being unavailable.
pub struct PgPercolator {
	pool: PgPool,
	clock: Arc<dyn Clock>,
}
impl PercolatorIndex for PgPercolator {
	fn upsert<'a>(
		&'a self,
		query_id: Uuid,
		compiled: &'a CompiledQuery,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			percolator::upsert_percolator_entry(
				&self.pool,
				query_id,
				compiled.document_type().as_str(),
				compiled.canonical(),
				self.clock.now(),
			)
			.await
			.map_err(unavailable)
		})
	}

	fn remove<'a>(&'a self, query_id: Uuid) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			percolator::delete_percolator_entry(&self.pool, query_id).await.map_err(unavailable)
		})
	}

	fn percolate_page<'a>(
		&'a self,
		document: &'a IndexedDocument,
		after: Option<Uuid>,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<PercolatorMatch>>> {
		Box::pin(async move {
			let target = MatchTarget::new(document);
			let document_type = document.document_type.as_str();
			let mut matches = Vec::new();
			let mut position = after;

			loop {
				let entries = percolator::list_percolator_entries(
					&self.pool,
					document_type,
					position,
					PERCOLATE_SCAN_ROWS,
				)
				.await
				.map_err(unavailable)?;

				for entry in &entries {
					let compiled = match CompiledQuery::from_canonical(&entry.compiled) {
						Ok(compiled) => compiled,
						Err(err) => {
							tracing::warn!(
								query_id = %entry.query_id,
								error = %err,
								"Skipping percolator entry that no longer compiles."
							);

							continue;
						},
					};

					if compiled.matches(&target) {
						matches.push(PercolatorMatch {
							query_id: entry.query_id,
							snippet: compiled.snippet(&target),
						});

						if matches.len() >= limit as usize {
							return Ok(matches);
						}
					}
				}

				if entries.len() < PERCOLATE_SCAN_ROWS as usize {
					return Ok(matches);
				}

				position = entries.last().map(|entry| entry.query_id);
			}
		})
	}

	fn ids_after<'a>(&'a self, after: Option<Uuid>, limit: u32) -> BoxFuture<'a, Result<Vec<Uuid>>> {
		Box::pin(async move {
			percolator::list_percolator_ids_after(&self.pool, after, i64::from(limit))
				.await
				.map_err(unavailable)
		})
	}

	fn len<'a>(&'a self) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move {
			let count =
				percolator::count_percolator_entries(&self.pool).await.map_err(unavailable)?;

			Ok(count.max(0) as u64)
		})
	}
}

pub struct PgDocumentIndex {
	pool: PgPool,
	clock: Arc<dyn Clock>,
}
impl DocumentIndex for PgDocumentIndex {
	fn put<'a>(&'a self, document: &'a CandidateDocument) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let row = IndexedDocumentRow {
				document_id: document.id,
				document_type: document.document_type.as_str().to_string(),
				parent_id: document.parent_id,
				fields: serde_json::to_value(&document.fields)?,
				searchable_text: document.searchable_text.clone(),
				updated_at: self.clock.now(),
			};

			documents::upsert_indexed_document(&self.pool, &row).await?;

			Ok(())
		})
	}

	fn get<'a>(&'a self, document_id: i64) -> BoxFuture<'a, Result<Option<CandidateDocument>>> {
		Box::pin(async move {
			documents::get_indexed_document(&self.pool, document_id)
				.await?
				.map(candidate_document)
				.transpose()
		})
	}

	fn put_parent<'a>(&'a self, parent: &'a ParentDocument) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let row = ParentDocumentRow {
				parent_id: parent.id,
				document_type: parent.document_type.as_str().to_string(),
				fields: serde_json::to_value(&parent.fields)?,
				updated_at: self.clock.now(),
			};

			documents::upsert_parent_document(&self.pool, &row).await?;

			Ok(())
		})
	}

	fn get_parent<'a>(&'a self, parent_id: i64) -> BoxFuture<'a, Result<Option<ParentDocument>>> {
		Box::pin(async move {
			documents::get_parent_document(&self.pool, parent_id).await?.map(parent_document).transpose()
		})
	}

	fn children_of<'a>(&'a self, parent_id: i64) -> BoxFuture<'a, Result<Vec<CandidateDocument>>> {
		Box::pin(async move {
			documents::list_child_documents(&self.pool, parent_id)
				.await?
				.into_iter()
				.map(candidate_document)
				.collect()
		})
	}
}

pub struct PgNoveltyStore {
	pool: PgPool,
}
impl NoveltyStore for PgNoveltyStore {
	fn add_to_set<'a>(
		&'a self,
		key: &'a str,
		member: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move { Ok(novelty::add_set_member(&self.pool, key, member, now).await?) })
	}

	fn is_member<'a>(&'a self, key: &'a str, member: &'a str) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move { Ok(novelty::has_set_member(&self.pool, key, member).await?) })
	}

	fn pop_and_clear_set<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move { Ok(novelty::pop_set(&self.pool, key).await?) })
	}

	fn peek_set<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move { Ok(novelty::peek_set(&self.pool, key).await?) })
	}

	fn set_keys<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move { Ok(novelty::list_set_keys(&self.pool, prefix).await?) })
	}

	fn set_guard_if_absent<'a>(
		&'a self,
		key: &'a str,
		expires_at: OffsetDateTime,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			Ok(novelty::set_guard_if_absent(&self.pool, key, expires_at, now).await?)
		})
	}

	fn purge_expired_guards<'a>(&'a self, now: OffsetDateTime) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move { Ok(novelty::purge_expired_guards(&self.pool, now).await?) })
	}
}

impl Backends {
	pub fn postgres(pool: PgPool, delivery: Arc<dyn DeliverySink>, clock: Arc<dyn Clock>) -> Self {
		Self {
			queries: Arc::new(PgQueryStore { pool: pool.clone(), clock: clock.clone() }),
			percolator: Arc::new(PgPercolator { pool: pool.clone(), clock: clock.clone() }),
			documents: Arc::new(PgDocumentIndex { pool: pool.clone(), clock: clock.clone() }),
			novelty: Arc::new(PgNoveltyStore { pool }),
			delivery,
			clock,
		}
	}
}
