use serde_json::Value;
use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, models::PercolatorEntry};

/// Inserts or replaces an entry. Returns `false` when the stored form was already identical.
pub async fn upsert_percolator_entry<'e, E>(
	executor: E,
	query_id: Uuid,
	document_type: &str,
	compiled: &Value,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
INSERT INTO percolator_queries (query_id, document_type, compiled, updated_at)
VALUES ($1,$2,$3,$4)
ON CONFLICT (query_id) DO UPDATE
SET document_type = EXCLUDED.document_type,
\tcompiled = EXCLUDED.compiled,
\tupdated_at = EXCLUDED.updated_at
WHERE percolator_queries.document_type IS DISTINCT FROM EXCLUDED.document_type
\tOR percolator_queries.compiled IS DISTINCT FROM EXCLUDED.compiled",
	)
	.bind(query_id)
	.bind(document_type)
	.bind(compiled)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() > 0)
}

pub async fn delete_percolator_entry<'e, E>(executor: E, query_id: Uuid) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query("DELETE FROM percolator_queries WHERE query_id = $1")
		.bind(query_id)
		.execute(executor)
		.await?;

	Ok(result.rows_affected() > 0)
}

/// Entries for one document type after `after`, in ascending id order.
pub async fn list_percolator_entries<'e, E>(
	executor: E,
	document_type: &str,
	after: Option<Uuid>,
	limit: i64,
) -> Result<Vec<PercolatorEntry>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, PercolatorEntry>(
		"\
SELECT query_id, document_type, compiled, updated_at
FROM percolator_queries
WHERE document_type = $1 AND ($2::uuid IS NULL OR query_id > $2)
ORDER BY query_id ASC
LIMIT $3",
	)
	.bind(document_type)
	.bind(after)
	.bind(limit)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn list_percolator_ids_after<'e, E>(
	executor: E,
	after: Option<Uuid>,
	limit: i64,
) -> Result<Vec<Uuid>>
where
	E: PgExecutor<'e>,
{
	let ids = sqlx::query_scalar::<_, Uuid>(
		"\
SELECT query_id
FROM percolator_queries
WHERE $1::uuid IS NULL OR query_id > $1
ORDER BY query_id ASC
LIMIT $2",
	)
	.bind(after)
	.bind(limit)
	.fetch_all(executor)
	.await?;

	Ok(ids)
}

pub async fn count_percolator_entries<'e, E>(executor: E) -> Result<i64>
where
	E: PgExecutor<'e>,
{
	let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM percolator_queries")
		.fetch_one(executor)
		.await?;

	Ok(count)
}
