use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, models::StoredQueryRow};

const STORED_QUERY_COLUMNS: &str = "\
query_id, user_id, name, query_string, rate, secret_key, date_last_hit, created_at, updated_at";

pub async fn insert_stored_query<'e, E>(executor: E, row: &StoredQueryRow) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO stored_queries (
\tquery_id,
\tuser_id,
\tname,
\tquery_string,
\trate,
\tsecret_key,
\tdate_last_hit,
\tcreated_at,
\tupdated_at
)
VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
	)
	.bind(row.query_id)
	.bind(row.user_id)
	.bind(&row.name)
	.bind(&row.query_string)
	.bind(&row.rate)
	.bind(&row.secret_key)
	.bind(row.date_last_hit)
	.bind(row.created_at)
	.bind(row.updated_at)
	.execute(executor)
	.await?;

	Ok(())
}

/// Updates the editable columns. The secret key and creation time never change.
pub async fn update_stored_query<'e, E>(executor: E, row: &StoredQueryRow) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE stored_queries
SET name = $1,
\tquery_string = $2,
\trate = $3,
\tupdated_at = $4
WHERE query_id = $5",
	)
	.bind(&row.name)
	.bind(&row.query_string)
	.bind(&row.rate)
	.bind(row.updated_at)
	.bind(row.query_id)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() > 0)
}

pub async fn delete_stored_query<'e, E>(executor: E, query_id: Uuid) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query("DELETE FROM stored_queries WHERE query_id = $1")
		.bind(query_id)
		.execute(executor)
		.await?;

	Ok(result.rows_affected() > 0)
}

pub async fn get_stored_query<'e, E>(executor: E, query_id: Uuid) -> Result<Option<StoredQueryRow>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, StoredQueryRow>(&format!(
		"SELECT {STORED_QUERY_COLUMNS} FROM stored_queries WHERE query_id = $1"
	))
	.bind(query_id)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}

pub async fn find_stored_query_by_secret_key<'e, E>(
	executor: E,
	secret_key: &str,
) -> Result<Option<StoredQueryRow>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, StoredQueryRow>(&format!(
		"SELECT {STORED_QUERY_COLUMNS} FROM stored_queries WHERE secret_key = $1"
	))
	.bind(secret_key)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}

/// Keyset page over every stored query in ascending id order.
pub async fn list_stored_queries_after<'e, E>(
	executor: E,
	after: Option<Uuid>,
	limit: i64,
) -> Result<Vec<StoredQueryRow>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, StoredQueryRow>(&format!(
		"\
SELECT {STORED_QUERY_COLUMNS}
FROM stored_queries
WHERE $1::uuid IS NULL OR query_id > $1
ORDER BY query_id ASC
LIMIT $2"
	))
	.bind(after)
	.bind(limit)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn touch_date_last_hit<'e, E>(
	executor: E,
	query_ids: &[Uuid],
	at: OffsetDateTime,
) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	if query_ids.is_empty() {
		return Ok(0);
	}

	let result = sqlx::query("UPDATE stored_queries SET date_last_hit = $1 WHERE query_id = ANY($2)")
		.bind(at)
		.bind(query_ids)
		.execute(executor)
		.await?;

	Ok(result.rows_affected())
}
