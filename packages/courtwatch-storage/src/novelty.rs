//! Hit sets and real-time guards.
//!
//! Set adds are single-statement upserts, and popping a set is one `DELETE .. RETURNING`, so
//! concurrent writers never lose members and a flushed member is never returned twice.

use sqlx::PgExecutor;
use time::OffsetDateTime;

use crate::Result;

/// Returns `true` when the member was not yet in the set.
pub async fn add_set_member<'e, E>(
	executor: E,
	set_key: &str,
	member: &str,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
INSERT INTO novelty_sets (set_key, member, added_at)
VALUES ($1,$2,$3)
ON CONFLICT (set_key, member) DO NOTHING",
	)
	.bind(set_key)
	.bind(member)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() > 0)
}

pub async fn has_set_member<'e, E>(executor: E, set_key: &str, member: &str) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let found = sqlx::query_scalar::<_, bool>(
		"SELECT EXISTS (SELECT 1 FROM novelty_sets WHERE set_key = $1 AND member = $2)",
	)
	.bind(set_key)
	.bind(member)
	.fetch_one(executor)
	.await?;

	Ok(found)
}

pub async fn pop_set<'e, E>(executor: E, set_key: &str) -> Result<Vec<String>>
where
	E: PgExecutor<'e>,
{
	let mut members = sqlx::query_scalar::<_, String>(
		"DELETE FROM novelty_sets WHERE set_key = $1 RETURNING member",
	)
	.bind(set_key)
	.fetch_all(executor)
	.await?;

	members.sort();

	Ok(members)
}

pub async fn peek_set<'e, E>(executor: E, set_key: &str) -> Result<Vec<String>>
where
	E: PgExecutor<'e>,
{
	let members = sqlx::query_scalar::<_, String>(
		"SELECT member FROM novelty_sets WHERE set_key = $1 ORDER BY member ASC",
	)
	.bind(set_key)
	.fetch_all(executor)
	.await?;

	Ok(members)
}

/// Keys of every non-empty set whose key starts with `prefix`.
pub async fn list_set_keys<'e, E>(executor: E, prefix: &str) -> Result<Vec<String>>
where
	E: PgExecutor<'e>,
{
	let pattern = format!("{}%", escape_like(prefix));
	let keys = sqlx::query_scalar::<_, String>(
		"\
SELECT DISTINCT set_key
FROM novelty_sets
WHERE set_key LIKE $1 ESCAPE '\\'
ORDER BY set_key ASC",
	)
	.bind(pattern)
	.fetch_all(executor)
	.await?;

	Ok(keys)
}

/// Takes the guard unless an unexpired one exists. Returns `true` when taken.
pub async fn set_guard_if_absent<'e, E>(
	executor: E,
	guard_key: &str,
	expires_at: OffsetDateTime,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let taken = sqlx::query_scalar::<_, String>(
		"\
INSERT INTO novelty_guards (guard_key, expires_at)
VALUES ($1,$2)
ON CONFLICT (guard_key) DO UPDATE
SET expires_at = EXCLUDED.expires_at
WHERE novelty_guards.expires_at <= $3
RETURNING guard_key",
	)
	.bind(guard_key)
	.bind(expires_at)
	.bind(now)
	.fetch_optional(executor)
	.await?;

	Ok(taken.is_some())
}

pub async fn purge_expired_guards<'e, E>(executor: E, now: OffsetDateTime) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query("DELETE FROM novelty_guards WHERE expires_at <= $1")
		.bind(now)
		.execute(executor)
		.await?;

	Ok(result.rows_affected())
}

fn escape_like(raw: &str) -> String {
	let mut out = String::with_capacity(raw.len());

	for ch in raw.chars() {
		if matches!(ch, '%' | '_' | '\\') {
			out.push('\\');
		}

		out.push(ch);
	}

	out
}
