//! Last run day per scheduled digest rate, so a restarted worker knows what is still due.

use sqlx::PgExecutor;
use time::{Date, OffsetDateTime};

use crate::{Result, models::DigestRunRow};

pub async fn list_digest_runs<'e, E>(executor: E) -> Result<Vec<DigestRunRow>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, DigestRunRow>(
		"SELECT rate, last_run_on, updated_at FROM digest_runs ORDER BY rate",
	)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

/// Never moves a rate's last run backwards.
pub async fn record_digest_run<'e, E>(
	executor: E,
	rate: &str,
	run_on: Date,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO digest_runs (rate, last_run_on, updated_at)
VALUES ($1,$2,$3)
ON CONFLICT (rate) DO UPDATE
SET last_run_on = GREATEST(digest_runs.last_run_on, EXCLUDED.last_run_on),
	updated_at = EXCLUDED.updated_at",
	)
	.bind(rate)
	.bind(run_on)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}
