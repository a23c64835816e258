use serde_json::Value;
use sqlx::PgExecutor;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{Result, db::Db, models::AlertOutboxEntry};

/// Writes an event row. Call it with the transaction that commits the triggering change.
pub async fn enqueue_alert_event<'e, E>(
	executor: E,
	event_kind: &str,
	payload: &Value,
	now: OffsetDateTime,
) -> Result<Uuid>
where
	E: PgExecutor<'e>,
{
	let outbox_id = Uuid::new_v4();

	sqlx::query(
		"\
INSERT INTO alert_outbox (outbox_id, event_kind, payload, status, available_at, created_at, updated_at)
VALUES ($1,$2,$3,'PENDING',$4,$4,$4)",
	)
	.bind(outbox_id)
	.bind(event_kind)
	.bind(payload)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(outbox_id)
}

/// Claims the oldest available row under a lease. Expired leases are claimable again.
pub async fn claim_next_alert_event(
	db: &Db,
	now: OffsetDateTime,
	lease_seconds: i64,
) -> Result<Option<AlertOutboxEntry>> {
	let mut tx = db.pool.begin().await?;
	let row = sqlx::query_as::<_, AlertOutboxEntry>(
		"\
SELECT
\toutbox_id,
\tevent_kind,
\tpayload,
\tstatus,
\tattempts,
\tlast_error,
\tavailable_at,
\tcreated_at,
\tupdated_at
FROM alert_outbox
WHERE status IN ('PENDING','FAILED','CLAIMED') AND available_at <= $1
ORDER BY available_at ASC, created_at ASC
LIMIT 1
FOR UPDATE SKIP LOCKED",
	)
	.bind(now)
	.fetch_optional(&mut *tx)
	.await?;
	let job = if let Some(mut job) = row {
		let lease_until = now + Duration::seconds(lease_seconds);

		sqlx::query(
			"UPDATE alert_outbox SET status = 'CLAIMED', available_at = $1, updated_at = $2 WHERE outbox_id = $3",
		)
		.bind(lease_until)
		.bind(now)
		.bind(job.outbox_id)
		.execute(&mut *tx)
		.await?;

		job.status = "CLAIMED".to_string();
		job.available_at = lease_until;
		job.updated_at = now;

		Some(job)
	} else {
		None
	};

	tx.commit().await?;

	Ok(job)
}

pub async fn mark_alert_event_done(db: &Db, outbox_id: Uuid, now: OffsetDateTime) -> Result<()> {
	sqlx::query("UPDATE alert_outbox SET status = 'DONE', updated_at = $1 WHERE outbox_id = $2")
		.bind(now)
		.bind(outbox_id)
		.execute(&db.pool)
		.await?;

	Ok(())
}

pub async fn mark_alert_event_failed(
	db: &Db,
	outbox_id: Uuid,
	attempts: i32,
	error_text: &str,
	available_at: OffsetDateTime,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE alert_outbox
SET status = 'FAILED',
\tattempts = $1,
\tlast_error = $2,
\tavailable_at = $3,
\tupdated_at = $4
WHERE outbox_id = $5",
	)
	.bind(attempts)
	.bind(error_text)
	.bind(available_at)
	.bind(now)
	.bind(outbox_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

/// Parks a row for human follow-up. Dead rows are never claimed again.
pub async fn mark_alert_event_dead(
	db: &Db,
	outbox_id: Uuid,
	attempts: i32,
	error_text: &str,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE alert_outbox
SET status = 'DEAD',
\tattempts = $1,
\tlast_error = $2,
\tupdated_at = $3
WHERE outbox_id = $4",
	)
	.bind(attempts)
	.bind(error_text)
	.bind(now)
	.bind(outbox_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn purge_done_alert_events(db: &Db, older_than: OffsetDateTime) -> Result<u64> {
	let result = sqlx::query("DELETE FROM alert_outbox WHERE status = 'DONE' AND updated_at < $1")
		.bind(older_than)
		.execute(&db.pool)
		.await?;

	Ok(result.rows_affected())
}
