use std::{sync::Arc, time::Duration as StdDuration};

use time::{Date, Duration, OffsetDateTime, Weekday};
use tokio::time as tokio_time;

use courtwatch_domain::Rate;
use courtwatch_service::{AlertEvent, AlertService, EventBus};
use courtwatch_storage::{db::Db, models::AlertOutboxEntry, outbox, schedule};

use crate::Result;

const MAX_OUTBOX_ERROR_CHARS: usize = 1_024;

pub struct WorkerState {
	pub db: Db,
	pub bus: EventBus,
	pub service: Arc<AlertService>,
	pub cfg: courtwatch_config::Worker,
}

/// Remembers which scheduled rates already ran on which day.
///
/// Daily digests go out on every new day, weekly ones on Mondays and monthly ones on the first.
/// A rate with no recorded run is due on its next run day.
#[derive(Debug)]
struct DigestSchedule {
	last_runs: [(Rate, Option<Date>); 3],
}
impl DigestSchedule {
	fn from_runs(runs: &[(Rate, Date)]) -> Self {
		Self {
			last_runs: Rate::SCHEDULED.map(|rate| {
				let last = runs.iter().filter(|(ran, _)| *ran == rate).map(|(_, day)| *day).max();

				(rate, last)
			}),
		}
	}

	fn due(&self, today: Date) -> Vec<Rate> {
		self.last_runs
			.iter()
			.filter(|(rate, last)| last.is_none_or(|last| last < today) && runs_on(*rate, today))
			.map(|(rate, _)| *rate)
			.collect()
	}

	fn mark_run(&mut self, rate: Rate, today: Date) {
		for (scheduled, last) in &mut self.last_runs {
			if *scheduled == rate {
				*last = Some(today);
			}
		}
	}
}

async fn load_schedule(db: &Db) -> Result<DigestSchedule> {
	let mut runs = Vec::new();

	for row in schedule::list_digest_runs(&db.pool).await? {
		match row.rate.parse::<Rate>() {
			Ok(rate) => runs.push((rate, row.last_run_on)),
			Err(err) => {
				tracing::warn!(rate = %row.rate, error = %err, "Ignoring digest run with an unknown rate.");
			},
		}
	}

	Ok(DigestSchedule::from_runs(&runs))
}

/// Persists a finished scheduled flush so a restart on the same day does not repeat it.
pub async fn record_digest_run(db: &Db, rate: Rate, today: Date) -> Result<()> {
	schedule::record_digest_run(&db.pool, rate.as_str(), today, OffsetDateTime::now_utc()).await?;

	Ok(())
}

fn runs_on(rate: Rate, date: Date) -> bool {
	match rate {
		Rate::RealTime => false,
		Rate::Daily => true,
		Rate::Weekly => date.weekday() == Weekday::Monday,
		Rate::Monthly => date.day() == 1,
	}
}

pub async fn run_worker(state: WorkerState) -> Result<()> {
	let mut last_cleanup = OffsetDateTime::now_utc();
	let mut schedule = load_schedule(&state.db).await?;

	tracing::info!(poll_interval_ms = state.cfg.poll_interval_ms, "Alert worker started.");

	loop {
		loop {
			match process_outbox_once(&state).await {
				Ok(true) => continue,
				Ok(false) => break,
				Err(err) => {
					tracing::error!(error = %err, "Alert outbox processing failed.");

					break;
				},
			}
		}

		let now = OffsetDateTime::now_utc();

		if now - last_cleanup >= Duration::seconds(state.cfg.guard_cleanup_interval_seconds) {
			if let Err(err) = state.service.purge_expired_guards().await {
				tracing::error!(error = %err, "Realtime guard cleanup failed.");
			} else {
				last_cleanup = now;
			}

			let older_than = now - Duration::hours(state.cfg.done_retention_hours);

			match outbox::purge_done_alert_events(&state.db, older_than).await {
				Ok(purged) if purged > 0 => {
					tracing::info!(purged, "Purged delivered alert outbox rows.");
				},
				Ok(_) => {},
				Err(err) => {
					tracing::error!(error = %err, "Alert outbox cleanup failed.");
				},
			}
		}

		let today = now.date();

		for rate in schedule.due(today) {
			let finished = match state.service.flush_digests(rate).await {
				Ok(report) => {
					tracing::info!(
						rate = %rate,
						messages_sent = report.messages_sent,
						hits_flushed = report.hits_flushed,
						"Scheduled digest flush finished."
					);

					true
				},
				Err(err) => {
					tracing::error!(error = %err, rate = %rate, "Scheduled digest flush failed.");

					!err.is_retryable()
				},
			};

			if finished {
				schedule.mark_run(rate, today);

				if let Err(err) = record_digest_run(&state.db, rate, today).await {
					tracing::error!(error = %err, rate = %rate, "Failed to record digest run.");
				}
			}
		}

		tokio_time::sleep(StdDuration::from_millis(state.cfg.poll_interval_ms)).await;
	}
}

/// Handles one outbox row. Returns whether a row was claimed.
async fn process_outbox_once(state: &WorkerState) -> Result<bool> {
	let now = OffsetDateTime::now_utc();
	let Some(job) =
		outbox::claim_next_alert_event(&state.db, now, state.cfg.claim_lease_seconds).await?
	else {
		return Ok(false);
	};
	let result = match AlertEvent::from_payload(&job.event_kind, &job.payload) {
		Ok(event) => state.bus.publish(&event).await,
		Err(err) => Err(err),
	};

	match result {
		Ok(()) => {
			outbox::mark_alert_event_done(&state.db, job.outbox_id, OffsetDateTime::now_utc())
				.await?;
		},
		Err(err) => {
			mark_failed(state, &job, &err).await?;
		},
	}

	Ok(true)
}

async fn mark_failed(
	state: &WorkerState,
	job: &AlertOutboxEntry,
	err: &courtwatch_service::Error,
) -> Result<()> {
	let next_attempts = job.attempts.saturating_add(1);
	let now = OffsetDateTime::now_utc();
	let error_text = sanitize_outbox_error(&err.to_string());

	if !err.is_retryable() || next_attempts >= state.cfg.max_attempts {
		outbox::mark_alert_event_dead(&state.db, job.outbox_id, next_attempts, &error_text, now)
			.await?;
		tracing::error!(
			error = %err,
			outbox_id = %job.outbox_id,
			event_kind = %job.event_kind,
			attempts = next_attempts,
			"Alert outbox job is dead."
		);

		return Ok(());
	}

	let backoff =
		backoff_for_attempt(next_attempts, state.cfg.base_backoff_ms, state.cfg.max_backoff_ms);

	outbox::mark_alert_event_failed(
		&state.db,
		job.outbox_id,
		next_attempts,
		&error_text,
		now + backoff,
		now,
	)
	.await?;
	tracing::warn!(
		error = %err,
		outbox_id = %job.outbox_id,
		retry_in_ms = backoff.whole_milliseconds() as i64,
		"Alert outbox job failed."
	);

	Ok(())
}

fn sanitize_outbox_error(text: &str) -> String {
	let mut parts = Vec::new();
	let mut redact_next = false;

	for raw in text.split_whitespace() {
		let mut word = raw.to_string();

		if redact_next {
			word = "[REDACTED]".to_string();
			redact_next = false;
		}
		if raw.eq_ignore_ascii_case("bearer") {
			redact_next = true;
		}

		let lowered = raw.to_ascii_lowercase();

		// Unsubscribe tokens carry the alert secret key.
		for key in ["api_key", "apikey", "password", "secret", "token"] {
			if lowered.contains(key) && (lowered.contains('=') || lowered.contains(':')) {
				let sep = if raw.contains('=') { '=' } else { ':' };
				let prefix = raw.split(sep).next().unwrap_or(raw);

				word = format!("{prefix}{sep}[REDACTED]");

				break;
			}
		}

		parts.push(word);
	}

	let mut out = parts.join(" ");

	if out.chars().count() > MAX_OUTBOX_ERROR_CHARS {
		out = out.chars().take(MAX_OUTBOX_ERROR_CHARS).collect();
		out.push_str("...");
	}

	out
}

fn backoff_for_attempt(attempt: i32, base_ms: i64, max_ms: i64) -> Duration {
	let attempts = attempt.max(1) as u32;
	let exp = attempts.saturating_sub(1).min(6);
	let base = base_ms.saturating_mul(1 << exp);

	Duration::milliseconds(base.min(max_ms))
}
