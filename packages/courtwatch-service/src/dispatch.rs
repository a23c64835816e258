//! Delivery payloads and the two dispatch paths: immediate real-time sends and scheduled
//! digest flushes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::{AlertService, Error, Result};
use courtwatch_domain::{DocumentType, HitRef, IndexedDocument, Rate, StoredQuery};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRef {
	pub query_id: Uuid,
	pub name: String,
	pub rate: Rate,
	pub secret_key: String,
}
impl From<&StoredQuery> for AlertRef {
	fn from(query: &StoredQuery) -> Self {
		Self {
			query_id: query.query_id,
			name: query.name.clone(),
			rate: query.rate,
			secret_key: query.secret_key.clone(),
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
	pub document_id: i64,
	pub document_type: DocumentType,
	pub parent_id: i64,
	pub case_name: Option<String>,
	pub docket_number: Option<String>,
	pub court_id: Option<String>,
	pub date_filed: Option<Date>,
	pub snippet: Option<String>,
}
impl DocumentSummary {
	pub fn new(document: &IndexedDocument, snippet: Option<String>) -> Self {
		Self {
			document_id: document.id,
			document_type: document.document_type,
			parent_id: document.hit_ref().parent_id,
			case_name: document.fields.case_name.clone(),
			docket_number: document.fields.docket_number.clone(),
			court_id: document.fields.court_id.clone(),
			date_filed: document.fields.date_filed,
			snippet,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RealtimeNotification {
	pub recipient: i64,
	pub alert: AlertRef,
	pub document: DocumentSummary,
	pub matched_at: OffsetDateTime,
}

/// Hits for one alert under one parent container.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestGroup {
	pub parent_id: i64,
	pub hit_count: usize,
	/// At most `digest_max_hits_per_group` ids; `hit_count` is the true total.
	pub document_ids: Vec<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestEntry {
	pub alert: AlertRef,
	pub hit_count: usize,
	pub groups: Vec<DigestGroup>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsubscribeRef {
	pub query_id: Uuid,
	pub secret_key: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestMessage {
	pub recipient: i64,
	pub rate: Rate,
	pub subject: String,
	pub cut_off: Date,
	pub total_alerts: usize,
	pub total_hits: usize,
	/// Capped at `digest_max_alerts_per_recipient`.
	pub entries: Vec<DigestEntry>,
	/// Every alert in the digest, including ones cut from `entries`.
	pub unsubscribe: Vec<UnsubscribeRef>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEntry {
	pub query_id: Uuid,
	pub hits: Vec<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDigest {
	pub recipient: i64,
	pub entries: Vec<PendingEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushReport {
	pub rate: Rate,
	pub cut_off: Date,
	pub messages_sent: usize,
	pub alerts_flushed: usize,
	/// Alerts in digests the delivery sink accepted.
	pub alerts_sent: usize,
	pub hits_flushed: usize,
	/// Alerts deleted while their hits were pending; those hits were discarded.
	pub skipped_deleted: usize,
	pub failures: usize,
	pub delivery_failures: usize,
}

/// Renders one recipient's digest. `alerts` may come in any order.
pub fn build_digest(
	rate: Rate,
	cut_off: Date,
	recipient: i64,
	mut alerts: Vec<(StoredQuery, Vec<HitRef>)>,
	max_alerts: usize,
	max_hits_per_group: usize,
) -> DigestMessage {
	alerts.sort_by(|(left, _), (right, _)| {
		left.name.cmp(&right.name).then(left.query_id.cmp(&right.query_id))
	});

	let total_alerts = alerts.len();
	let total_hits = alerts.iter().map(|(_, hits)| hits.len()).sum();
	let unsubscribe = alerts
		.iter()
		.map(|(query, _)| UnsubscribeRef {
			query_id: query.query_id,
			secret_key: query.secret_key.clone(),
		})
		.collect();
	let entries = alerts
		.iter()
		.take(max_alerts)
		.map(|(query, hits)| {
			let mut by_parent: BTreeMap<i64, Vec<i64>> = BTreeMap::new();

			for hit in hits {
				by_parent.entry(hit.parent_id).or_default().push(hit.document_id);
			}

			let groups = by_parent
				.into_iter()
				.map(|(parent_id, mut document_ids)| {
					document_ids.sort_unstable();
					document_ids.dedup();

					let hit_count = document_ids.len();

					document_ids.truncate(max_hits_per_group);

					DigestGroup { parent_id, hit_count, document_ids }
				})
				.collect::<Vec<_>>();

			DigestEntry {
				alert: AlertRef::from(query),
				hit_count: groups.iter().map(|group| group.hit_count).sum(),
				groups,
			}
		})
		.collect();

	DigestMessage {
		recipient,
		rate,
		subject: format!("{total_hits} new hits for {total_alerts} alerts"),
		cut_off,
		total_alerts,
		total_hits,
		entries,
		unsubscribe,
	}
}

fn parse_hits(query_id: Uuid, members: &[String]) -> Vec<HitRef> {
	members
		.iter()
		.filter_map(|member| {
			let hit = HitRef::from_member(member);

			if hit.is_none() {
				tracing::warn!(%query_id, member = %member, "Dropping malformed hit set member.");
			}

			hit
		})
		.collect()
}

/// Event target for per-rate sent-alert tallies.
pub const SENT_TALLY_TARGET: &str = "courtwatch::alerts_sent";

enum Collected {
	Hits(StoredQuery, Vec<HitRef>),
	Deleted,
	OtherRecipient,
}

fn query_id_from_key(rate: Rate, key: &str) -> Option<Uuid> {
	let prefix = format!("{}:", rate.hit_namespace());

	key.strip_prefix(&prefix).and_then(|raw| Uuid::parse_str(raw).ok())
}

impl AlertService {
	/// Real-time path: one notification per novel hit. Runs after the send guard is taken, so
	/// nothing here fails the percolation; delivery failures are left to the delivery side.
	pub(crate) async fn dispatch_realtime(
		&self,
		query: &StoredQuery,
		document: &IndexedDocument,
		snippet: Option<String>,
	) -> bool {
		let now = self.now();

		if let Err(err) = self.backends.queries.touch_last_hit(&[query.query_id], now).await {
			tracing::warn!(
				query_id = %query.query_id,
				error = %err,
				"Failed to record last hit time."
			);
		}

		let notification = RealtimeNotification {
			recipient: query.user_id,
			alert: AlertRef::from(query),
			document: DocumentSummary::new(document, snippet),
			matched_at: now,
		};

		match self.backends.delivery.deliver_realtime(&notification).await {
			Ok(()) => {
				tracing::info!(
					target: SENT_TALLY_TARGET,
					rate = %Rate::RealTime,
					count = 1,
					"Alerts sent."
				);

				true
			},
			Err(err) => {
				tracing::warn!(
					query_id = %query.query_id,
					document_id = document.id,
					error = %err,
					"Real-time delivery failed."
				);

				false
			},
		}
	}

	/// Scheduled path for one rate: consumes every pending hit set and sends one digest per
	/// recipient.
	///
	/// Hit sets are popped atomically, so a hit that lands after its set was popped simply waits
	/// for the next run. Consumed hits are never restored, even when delivery fails.
	pub async fn flush_digests(&self, rate: Rate) -> Result<FlushReport> {
		self.flush_digests_for(rate, None).await
	}

	/// Like [`Self::flush_digests`], limited to one recipient when `recipient` is set. Other
	/// recipients' hits stay pending.
	pub async fn flush_digests_for(&self, rate: Rate, recipient: Option<i64>) -> Result<FlushReport> {
		if !rate.is_scheduled() {
			return Err(Error::InvalidRequest {
				message: "real-time alerts are not flushed on a schedule.".to_string(),
			});
		}

		let now = self.now();

		if !rate.may_flush_on(now.date()) {
			return Err(Error::InvalidRequest {
				message: format!(
					"{rate} digests only run on days 1-28; today is day {}.",
					now.day()
				),
			});
		}

		let cut_off = rate.cut_off(now);
		let mut report = FlushReport {
			rate,
			cut_off,
			messages_sent: 0,
			alerts_flushed: 0,
			alerts_sent: 0,
			hits_flushed: 0,
			skipped_deleted: 0,
			failures: 0,
			delivery_failures: 0,
		};
		let keys = self.backends.novelty.set_keys(&format!("{}:", rate.hit_namespace())).await?;
		let mut by_recipient: BTreeMap<i64, Vec<(StoredQuery, Vec<HitRef>)>> = BTreeMap::new();

		for key in keys {
			let Some(query_id) = query_id_from_key(rate, &key) else {
				tracing::warn!(key = %key, "Skipping hit set with a malformed key.");

				report.failures += 1;

				continue;
			};

			match self.collect_pending(query_id, &key, recipient).await {
				Ok(Collected::Hits(query, hits)) => {
					if hits.is_empty() {
						continue;
					}

					by_recipient.entry(query.user_id).or_default().push((query, hits));
				},
				Ok(Collected::Deleted) => report.skipped_deleted += 1,
				Ok(Collected::OtherRecipient) => {},
				Err(err) => {
					tracing::warn!(%query_id, error = %err, "Failed to collect pending hits.");

					report.failures += 1;
				},
			}
		}

		let limits = &self.cfg.dispatch;

		for (recipient, alerts) in by_recipient {
			let query_ids = alerts.iter().map(|(query, _)| query.query_id).collect::<Vec<_>>();

			if let Err(err) = self.backends.queries.touch_last_hit(&query_ids, now).await {
				tracing::warn!(recipient, error = %err, "Failed to record last hit time.");

				report.failures += 1;
			}

			let message = build_digest(
				rate,
				cut_off,
				recipient,
				alerts,
				limits.digest_max_alerts_per_recipient as usize,
				limits.digest_max_hits_per_group as usize,
			);

			report.alerts_flushed += message.total_alerts;
			report.hits_flushed += message.total_hits;

			match self.backends.delivery.deliver_digest(&message).await {
				Ok(()) => {
					report.messages_sent += 1;
					report.alerts_sent += message.total_alerts;
				},
				Err(err) => {
					tracing::warn!(recipient, %rate, error = %err, "Digest delivery failed.");

					report.delivery_failures += 1;
				},
			}
		}

		tracing::info!(
			%rate,
			messages = report.messages_sent,
			alerts = report.alerts_flushed,
			hits = report.hits_flushed,
			skipped_deleted = report.skipped_deleted,
			failures = report.failures,
			"Digest flush finished."
		);
		tracing::info!(target: SENT_TALLY_TARGET, %rate, count = report.alerts_sent, "Alerts sent.");

		Ok(report)
	}

	/// Pops one pending set unless it belongs to a recipient outside the filter. Hits of a deleted
	/// alert are discarded.
	async fn collect_pending(
		&self,
		query_id: Uuid,
		key: &str,
		recipient: Option<i64>,
	) -> Result<Collected> {
		let query = self.backends.queries.get(query_id).await?;

		if let (Some(query), Some(recipient)) = (&query, recipient)
			&& query.user_id != recipient
		{
			return Ok(Collected::OtherRecipient);
		}

		let members = self.backends.novelty.pop_and_clear_set(key).await?;
		let Some(query) = query else {
			tracing::info!(%query_id, discarded = members.len(), "Discarding hits of a deleted alert.");

			return Ok(Collected::Deleted);
		};
		let members = self.record_delivered(query_id, members).await;

		Ok(Collected::Hits(query, parse_hits(query_id, &members)))
	}

	/// What the next flush for `rate` would send, without consuming anything.
	pub async fn pending_digest(&self, rate: Rate) -> Result<Vec<PendingDigest>> {
		self.pending_digest_for(rate, None).await
	}

	pub async fn pending_digest_for(
		&self,
		rate: Rate,
		recipient: Option<i64>,
	) -> Result<Vec<PendingDigest>> {
		let keys = self.backends.novelty.set_keys(&format!("{}:", rate.hit_namespace())).await?;
		let mut by_recipient: BTreeMap<i64, Vec<PendingEntry>> = BTreeMap::new();

		for key in keys {
			let Some(query_id) = query_id_from_key(rate, &key) else {
				continue;
			};
			let Some(query) = self.backends.queries.get(query_id).await? else {
				continue;
			};

			if recipient.is_some_and(|recipient| recipient != query.user_id) {
				continue;
			}

			let members = self.backends.novelty.peek_set(&key).await?;
			let mut hits =
				parse_hits(query_id, &members).into_iter().map(|hit| hit.document_id).collect::<Vec<_>>();

			hits.sort_unstable();
			hits.dedup();
			by_recipient.entry(query.user_id).or_default().push(PendingEntry { query_id, hits });
		}

		Ok(by_recipient
			.into_iter()
			.map(|(recipient, entries)| PendingDigest { recipient, entries })
			.collect())
	}
}
