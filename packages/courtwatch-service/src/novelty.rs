use time::Duration;
use uuid::Uuid;

use crate::{AlertService, Result};
use courtwatch_domain::{HitRef, Rate};

/// Guard key for one real-time (alert, document) pair.
pub fn realtime_guard_key(query_id: Uuid, document_id: i64) -> String {
	format!("{}:{query_id}:{document_id}", Rate::RealTime.as_str())
}

/// Set of hits an alert already reported in a flushed digest, across every scheduled rate.
pub fn delivered_set_key(query_id: Uuid) -> String {
	format!("sent:{query_id}")
}

/// Outcome of offering a hit to a scheduled alert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Accumulation {
	Added,
	AlreadyPending,
	/// A previous flush already reported this pair.
	AlreadyDelivered,
}

impl AlertService {
	/// Takes the real-time send guard for a pair. `false` means a send already happened inside
	/// the minimum interval.
	pub async fn claim_realtime(&self, query_id: Uuid, hit: HitRef) -> Result<bool> {
		let now = self.now();
		let expires_at = now + Duration::seconds(self.cfg.novelty.realtime_min_interval_seconds);
		let key = realtime_guard_key(query_id, hit.document_id);

		self.backends.novelty.set_guard_if_absent(&key, expires_at, now).await
	}

	/// Adds a hit to the alert's pending set for a scheduled rate, unless an earlier digest
	/// already reported it.
	pub async fn accumulate(&self, rate: Rate, query_id: Uuid, hit: HitRef) -> Result<Accumulation> {
		let member = hit.to_member();
		let novelty = &self.backends.novelty;

		if novelty.is_member(&delivered_set_key(query_id), &member).await? {
			return Ok(Accumulation::AlreadyDelivered);
		}
		if novelty.add_to_set(&rate.hit_set_key(query_id), &member, self.now()).await? {
			Ok(Accumulation::Added)
		} else {
			Ok(Accumulation::AlreadyPending)
		}
	}

	/// Records popped hits as delivered and returns the ones no earlier flush reported.
	///
	/// A hit re-added between an earlier pop and its record is caught here. A failed record keeps
	/// the hit in this digest.
	pub(crate) async fn record_delivered(
		&self,
		query_id: Uuid,
		members: Vec<String>,
	) -> Vec<String> {
		let key = delivered_set_key(query_id);
		let now = self.now();
		let mut fresh = Vec::with_capacity(members.len());

		for member in members {
			match self.backends.novelty.add_to_set(&key, &member, now).await {
				Ok(true) => fresh.push(member),
				Ok(false) => {
					tracing::debug!(
						%query_id,
						member = %member,
						"Dropping a hit an earlier digest reported."
					);
				},
				Err(err) => {
					tracing::warn!(%query_id, error = %err, "Failed to record a delivered hit.");

					fresh.push(member);
				},
			}
		}

		fresh
	}

	/// Drops every pending hit of an alert, whichever rate it accumulated under, along with its
	/// delivered record.
	pub async fn clear_pending(&self, query_id: Uuid) -> Result<usize> {
		let mut cleared = 0;

		for rate in Rate::SCHEDULED {
			cleared += self.backends.novelty.pop_and_clear_set(&rate.hit_set_key(query_id)).await?.len();
		}

		self.backends.novelty.pop_and_clear_set(&delivered_set_key(query_id)).await?;

		Ok(cleared)
	}

	pub async fn purge_expired_guards(&self) -> Result<u64> {
		let purged = self.backends.novelty.purge_expired_guards(self.now()).await?;

		if purged > 0 {
			tracing::debug!(purged, "Purged expired real-time guards.");
		}

		Ok(purged)
	}
}
