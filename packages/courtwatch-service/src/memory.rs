//! In-process backends for tests and single-process runs.

use std::{
	collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
	ops::Bound,
	sync::{
		Arc, Mutex, RwLock,
		atomic::{AtomicBool, Ordering},
	},
};

use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Backends, BoxFuture, DeliverySink, DocumentIndex, Error, NoveltyStore, PercolatorIndex,
	QueryStore, Result,
	clock::ManualClock,
	dispatch::{DigestMessage, RealtimeNotification},
	events::AlertEvent,
	percolation::PercolatorMatch,
};
use courtwatch_domain::{
	CandidateDocument, CompiledQuery, IndexedDocument, MatchTarget, ParentDocument, StoredQuery,
};

fn after_bound(after: Option<Uuid>) -> (Bound<Uuid>, Bound<Uuid>) {
	match after {
		Some(id) => (Bound::Excluded(id), Bound::Unbounded),
		None => (Bound::Unbounded, Bound::Unbounded),
	}
}

/// Stored queries plus the outbox their writes queue events into.
///
/// The row change and the queued event happen under one lock.
pub struct MemoryQueryStore {
	rows: RwLock<BTreeMap<Uuid, StoredQuery>>,
	outbox: Arc<MemoryOutbox>,
}
impl MemoryQueryStore {
	pub fn new(outbox: Arc<MemoryOutbox>) -> Self {
		Self { rows: RwLock::default(), outbox }
	}
}
impl QueryStore for MemoryQueryStore {
	fn insert<'a>(
		&'a self,
		query: &'a StoredQuery,
		event: &'a AlertEvent,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut rows = self.rows.write().unwrap_or_else(|err| err.into_inner());

			if rows.contains_key(&query.query_id)
				|| rows.values().any(|row| row.secret_key == query.secret_key)
			{
				return Err(Error::InvalidRequest {
					message: format!("stored query {} already exists.", query.query_id),
				});
			}

			rows.insert(query.query_id, query.clone());
			self.outbox.push(event.clone());

			Ok(())
		})
	}

	fn update<'a>(
		&'a self,
		query: &'a StoredQuery,
		event: &'a AlertEvent,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let mut rows = self.rows.write().unwrap_or_else(|err| err.into_inner());
			let Some(row) = rows.get_mut(&query.query_id) else {
				return Ok(false);
			};

			*row = query.clone();
			self.outbox.push(event.clone());

			Ok(true)
		})
	}

	fn delete<'a>(&'a self, query_id: Uuid, event: &'a AlertEvent) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let mut rows = self.rows.write().unwrap_or_else(|err| err.into_inner());
			let deleted = rows.remove(&query_id).is_some();

			self.outbox.push(event.clone());

			Ok(deleted)
		})
	}

	fn get<'a>(&'a self, query_id: Uuid) -> BoxFuture<'a, Result<Option<StoredQuery>>> {
		Box::pin(async move {
			Ok(self.rows.read().unwrap_or_else(|err| err.into_inner()).get(&query_id).cloned())
		})
	}

	fn list_after<'a>(
		&'a self,
		after: Option<Uuid>,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<StoredQuery>>> {
		Box::pin(async move {
			let rows = self.rows.read().unwrap_or_else(|err| err.into_inner());

			Ok(rows.range(after_bound(after)).take(limit as usize).map(|(_, row)| row.clone()).collect())
		})
	}

	fn find_by_secret_key<'a>(
		&'a self,
		secret_key: &'a str,
	) -> BoxFuture<'a, Result<Option<StoredQuery>>> {
		Box::pin(async move {
			let rows = self.rows.read().unwrap_or_else(|err| err.into_inner());

			Ok(rows.values().find(|row| row.secret_key == secret_key).cloned())
		})
	}

	fn touch_last_hit<'a>(
		&'a self,
		query_ids: &'a [Uuid],
		at: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut rows = self.rows.write().unwrap_or_else(|err| err.into_inner());

			for query_id in query_ids {
				if let Some(row) = rows.get_mut(query_id) {
					row.date_last_hit = Some(at);
				}
			}

			Ok(())
		})
	}
}

/// Percolator entries held in query id order. Can be switched off to simulate an outage.
pub struct MemoryPercolator {
	entries: RwLock<BTreeMap<Uuid, CompiledQuery>>,
	available: AtomicBool,
}
impl MemoryPercolator {
	pub fn set_available(&self, available: bool) {
		self.available.store(available, Ordering::SeqCst);
	}

	pub fn contains(&self, query_id: Uuid) -> bool {
		self.entries.read().unwrap_or_else(|err| err.into_inner()).contains_key(&query_id)
	}

	fn check_available(&self) -> Result<()> {
		if self.available.load(Ordering::SeqCst) {
			Ok(())
		} else {
			Err(Error::PercolationUnavailable { message: "in-memory percolator is offline.".to_string() })
		}
	}
}
impl Default for MemoryPercolator {
	fn default() -> Self {
		Self { entries: RwLock::default(), available: AtomicBool::new(true) }
	}
}
impl PercolatorIndex for MemoryPercolator {
	fn upsert<'a>(
		&'a self,
		query_id: Uuid,
		compiled: &'a CompiledQuery,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			self.check_available()?;

			let mut entries = self.entries.write().unwrap_or_else(|err| err.into_inner());

			if entries.get(&query_id) == Some(compiled) {
				return Ok(false);
			}

			entries.insert(query_id, compiled.clone());

			Ok(true)
		})
	}

	fn remove<'a>(&'a self, query_id: Uuid) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			self.check_available()?;

			Ok(self.entries.write().unwrap_or_else(|err| err.into_inner()).remove(&query_id).is_some())
		})
	}

	fn percolate_page<'a>(
		&'a self,
		document: &'a IndexedDocument,
		after: Option<Uuid>,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<PercolatorMatch>>> {
		Box::pin(async move {
			self.check_available()?;

			let target = MatchTarget::new(document);
			let entries = self.entries.read().unwrap_or_else(|err| err.into_inner());

			Ok(entries
				.range(after_bound(after))
				.filter(|(_, compiled)| compiled.matches(&target))
				.take(limit as usize)
				.map(|(query_id, compiled)| PercolatorMatch {
					query_id: *query_id,
					snippet: compiled.snippet(&target),
				})
				.collect())
		})
	}

	fn ids_after<'a>(&'a self, after: Option<Uuid>, limit: u32) -> BoxFuture<'a, Result<Vec<Uuid>>> {
		Box::pin(async move {
			self.check_available()?;

			let entries = self.entries.read().unwrap_or_else(|err| err.into_inner());

			Ok(entries.range(after_bound(after)).take(limit as usize).map(|(id, _)| *id).collect())
		})
	}

	fn len<'a>(&'a self) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move {
			self.check_available()?;

			Ok(self.entries.read().unwrap_or_else(|err| err.into_inner()).len() as u64)
		})
	}
}

#[derive(Default)]
pub struct MemoryDocumentIndex {
	documents: RwLock<BTreeMap<i64, CandidateDocument>>,
	parents: RwLock<BTreeMap<i64, ParentDocument>>,
}
impl DocumentIndex for MemoryDocumentIndex {
	fn put<'a>(&'a self, document: &'a CandidateDocument) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.documents
				.write()
				.unwrap_or_else(|err| err.into_inner())
				.insert(document.id, document.clone());

			Ok(())
		})
	}

	fn get<'a>(&'a self, document_id: i64) -> BoxFuture<'a, Result<Option<CandidateDocument>>> {
		Box::pin(async move {
			Ok(self.documents.read().unwrap_or_else(|err| err.into_inner()).get(&document_id).cloned())
		})
	}

	fn put_parent<'a>(&'a self, parent: &'a ParentDocument) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.parents
				.write()
				.unwrap_or_else(|err| err.into_inner())
				.insert(parent.id, parent.clone());

			Ok(())
		})
	}

	fn get_parent<'a>(&'a self, parent_id: i64) -> BoxFuture<'a, Result<Option<ParentDocument>>> {
		Box::pin(async move {
			Ok(self.parents.read().unwrap_or_else(|err| err.into_inner()).get(&parent_id).cloned())
		})
	}

	fn children_of<'a>(&'a self, parent_id: i64) -> BoxFuture<'a, Result<Vec<CandidateDocument>>> {
		Box::pin(async move {
			let documents = self.documents.read().unwrap_or_else(|err| err.into_inner());

			Ok(documents
				.values()
				.filter(|document| document.parent_id == Some(parent_id))
				.cloned()
				.collect())
		})
	}
}

#[derive(Default)]
pub struct MemoryNoveltyStore {
	sets: Mutex<BTreeMap<String, BTreeSet<String>>>,
	guards: Mutex<HashMap<String, OffsetDateTime>>,
}
impl NoveltyStore for MemoryNoveltyStore {
	fn add_to_set<'a>(
		&'a self,
		key: &'a str,
		member: &'a str,
		_now: OffsetDateTime,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let mut sets = self.sets.lock().unwrap_or_else(|err| err.into_inner());

			Ok(sets.entry(key.to_string()).or_default().insert(member.to_string()))
		})
	}

	fn is_member<'a>(&'a self, key: &'a str, member: &'a str) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let sets = self.sets.lock().unwrap_or_else(|err| err.into_inner());

			Ok(sets.get(key).is_some_and(|set| set.contains(member)))
		})
	}

	fn pop_and_clear_set<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move {
			let mut sets = self.sets.lock().unwrap_or_else(|err| err.into_inner());

			Ok(sets.remove(key).map(|set| set.into_iter().collect()).unwrap_or_default())
		})
	}

	fn peek_set<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move {
			let sets = self.sets.lock().unwrap_or_else(|err| err.into_inner());

			Ok(sets.get(key).map(|set| set.iter().cloned().collect()).unwrap_or_default())
		})
	}

	fn set_keys<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move {
			let sets = self.sets.lock().unwrap_or_else(|err| err.into_inner());

			Ok(sets
				.iter()
				.filter(|(key, set)| key.starts_with(prefix) && !set.is_empty())
				.map(|(key, _)| key.clone())
				.collect())
		})
	}

	fn set_guard_if_absent<'a>(
		&'a self,
		key: &'a str,
		expires_at: OffsetDateTime,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let mut guards = self.guards.lock().unwrap_or_else(|err| err.into_inner());

			if guards.get(key).is_some_and(|current| *current > now) {
				return Ok(false);
			}

			guards.insert(key.to_string(), expires_at);

			Ok(true)
		})
	}

	fn purge_expired_guards<'a>(&'a self, now: OffsetDateTime) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move {
			let mut guards = self.guards.lock().unwrap_or_else(|err| err.into_inner());
			let before = guards.len();

			guards.retain(|_, expires_at| *expires_at > now);

			Ok((before - guards.len()) as u64)
		})
	}
}

/// Events queued by store writes, drained into an `EventBus` by the caller.
#[derive(Default)]
pub struct MemoryOutbox {
	events: Mutex<VecDeque<AlertEvent>>,
}
impl MemoryOutbox {
	pub fn push(&self, event: AlertEvent) {
		self.events.lock().unwrap_or_else(|err| err.into_inner()).push_back(event);
	}

	pub fn pop(&self) -> Option<AlertEvent> {
		self.events.lock().unwrap_or_else(|err| err.into_inner()).pop_front()
	}

	pub fn len(&self) -> usize {
		self.events.lock().unwrap_or_else(|err| err.into_inner()).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
/// Keeps every payload it is handed. Can be told to fail.
#[derive(Default)]
pub struct RecordingDelivery {
	realtime: Mutex<Vec<RealtimeNotification>>,
	digests: Mutex<Vec<DigestMessage>>,
	failing: AtomicBool,
}
impl RecordingDelivery {
	pub fn set_failing(&self, failing: bool) {
		self.failing.store(failing, Ordering::SeqCst);
	}

	pub fn realtime(&self) -> Vec<RealtimeNotification> {
		self.realtime.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	pub fn digests(&self) -> Vec<DigestMessage> {
		self.digests.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	fn check_failing(&self) -> Result<()> {
		if self.failing.load(Ordering::SeqCst) {
			Err(Error::Delivery { message: "recording sink is set to fail.".to_string() })
		} else {
			Ok(())
		}
	}
}
impl DeliverySink for RecordingDelivery {
	fn deliver_realtime<'a>(
		&'a self,
		notification: &'a RealtimeNotification,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.check_failing()?;
			self.realtime.lock().unwrap_or_else(|err| err.into_inner()).push(notification.clone());

			Ok(())
		})
	}

	fn deliver_digest<'a>(&'a self, message: &'a DigestMessage) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.check_failing()?;
			self.digests.lock().unwrap_or_else(|err| err.into_inner()).push(message.clone());

			Ok(())
		})
	}
}

/// Concrete handles to every in-memory backend, so callers can inspect and steer them.
pub struct MemoryBackends {
	pub queries: Arc<MemoryQueryStore>,
	pub percolator: Arc<MemoryPercolator>,
	pub documents: Arc<MemoryDocumentIndex>,
	pub novelty: Arc<MemoryNoveltyStore>,
	pub outbox: Arc<MemoryOutbox>,
	pub delivery: Arc<RecordingDelivery>,
	pub clock: Arc<ManualClock>,
}
impl MemoryBackends {
	pub fn new(start: OffsetDateTime) -> Self {
		let outbox = Arc::new(MemoryOutbox::default());

		Self {
			queries: Arc::new(MemoryQueryStore::new(outbox.clone())),
			percolator: Arc::default(),
			documents: Arc::default(),
			novelty: Arc::default(),
			outbox,
			delivery: Arc::default(),
			clock: Arc::new(ManualClock::new(start)),
		}
	}

	pub fn backends(&self) -> Backends {
		Backends {
			queries: self.queries.clone(),
			percolator: self.percolator.clone(),
			documents: self.documents.clone(),
			novelty: self.novelty.clone(),
			delivery: self.delivery.clone(),
			clock: self.clock.clone(),
		}
	}
}
