pub mod admin;
pub mod alerts;
pub mod clock;
pub mod dispatch;
pub mod events;
pub mod indexer;
pub mod memory;
pub mod novelty;
pub mod pagination;
pub mod percolation;
pub mod postgres;

mod error;

pub use admin::{RebuildReport, StoredQueryPages};
pub use alerts::{
	CreateAlertRequest, CreateAlertResponse, DeleteAlertResponse, UpdateAlertRequest,
	UpdateAlertResponse,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatch::{
	AlertRef, DigestEntry, DigestGroup, DigestMessage, DocumentSummary, FlushReport,
	PendingDigest, PendingEntry, RealtimeNotification, UnsubscribeRef,
};
pub use error::{Error, Result};
pub use events::{AlertEvent, EventBus, EventHandler, EventKind};
pub use indexer::{ParentReindexReport, PercolationReport};
pub use memory::MemoryBackends;
pub use novelty::Accumulation;
pub use pagination::{Page, PageQuery, PageRequest, PageSource};
pub use percolation::PercolatorMatch;

use std::{future::Future, pin::Pin, sync::Arc};

use time::OffsetDateTime;
use uuid::Uuid;

use courtwatch_config::Config;
use courtwatch_domain::{
	CandidateDocument, CompiledQuery, IndexedDocument, ParentDocument, StoredQuery,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Source of truth for stored queries.
///
/// Every write queues its `AlertEvent` in the same commit as the row change.
pub trait QueryStore
where
	Self: Send + Sync,
{
	fn insert<'a>(
		&'a self,
		query: &'a StoredQuery,
		event: &'a AlertEvent,
	) -> BoxFuture<'a, Result<()>>;

	/// Returns `false` when the query does not exist. Nothing is queued then.
	fn update<'a>(
		&'a self,
		query: &'a StoredQuery,
		event: &'a AlertEvent,
	) -> BoxFuture<'a, Result<bool>>;

	/// The event is queued whether or not a row was deleted.
	fn delete<'a>(&'a self, query_id: Uuid, event: &'a AlertEvent) -> BoxFuture<'a, Result<bool>>;

	fn get<'a>(&'a self, query_id: Uuid) -> BoxFuture<'a, Result<Option<StoredQuery>>>;

	/// Keyset page in ascending id order.
	fn list_after<'a>(
		&'a self,
		after: Option<Uuid>,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<StoredQuery>>>;

	fn find_by_secret_key<'a>(
		&'a self,
		secret_key: &'a str,
	) -> BoxFuture<'a, Result<Option<StoredQuery>>>;

	fn touch_last_hit<'a>(
		&'a self,
		query_ids: &'a [Uuid],
		at: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>>;
}

/// The reverse index: its entries are compiled stored queries.
pub trait PercolatorIndex
where
	Self: Send + Sync,
{
	/// Returns `false` when an identical entry was already present.
	fn upsert<'a>(&'a self, query_id: Uuid, compiled: &'a CompiledQuery)
	-> BoxFuture<'a, Result<bool>>;

	/// Removing a missing entry is not an error.
	fn remove<'a>(&'a self, query_id: Uuid) -> BoxFuture<'a, Result<bool>>;

	/// Matches strictly after `after`, ascending by query id, at most `limit` of them.
	fn percolate_page<'a>(
		&'a self,
		document: &'a IndexedDocument,
		after: Option<Uuid>,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<PercolatorMatch>>>;

	fn ids_after<'a>(&'a self, after: Option<Uuid>, limit: u32) -> BoxFuture<'a, Result<Vec<Uuid>>>;

	fn len<'a>(&'a self) -> BoxFuture<'a, Result<u64>>;
}

/// Committed documents and their containers, as the indexer last saw them.
pub trait DocumentIndex
where
	Self: Send + Sync,
{
	fn put<'a>(&'a self, document: &'a CandidateDocument) -> BoxFuture<'a, Result<()>>;

	fn get<'a>(&'a self, document_id: i64) -> BoxFuture<'a, Result<Option<CandidateDocument>>>;

	fn put_parent<'a>(&'a self, parent: &'a ParentDocument) -> BoxFuture<'a, Result<()>>;

	fn get_parent<'a>(&'a self, parent_id: i64) -> BoxFuture<'a, Result<Option<ParentDocument>>>;

	fn children_of<'a>(&'a self, parent_id: i64) -> BoxFuture<'a, Result<Vec<CandidateDocument>>>;
}

/// Key-value primitives behind hit deduplication.
pub trait NoveltyStore
where
	Self: Send + Sync,
{
	/// Atomic set union. Returns `true` when the member is new.
	fn add_to_set<'a>(
		&'a self,
		key: &'a str,
		member: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<bool>>;

	fn is_member<'a>(&'a self, key: &'a str, member: &'a str) -> BoxFuture<'a, Result<bool>>;

	/// Atomically returns every member and empties the set.
	fn pop_and_clear_set<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<String>>>;

	fn peek_set<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Vec<String>>>;

	fn set_keys<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<String>>>;

	/// Takes the guard unless an unexpired one exists. Returns `true` when taken.
	fn set_guard_if_absent<'a>(
		&'a self,
		key: &'a str,
		expires_at: OffsetDateTime,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<bool>>;

	fn purge_expired_guards<'a>(&'a self, now: OffsetDateTime) -> BoxFuture<'a, Result<u64>>;
}

/// Hands payloads to whatever renders and sends email or webhooks.
pub trait DeliverySink
where
	Self: Send + Sync,
{
	fn deliver_realtime<'a>(
		&'a self,
		notification: &'a RealtimeNotification,
	) -> BoxFuture<'a, Result<()>>;

	fn deliver_digest<'a>(&'a self, message: &'a DigestMessage) -> BoxFuture<'a, Result<()>>;
}

#[derive(Clone)]
pub struct Backends {
	pub queries: Arc<dyn QueryStore>,
	pub percolator: Arc<dyn PercolatorIndex>,
	pub documents: Arc<dyn DocumentIndex>,
	pub novelty: Arc<dyn NoveltyStore>,
	pub delivery: Arc<dyn DeliverySink>,
	pub clock: Arc<dyn Clock>,
}

pub struct AlertService {
	pub cfg: Config,
	pub backends: Backends,
}
impl AlertService {
	pub fn new(cfg: Config, backends: Backends) -> Self {
		Self { cfg, backends }
	}

	pub(crate) fn now(&self) -> OffsetDateTime {
		self.backends.clock.now()
	}
}
