use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use courtwatch_domain::{CompiledQuery, IndexedDocument, Rate};
use courtwatch_service::{
	AlertEvent, BoxFuture, MemoryBackends, PercolatorIndex, PercolatorMatch, QueryStore, Result,
	memory::{MemoryPercolator, MemoryQueryStore},
};

use super::Harness;

/// Deletes one stored query from the query store while a percolation walk is in flight.
struct DeletingPercolator {
	inner: Arc<MemoryPercolator>,
	queries: Arc<MemoryQueryStore>,
	victim: std::sync::Mutex<Option<Uuid>>,
}
impl PercolatorIndex for DeletingPercolator {
	fn upsert<'a>(
		&'a self,
		query_id: Uuid,
		compiled: &'a CompiledQuery,
	) -> BoxFuture<'a, Result<bool>> {
		self.inner.upsert(query_id, compiled)
	}

	fn remove<'a>(&'a self, query_id: Uuid) -> BoxFuture<'a, Result<bool>> {
		self.inner.remove(query_id)
	}

	fn percolate_page<'a>(
		&'a self,
		document: &'a IndexedDocument,
		after: Option<Uuid>,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<PercolatorMatch>>> {
		Box::pin(async move {
			let page = self.inner.percolate_page(document, after, limit).await?;
			let victim = self.victim.lock().expect("Victim lock poisoned.").take();

			if let Some(victim) = victim {
				let event = AlertEvent::QueryCommitted { query_id: victim, compiled: None };

				self.queries.delete(victim, &event).await?;
			}

			Ok(page)
		})
	}

	fn ids_after<'a>(&'a self, after: Option<Uuid>, limit: u32) -> BoxFuture<'a, Result<Vec<Uuid>>> {
		self.inner.ids_after(after, limit)
	}

	fn len<'a>(&'a self) -> BoxFuture<'a, Result<u64>> {
		self.inner.len()
	}
}

#[tokio::test]
async fn query_deleted_mid_walk_is_never_notified() {
	let memory = MemoryBackends::new(super::START);
	let racing = Arc::new(DeletingPercolator {
		inner: memory.percolator.clone(),
		queries: memory.queries.clone(),
		victim: std::sync::Mutex::new(None),
	});
	let mut backends = memory.backends();

	backends.percolator = racing.clone();

	let harness = Harness::with_backends(super::memory_config(1), memory, backends);
	let kept = harness
		.create_alert(1, "Kept", json!({ "type": "opinion", "q": "habeas" }), Rate::RealTime)
		.await;
	let doomed = harness
		.create_alert(2, "Doomed", json!({ "type": "opinion", "q": "habeas" }), Rate::RealTime)
		.await;

	*racing.victim.lock().expect("Victim lock poisoned.") = Some(doomed.query_id);

	let report = harness
		.service
		.on_document_committed(super::opinion(30, None, "A habeas petition."))
		.await
		.expect("Percolation should succeed.");
	let sent = harness.memory.delivery.realtime();

	assert_eq!(report.matched, 2);
	assert_eq!(report.skipped_missing, 1);
	assert_eq!(sent.len(), 1);
	assert_eq!(sent[0].alert.query_id, kept.query_id);

	// The racing delete queued its removal alongside the row change.
	harness.settle().await;

	assert!(!harness.memory.percolator.contains(doomed.query_id));
}

#[tokio::test]
async fn pending_hits_of_deleted_alerts_are_discarded() {
	let harness = Harness::new(super::memory_config(10));
	let alert = harness
		.create_alert(1, "Doomed", json!({ "type": "opinion", "q": "habeas" }), Rate::Weekly)
		.await;

	harness
		.service
		.on_document_committed(super::opinion(30, None, "A habeas petition."))
		.await
		.expect("Percolation should succeed.");
	harness.service.delete_alert(alert.query_id, 1).await.expect("Delete should succeed.");

	let report = harness.service.flush_digests(Rate::Weekly).await.expect("Flush should succeed.");

	assert_eq!(report.skipped_deleted, 1);
	assert_eq!(report.messages_sent, 0);

	harness.settle().await;

	let report = harness
		.service
		.on_document_committed(super::opinion(31, None, "Another habeas petition."))
		.await
		.expect("Percolation should succeed.");

	assert_eq!(report.matched, 0);
}
