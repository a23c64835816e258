use std::sync::{
	Arc, Mutex,
	atomic::{AtomicUsize, Ordering},
};

use serde_json::json;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use courtwatch_domain::{Rate, StoredQuery};
use courtwatch_service::{
	AlertEvent, BoxFuture, Error, MemoryBackends, QueryStore, Result, memory::MemoryQueryStore,
};

use super::Harness;

/// Query store that fails chosen reads and last-hit writes.
struct FlakyQueries {
	inner: Arc<MemoryQueryStore>,
	failing_get: Mutex<Option<(Uuid, bool)>>,
	failing_touches: AtomicUsize,
}
impl FlakyQueries {
	fn fail_get(&self, query_id: Uuid, retryable: bool) {
		*self.failing_get.lock().expect("Flaky lock poisoned.") = Some((query_id, retryable));
	}

	fn heal(&self) {
		*self.failing_get.lock().expect("Flaky lock poisoned.") = None;
	}
}
impl QueryStore for FlakyQueries {
	fn insert<'a>(
		&'a self,
		query: &'a StoredQuery,
		event: &'a AlertEvent,
	) -> BoxFuture<'a, Result<()>> {
		self.inner.insert(query, event)
	}

	fn update<'a>(
		&'a self,
		query: &'a StoredQuery,
		event: &'a AlertEvent,
	) -> BoxFuture<'a, Result<bool>> {
		self.inner.update(query, event)
	}

	fn delete<'a>(&'a self, query_id: Uuid, event: &'a AlertEvent) -> BoxFuture<'a, Result<bool>> {
		self.inner.delete(query_id, event)
	}

	fn get<'a>(&'a self, query_id: Uuid) -> BoxFuture<'a, Result<Option<StoredQuery>>> {
		Box::pin(async move {
			let failing = *self.failing_get.lock().expect("Flaky lock poisoned.");

			match failing {
				Some((failing_id, true)) if failing_id == query_id => {
					Err(Error::Storage { message: "connection reset".to_string() })
				},
				Some((failing_id, false)) if failing_id == query_id => {
					Err(Error::InvalidRequest { message: "row does not decode".to_string() })
				},
				_ => self.inner.get(query_id).await,
			}
		})
	}

	fn list_after<'a>(
		&'a self,
		after: Option<Uuid>,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<StoredQuery>>> {
		self.inner.list_after(after, limit)
	}

	fn find_by_secret_key<'a>(
		&'a self,
		secret_key: &'a str,
	) -> BoxFuture<'a, Result<Option<StoredQuery>>> {
		self.inner.find_by_secret_key(secret_key)
	}

	fn touch_last_hit<'a>(
		&'a self,
		query_ids: &'a [Uuid],
		at: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let remaining = self.failing_touches.load(Ordering::SeqCst);

			if remaining > 0 {
				self.failing_touches.store(remaining - 1, Ordering::SeqCst);

				return Err(Error::Storage { message: "connection reset".to_string() });
			}

			self.inner.touch_last_hit(query_ids, at).await
		})
	}
}

fn flaky_harness(failing_touches: usize) -> (Harness, Arc<FlakyQueries>) {
	let memory = MemoryBackends::new(super::START);
	let flaky = Arc::new(FlakyQueries {
		inner: memory.queries.clone(),
		failing_get: Mutex::new(None),
		failing_touches: AtomicUsize::new(failing_touches),
	});
	let mut backends = memory.backends();

	backends.queries = flaky.clone();

	(Harness::with_backends(super::memory_config(10), memory, backends), flaky)
}

#[tokio::test]
async fn last_hit_write_failure_still_delivers_realtime() {
	let (harness, _flaky) = flaky_harness(1);
	let alert = harness
		.create_alert(4, "Standing", json!({ "type": "opinion", "q": "standing" }), Rate::RealTime)
		.await;
	let document = super::opinion(20, None, "Standing doctrine.");
	let report = harness
		.service
		.on_document_committed(document.clone())
		.await
		.expect("A last hit write failure must not fail percolation.");

	assert_eq!(report.realtime_sent, 1);
	assert_eq!(report.failed, 0);

	harness.memory.clock.advance(Duration::seconds(1));

	let repeat =
		harness.service.on_document_committed(document).await.expect("Percolation should succeed.");
	let sent = harness.memory.delivery.realtime();

	assert_eq!(repeat.realtime_suppressed, 1);
	assert_eq!(sent.len(), 1);
	assert_eq!(sent[0].alert.query_id, alert.query_id);
}

#[tokio::test]
async fn one_failing_match_does_not_block_the_rest() {
	let (harness, flaky) = flaky_harness(0);
	let broken = harness
		.create_alert(1, "Broken", json!({ "type": "opinion", "q": "habeas" }), Rate::RealTime)
		.await;
	let healthy = harness
		.create_alert(2, "Healthy", json!({ "type": "opinion", "q": "habeas" }), Rate::RealTime)
		.await;
	let document = super::opinion(30, None, "A habeas petition.");

	flaky.fail_get(broken.query_id, true);

	let err = harness
		.service
		.on_document_committed(document.clone())
		.await
		.expect_err("A retryable match failure should surface.");

	assert!(err.is_retryable(), "Unexpected error: {err}");

	let sent = harness.memory.delivery.realtime();

	assert_eq!(sent.len(), 1);
	assert_eq!(sent[0].alert.query_id, healthy.query_id);

	flaky.heal();
	harness.memory.clock.advance(Duration::seconds(1));

	let retried =
		harness.service.on_document_committed(document).await.expect("Retry should succeed.");

	assert_eq!(retried.realtime_sent, 1);
	assert_eq!(retried.realtime_suppressed, 1);
	assert_eq!(harness.memory.delivery.realtime().len(), 2);
	assert_eq!(harness.memory.delivery.realtime()[1].alert.query_id, broken.query_id);
}

#[tokio::test]
async fn permanent_match_failures_are_counted_not_retried() {
	let (harness, flaky) = flaky_harness(0);
	let broken = harness
		.create_alert(1, "Broken", json!({ "type": "opinion", "q": "habeas" }), Rate::Weekly)
		.await;

	harness
		.create_alert(2, "Healthy", json!({ "type": "opinion", "q": "habeas" }), Rate::Weekly)
		.await;
	flaky.fail_get(broken.query_id, false);

	let report = harness
		.service
		.on_document_committed(super::opinion(30, None, "A habeas petition."))
		.await
		.expect("Non-retryable match failures are reported, not raised.");

	assert_eq!(report.matched, 2);
	assert_eq!(report.failed, 1);
	assert_eq!(report.accumulated, 1);
}
