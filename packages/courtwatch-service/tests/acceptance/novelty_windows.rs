use serde_json::json;
use time::Duration;

use courtwatch_domain::{Rate, StoredQuery};
use courtwatch_service::{NoveltyStore, QueryStore};

use super::Harness;

async fn reload(harness: &Harness, alert: &StoredQuery) -> StoredQuery {
	harness
		.memory
		.queries
		.get(alert.query_id)
		.await
		.expect("Query store should answer.")
		.expect("Alert should still exist.")
}

#[tokio::test]
async fn repeated_triggers_in_one_window_count_once() {
	let harness = Harness::new(super::memory_config(10));
	let alert = harness
		.create_alert(1, "Miranda", json!({ "type": "opinion", "q": "miranda" }), Rate::Daily)
		.await;
	let document = super::opinion(10, Some(3), "The Miranda warnings were not given.");

	for attempt in 0..3 {
		let report = harness
			.service
			.on_document_committed(document.clone())
			.await
			.expect("Percolation should succeed.");

		assert_eq!(report.matched, 1);
		assert_eq!(report.accumulated, usize::from(attempt == 0));
		assert_eq!(report.already_pending, usize::from(attempt != 0));
	}

	let pending = harness.service.pending_digest(Rate::Daily).await.expect("Pending digest should load.");

	assert_eq!(pending.len(), 1);
	assert_eq!(pending[0].recipient, 1);
	assert_eq!(pending[0].entries[0].query_id, alert.query_id);
	assert_eq!(pending[0].entries[0].hits, [10]);

	let report = harness.service.flush_digests(Rate::Daily).await.expect("Flush should succeed.");

	assert_eq!(report.messages_sent, 1);
	assert_eq!(report.hits_flushed, 1);
	assert_eq!(reload(&harness, &alert).await.date_last_hit, Some(super::START));

	let report = harness.service.flush_digests(Rate::Daily).await.expect("Flush should succeed.");

	assert_eq!(report.messages_sent, 0);
	assert_eq!(harness.memory.delivery.digests().len(), 1);
}

#[tokio::test]
async fn a_flushed_pair_is_never_reported_again() {
	let harness = Harness::new(super::memory_config(10));

	harness.create_alert(1, "Miranda", json!({ "type": "opinion", "q": "miranda" }), Rate::Weekly).await;

	let document = super::opinion(10, None, "Miranda rights.");

	harness.service.on_document_committed(document.clone()).await.expect("Percolation should succeed.");
	harness.service.flush_digests(Rate::Weekly).await.expect("Flush should succeed.");
	harness.memory.clock.advance(Duration::days(7));

	let report =
		harness.service.on_document_committed(document).await.expect("Percolation should succeed.");

	assert_eq!(report.accumulated, 0);
	assert_eq!(report.already_delivered, 1);

	let fresh = harness
		.service
		.on_document_committed(super::opinion(11, None, "More on Miranda."))
		.await
		.expect("Percolation should succeed.");

	assert_eq!(fresh.accumulated, 1);

	let report = harness.service.flush_digests(Rate::Weekly).await.expect("Flush should succeed.");
	let digests = harness.memory.delivery.digests();

	assert_eq!(report.hits_flushed, 1);
	assert_eq!(digests.len(), 2);
	assert_eq!(digests[0].entries[0].groups[0].document_ids, [10]);
	assert_eq!(digests[1].entries[0].groups[0].document_ids, [11]);
}

#[tokio::test]
async fn parent_commits_do_not_resend_flushed_children() {
	let harness = Harness::new(super::memory_config(10));

	harness
		.create_alert(1, "Miranda", json!({ "type": "opinion", "q": "miranda" }), Rate::Daily)
		.await;
	harness
		.service
		.on_document_committed(super::opinion(10, Some(3), "Miranda rights."))
		.await
		.expect("Percolation should succeed.");
	harness.service.flush_digests(Rate::Daily).await.expect("Flush should succeed.");
	harness.memory.clock.advance(Duration::days(1));

	let report = harness
		.service
		.on_parent_committed(super::cluster(3, Default::default()))
		.await
		.expect("Parent reindex should succeed.");

	assert_eq!(report.reindexed, 1);
	assert_eq!(report.matched, 1);

	let flushed = harness.service.flush_digests(Rate::Daily).await.expect("Flush should succeed.");

	assert_eq!(flushed.messages_sent, 0);
	assert_eq!(harness.memory.delivery.digests().len(), 1);
}

#[tokio::test]
async fn deleting_an_alert_forgets_what_it_reported() {
	let harness = Harness::new(super::memory_config(10));
	let alert = harness
		.create_alert(1, "Miranda", json!({ "type": "opinion", "q": "miranda" }), Rate::Daily)
		.await;

	harness
		.service
		.on_document_committed(super::opinion(10, None, "Miranda rights."))
		.await
		.expect("Percolation should succeed.");
	harness.service.flush_digests(Rate::Daily).await.expect("Flush should succeed.");
	harness.service.delete_alert(alert.query_id, 1).await.expect("Delete should succeed.");
	harness.settle().await;

	let delivered = courtwatch_service::novelty::delivered_set_key(alert.query_id);

	assert!(
		harness.memory.novelty.peek_set(&delivered).await.expect("Peek should succeed.").is_empty()
	);
}

#[tokio::test]
async fn consumed_hits_stay_consumed_when_delivery_fails() {
	let harness = Harness::new(super::memory_config(10));

	harness.create_alert(1, "Miranda", json!({ "type": "opinion", "q": "miranda" }), Rate::Weekly).await;
	harness
		.service
		.on_document_committed(super::opinion(10, None, "Miranda rights."))
		.await
		.expect("Percolation should succeed.");
	harness.memory.delivery.set_failing(true);

	let report = harness.service.flush_digests(Rate::Weekly).await.expect("Flush should succeed.");

	assert_eq!(report.delivery_failures, 1);
	assert_eq!(report.messages_sent, 0);
	assert!(
		harness.service.pending_digest(Rate::Weekly).await.expect("Pending digest should load.").is_empty()
	);
}
