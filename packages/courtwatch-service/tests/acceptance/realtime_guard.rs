use serde_json::json;
use time::Duration;

use courtwatch_domain::Rate;

use super::Harness;

#[tokio::test]
async fn saves_inside_the_interval_send_once() {
	let harness = Harness::new(super::memory_config(10));
	let alert = harness
		.create_alert(4, "Standing", json!({ "type": "opinion", "q": "standing" }), Rate::RealTime)
		.await;
	let document = super::opinion(20, Some(2), "The plaintiffs lack standing to sue.");
	let first = harness
		.service
		.on_document_committed(document.clone())
		.await
		.expect("Percolation should succeed.");

	harness.memory.clock.advance(Duration::seconds(60));

	let second =
		harness.service.on_document_committed(document).await.expect("Percolation should succeed.");

	assert_eq!(first.realtime_sent, 1);
	assert_eq!(second.realtime_sent, 0);
	assert_eq!(second.realtime_suppressed, 1);

	let sent = harness.memory.delivery.realtime();

	assert_eq!(sent.len(), 1);
	assert_eq!(sent[0].recipient, 4);
	assert_eq!(sent[0].alert.query_id, alert.query_id);
	assert_eq!(sent[0].alert.secret_key, alert.secret_key);
	assert_eq!(sent[0].document.document_id, 20);
	assert_eq!(sent[0].document.parent_id, 2);
	assert_eq!(sent[0].document.snippet.as_deref(), Some("the plaintiffs lack standing to sue"));
}

#[tokio::test]
async fn saves_beyond_the_interval_send_again() {
	let harness = Harness::new(super::memory_config(10));

	harness
		.create_alert(4, "Standing", json!({ "type": "opinion", "q": "standing" }), Rate::RealTime)
		.await;

	let document = super::opinion(20, None, "Standing doctrine.");

	harness.service.on_document_committed(document.clone()).await.expect("Percolation should succeed.");
	harness.memory.clock.advance(Duration::seconds(301));
	harness.service.on_document_committed(document).await.expect("Percolation should succeed.");

	assert_eq!(harness.memory.delivery.realtime().len(), 2);
	assert_eq!(harness.service.purge_expired_guards().await.expect("Purge should succeed."), 0);

	harness.memory.clock.advance(Duration::seconds(301));

	assert_eq!(harness.service.purge_expired_guards().await.expect("Purge should succeed."), 1);
}

#[tokio::test]
async fn delivery_failures_do_not_fail_ingestion() {
	let harness = Harness::new(super::memory_config(10));

	harness
		.create_alert(4, "Standing", json!({ "type": "opinion", "q": "standing" }), Rate::RealTime)
		.await;
	harness.memory.delivery.set_failing(true);

	let report = harness
		.service
		.on_document_committed(super::opinion(20, None, "Standing doctrine."))
		.await
		.expect("Percolation should succeed despite delivery failure.");

	assert_eq!(report.delivery_failures, 1);
	assert_eq!(report.realtime_sent, 0);
}
