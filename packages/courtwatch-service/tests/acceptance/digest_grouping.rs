use serde_json::json;
use time::{Duration, macros::datetime};

use courtwatch_domain::Rate;
use courtwatch_service::{DigestGroup, Error, NoveltyStore};

use super::Harness;

#[tokio::test]
async fn hits_under_one_parent_collapse_into_one_group() {
	let harness = Harness::new(super::memory_config(10));
	let alert = harness
		.create_alert(
			3,
			"Fourth Amendment",
			json!({ "type": "opinion", "q": "\"fourth amendment\"" }),
			Rate::Weekly,
		)
		.await;

	for (day, document_id) in [(0, 101), (2, 102), (4, 103)] {
		harness.memory.clock.set(super::START + Duration::days(day));
		harness
			.service
			.on_document_committed(super::opinion(
				document_id,
				Some(77),
				"A search under the Fourth Amendment.",
			))
			.await
			.expect("Percolation should succeed.");
	}

	harness.memory.clock.set(super::START + Duration::days(7));

	let report = harness.service.flush_digests(Rate::Weekly).await.expect("Flush should succeed.");
	let digests = harness.memory.delivery.digests();

	assert_eq!(report.messages_sent, 1);
	assert_eq!(report.alerts_flushed, 1);
	assert_eq!(report.hits_flushed, 3);
	assert_eq!(digests.len(), 1);

	let message = &digests[0];

	assert_eq!(message.recipient, 3);
	assert_eq!(message.subject, "3 new hits for 1 alerts");
	assert_eq!(message.cut_off, datetime!(2024-04-08 00:00 UTC).date());
	assert_eq!(message.entries.len(), 1);
	assert_eq!(
		message.entries[0].groups,
		[DigestGroup { parent_id: 77, hit_count: 3, document_ids: vec![101, 102, 103] }]
	);
	assert_eq!(message.unsubscribe[0].secret_key, alert.secret_key);
	assert!(
		harness
			.memory
			.novelty
			.peek_set(&Rate::Weekly.hit_set_key(alert.query_id))
			.await
			.expect("Peek should succeed.")
			.is_empty()
	);
}

#[tokio::test]
async fn recipients_get_one_message_each_and_subjects_keep_true_totals() {
	let mut cfg = super::memory_config(10);

	cfg.dispatch.digest_max_alerts_per_recipient = 2;

	let harness = Harness::new(cfg);

	for index in 0..3 {
		harness
			.create_alert(
				1,
				&format!("Contract {index}"),
				json!({ "type": "opinion", "q": "contract" }),
				Rate::Daily,
			)
			.await;
	}

	harness.create_alert(2, "Tort", json!({ "type": "opinion", "q": "contract" }), Rate::Daily).await;
	harness
		.service
		.on_document_committed(super::opinion(5, None, "Breach of contract."))
		.await
		.expect("Percolation should succeed.");
	harness
		.service
		.on_document_committed(super::opinion(6, None, "Contract formation."))
		.await
		.expect("Percolation should succeed.");

	let report = harness.service.flush_digests(Rate::Daily).await.expect("Flush should succeed.");
	let digests = harness.memory.delivery.digests();

	assert_eq!(report.messages_sent, 2);
	assert_eq!(report.alerts_flushed, 4);

	let capped = digests.iter().find(|message| message.recipient == 1).expect("Expected a digest for user 1.");

	assert_eq!(capped.subject, "6 new hits for 3 alerts");
	assert_eq!(capped.entries.len(), 2);
	assert_eq!(capped.unsubscribe.len(), 3);
}

#[tokio::test]
async fn monthly_flush_refuses_late_days() {
	let harness = Harness::new(super::memory_config(10));

	harness.memory.clock.set(datetime!(2024-01-30 06:00 UTC));

	let err = harness.service.flush_digests(Rate::Monthly).await.expect_err("Expected refusal.");

	assert!(matches!(err, Error::InvalidRequest { .. }), "Unexpected error: {err}");

	harness.memory.clock.set(datetime!(2024-02-01 06:00 UTC));

	let report = harness.service.flush_digests(Rate::Monthly).await.expect("Flush should succeed.");

	assert_eq!(report.cut_off, datetime!(2024-01-01 00:00 UTC).date());

	let err = harness.service.flush_digests(Rate::RealTime).await.expect_err("Expected refusal.");

	assert!(matches!(err, Error::InvalidRequest { .. }), "Unexpected error: {err}");
}

#[tokio::test]
async fn recipient_flush_leaves_other_recipients_pending() {
	let harness = Harness::new(super::memory_config(10));

	for user_id in [1, 2] {
		harness
			.create_alert(user_id, "Contract", json!({ "type": "opinion", "q": "contract" }), Rate::Daily)
			.await;
	}

	harness
		.service
		.on_document_committed(super::opinion(5, None, "Breach of contract."))
		.await
		.expect("Percolation should succeed.");

	let preview = harness
		.service
		.pending_digest_for(Rate::Daily, Some(2))
		.await
		.expect("Pending digest should load.");

	assert_eq!(preview.len(), 1);
	assert_eq!(preview[0].recipient, 2);

	let report =
		harness.service.flush_digests_for(Rate::Daily, Some(2)).await.expect("Flush should succeed.");

	assert_eq!(report.messages_sent, 1);
	assert_eq!(report.alerts_sent, 1);
	assert_eq!(harness.memory.delivery.digests()[0].recipient, 2);

	let pending = harness.service.pending_digest(Rate::Daily).await.expect("Pending digest should load.");

	assert_eq!(pending.len(), 1);
	assert_eq!(pending[0].recipient, 1);
}
