use serde_json::json;

use courtwatch_domain::{CandidateDocument, DocumentType, Rate, StructuredFields};
use courtwatch_service::Error;

use super::Harness;

fn ninth_circuit() -> serde_json::Value {
	json!({
		"type": "opinion",
		"q": "immunity",
		"filter": {
			"schema": "alert_filter_expr/v1",
			"expr": { "op": "eq", "field": "court_id", "value": "ca9" }
		}
	})
}

#[tokio::test]
async fn parent_fields_reach_children_on_parent_commit() {
	let harness = Harness::new(super::memory_config(10));

	harness.create_alert(1, "Ninth Circuit immunity", ninth_circuit(), Rate::Daily).await;

	let before = harness
		.service
		.on_document_committed(super::opinion(8, Some(80), "Qualified immunity applies."))
		.await
		.expect("Percolation should succeed.");

	assert_eq!(before.matched, 0);

	let report = harness
		.service
		.on_parent_committed(super::cluster(
			80,
			StructuredFields { court_id: Some("ca9".to_string()), ..StructuredFields::default() },
		))
		.await
		.expect("Parent commit should succeed.");

	assert_eq!(report.children, 1);
	assert_eq!(report.reindexed, 1);
	assert_eq!(report.matched, 1);

	let after = harness
		.service
		.on_document_committed(super::opinion(9, Some(80), "Immunity from suit."))
		.await
		.expect("Percolation should succeed.");

	assert_eq!(after.matched, 1);
}

#[tokio::test]
async fn containers_cannot_be_percolated() {
	let harness = Harness::new(super::memory_config(10));
	let docket = CandidateDocument {
		id: 1,
		document_type: DocumentType::Docket,
		parent_id: None,
		fields: StructuredFields::default(),
		searchable_text: String::new(),
	};
	let err = harness.service.on_document_committed(docket).await.expect_err("Expected refusal.");

	assert!(matches!(err, Error::NotImplemented { .. }), "Unexpected error: {err}");
	assert!(!err.is_retryable());
}

#[tokio::test]
async fn percolator_outage_is_retryable_for_documents_and_parents() {
	let harness = Harness::new(super::memory_config(10));

	harness.create_alert(1, "Ninth Circuit immunity", ninth_circuit(), Rate::Daily).await;
	harness
		.service
		.on_document_committed(super::opinion(8, Some(80), "Qualified immunity applies."))
		.await
		.expect("Percolation should succeed.");
	harness.memory.percolator.set_available(false);

	let err = harness
		.service
		.on_document_committed(super::opinion(9, Some(80), "Immunity."))
		.await
		.expect_err("Expected an outage.");

	assert!(matches!(err, Error::PercolationUnavailable { .. }), "Unexpected error: {err}");

	let err = harness
		.service
		.on_parent_committed(super::cluster(80, StructuredFields::default()))
		.await
		.expect_err("Expected an outage.");

	assert!(err.is_retryable(), "Unexpected error: {err}");

	harness.memory.percolator.set_available(true);

	let report = harness
		.service
		.on_parent_committed(super::cluster(
			80,
			StructuredFields { court_id: Some("ca9".to_string()), ..StructuredFields::default() },
		))
		.await
		.expect("Parent commit should succeed.");

	assert_eq!(report.children, 2);
	assert_eq!(report.matched, 2);
}
