use serde_json::json;

use courtwatch_domain::Rate;
use courtwatch_service::Error;

use super::Harness;

#[tokio::test]
async fn late_cited_by_matches_exactly_once() {
	let harness = Harness::new(super::memory_config(10));
	let alert = harness
		.create_alert(
			1,
			"Cited by 2",
			json!({
				"type": "opinion",
				"filter": {
					"schema": "alert_filter_expr/v1",
					"expr": { "op": "contains", "field": "cited_by", "value": 2 }
				}
			}),
			Rate::Weekly,
		)
		.await;
	let initial = harness
		.service
		.on_document_committed(super::opinion(1, None, "An early opinion."))
		.await
		.expect("Percolation should succeed.");

	assert_eq!(initial.matched, 0);

	let mut citing = super::opinion(2, None, "A later opinion.");

	citing.fields.cites = vec![1];

	harness.service.on_document_committed(citing).await.expect("Percolation should succeed.");

	let updated = harness
		.service
		.on_back_references_updated(1, &[2])
		.await
		.expect("Back-reference update should succeed.");

	assert_eq!(updated.matched, 1);
	assert_eq!(updated.accumulated, 1);

	let repeated = harness
		.service
		.on_back_references_updated(1, &[2, 2])
		.await
		.expect("Back-reference update should succeed.");

	assert_eq!(repeated.accumulated, 0);
	assert_eq!(repeated.already_pending, 1);

	let pending = harness.service.pending_digest(Rate::Weekly).await.expect("Pending digest should load.");

	assert_eq!(pending[0].entries[0].query_id, alert.query_id);
	assert_eq!(pending[0].entries[0].hits, [1]);
}

#[tokio::test]
async fn back_references_for_unknown_documents_are_not_found() {
	let harness = Harness::new(super::memory_config(10));
	let err = harness
		.service
		.on_back_references_updated(404, &[1])
		.await
		.expect_err("Expected a missing document.");

	assert!(matches!(err, Error::NotFound { .. }), "Unexpected error: {err}");
	assert!(!err.is_retryable());
}
