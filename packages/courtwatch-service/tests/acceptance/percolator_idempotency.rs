use serde_json::json;
use uuid::Uuid;

use courtwatch_domain::{CompiledQuery, Rate};
use courtwatch_service::{CreateAlertRequest, Error, PercolatorIndex};

use super::Harness;

#[tokio::test]
async fn upserting_the_same_query_twice_is_a_no_op() {
	let harness = Harness::new(super::memory_config(10));
	let alert = harness
		.create_alert(1, "Standing", json!({ "type": "opinion", "q": "standing" }), Rate::Daily)
		.await;
	let percolator = &harness.memory.percolator;
	let compiled =
		CompiledQuery::from_canonical(&alert.query_string).expect("Stored query should compile.");

	assert!(percolator.contains(alert.query_id));
	assert!(!percolator.upsert(alert.query_id, &compiled).await.expect("Upsert should succeed."));
	assert!(!percolator.upsert(alert.query_id, &compiled).await.expect("Upsert should succeed."));
	assert_eq!(percolator.len().await.expect("Length should load."), 1);

	harness
		.service
		.on_stored_query_committed(alert.query_id, Some(&alert.query_string))
		.await
		.expect("Replaying the commit should succeed.");

	assert_eq!(percolator.len().await.expect("Length should load."), 1);
}

#[tokio::test]
async fn removing_a_missing_entry_succeeds() {
	let harness = Harness::new(super::memory_config(10));
	let query_id = Uuid::new_v4();

	harness
		.service
		.on_stored_query_committed(query_id, None)
		.await
		.expect("Removing an unknown query should succeed.");

	let response =
		harness.service.delete_alert(query_id, 1).await.expect("Deleting twice should succeed.");

	assert!(!response.deleted);

	harness.settle().await;
}

#[tokio::test]
async fn invalid_queries_never_reach_the_percolator() {
	let harness = Harness::new(super::memory_config(10));
	let err = harness
		.service
		.create_alert(CreateAlertRequest {
			user_id: 1,
			name: "Popular".to_string(),
			query: json!({
				"type": "opinion",
				"filter": {
					"schema": "alert_filter_expr/v1",
					"expr": { "op": "gt", "field": "popularity", "value": 10 }
				}
			}),
			rate: Rate::Daily,
		})
		.await
		.expect_err("Expected the query to be rejected.");

	match err {
		Error::InvalidQuery { path, message } => {
			assert_eq!(path, "$.filter.expr.field");
			assert!(message.contains("computed"), "Unexpected message: {message}");
		},
		other => panic!("Unexpected error: {other}"),
	}

	assert!(harness.memory.outbox.is_empty());
	assert_eq!(harness.memory.percolator.len().await.expect("Length should load."), 0);
}

#[tokio::test]
async fn rebuild_replays_queries_and_drops_orphans() {
	let harness = Harness::new(super::memory_config(2));
	let mut ids = Vec::new();

	for index in 0..5 {
		let alert = harness
			.create_alert(
				1,
				&format!("Alert {index}"),
				json!({ "type": "opinion", "q": format!("term{index}") }),
				Rate::Weekly,
			)
			.await;

		ids.push(alert.query_id);
	}

	let orphan = Uuid::new_v4();
	let compiled = CompiledQuery::compile(r#"{"type":"opinion","q":"orphan"}"#)
		.expect("Query should compile.");

	harness.memory.percolator.upsert(orphan, &compiled).await.expect("Upsert should succeed.");
	harness.memory.percolator.remove(ids[0]).await.expect("Remove should succeed.");

	let report = harness.service.rebuild_percolator().await.expect("Rebuild should succeed.");

	assert_eq!(report.scanned, 5);
	assert_eq!(report.upserted, 1);
	assert_eq!(report.unchanged, 4);
	assert_eq!(report.removed_orphans, 1);
	assert!(!harness.memory.percolator.contains(orphan));
	assert!(ids.iter().all(|id| harness.memory.percolator.contains(*id)));
}

#[tokio::test]
async fn secret_key_survives_updates_and_unsubscribes() {
	let harness = Harness::new(super::memory_config(10));
	let alert = harness
		.create_alert(7, "Habeas", json!({ "type": "opinion", "q": "habeas" }), Rate::Daily)
		.await;
	let updated = harness
		.service
		.update_alert(courtwatch_service::UpdateAlertRequest {
			query_id: alert.query_id,
			user_id: 7,
			name: Some("Habeas corpus".to_string()),
			query: Some(json!({ "type": "opinion", "q": "\"habeas corpus\"" })),
			rate: Some(Rate::Weekly),
		})
		.await
		.expect("Update should succeed.");

	assert!(updated.query_changed);
	assert_eq!(updated.alert.secret_key, alert.secret_key);
	assert_eq!(
		harness.service.build_unsubscribe_token(alert.query_id).await.expect("Token should load."),
		alert.secret_key
	);

	harness.settle().await;

	let err = harness
		.service
		.delete_alert(alert.query_id, 8)
		.await
		.expect_err("Another user must not delete the alert.");

	assert!(matches!(err, Error::NotFound { .. }), "Unexpected error: {err}");

	let response =
		harness.service.unsubscribe(&alert.secret_key).await.expect("Unsubscribe should succeed.");

	assert!(response.deleted);

	harness.settle().await;

	assert!(!harness.memory.percolator.contains(alert.query_id));
}
