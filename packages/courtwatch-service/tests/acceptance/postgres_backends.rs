use std::sync::Arc;

use serde_json::json;

use courtwatch_domain::Rate;
use courtwatch_service::{
	AlertEvent, AlertService, Backends, CreateAlertRequest, EventBus, ManualClock, PercolatorIndex,
	QueryStore,
	memory::RecordingDelivery,
};
use courtwatch_storage::{db::Db, outbox};

async fn publish_outbox(db: &Db, bus: &EventBus) -> usize {
	let mut published = 0;

	while let Some(row) = outbox::claim_next_alert_event(db, super::START, 30)
		.await
		.expect("Failed to claim outbox row.")
	{
		let event = AlertEvent::from_payload(&row.event_kind, &row.payload)
			.expect("Outbox payload should decode.");

		bus.publish(&event).await.expect("Event should publish.");
		outbox::mark_alert_event_done(db, row.outbox_id, super::START)
			.await
			.expect("Failed to mark outbox row done.");

		published += 1;
	}

	published
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set COURTWATCH_PG_DSN to run."]
async fn weekly_alert_round_trips_through_postgres() {
	let Some(base_dsn) = courtwatch_testkit::env_dsn() else {
		eprintln!(
			"Skipping weekly_alert_round_trips_through_postgres; set COURTWATCH_PG_DSN to run this test."
		);

		return;
	};
	let test_db = courtwatch_testkit::TestDatabase::new(&base_dsn)
		.await
		.expect("Failed to create test database.");
	let cfg = super::test_config(test_db.dsn().to_string(), 2);
	let db = Db::connect(&cfg.storage.postgres).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	let delivery = Arc::new(RecordingDelivery::default());
	let backends = Backends::postgres(
		db.pool.clone(),
		delivery.clone(),
		Arc::new(ManualClock::new(super::START)),
	);
	let service = Arc::new(AlertService::new(cfg, backends));
	let mut bus = EventBus::new();

	bus.subscribe_all(service.clone());

	let alert = service
		.create_alert(CreateAlertRequest {
			user_id: 5,
			name: "Antitrust".to_string(),
			query: json!({ "type": "opinion", "q": "antitrust" }),
			rate: Rate::Weekly,
		})
		.await
		.expect("Failed to create alert.")
		.alert;

	assert_eq!(publish_outbox(&db, &bus).await, 1);
	assert_eq!(service.backends.percolator.len().await.expect("Length should load."), 1);

	for document_id in [1, 2, 1] {
		service
			.on_document_committed(super::opinion(document_id, Some(40), "An antitrust dispute."))
			.await
			.expect("Percolation should succeed.");
	}

	let report = service.flush_digests(Rate::Weekly).await.expect("Flush should succeed.");
	let digests = delivery.digests();

	assert_eq!(report.hits_flushed, 2);
	assert_eq!(digests.len(), 1);
	assert_eq!(digests[0].entries[0].groups[0].hit_count, 2);
	assert_eq!(digests[0].unsubscribe[0].query_id, alert.query_id);

	service.delete_alert(alert.query_id, 5).await.expect("Delete should succeed.");

	assert_eq!(publish_outbox(&db, &bus).await, 1);
	assert_eq!(service.backends.percolator.len().await.expect("Length should load."), 0);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set COURTWATCH_PG_DSN to run."]
async fn rejected_query_writes_queue_nothing() {
	let Some(base_dsn) = courtwatch_testkit::env_dsn() else {
		eprintln!(
			"Skipping rejected_query_writes_queue_nothing; set COURTWATCH_PG_DSN to run this test."
		);

		return;
	};
	let test_db = courtwatch_testkit::TestDatabase::new(&base_dsn)
		.await
		.expect("Failed to create test database.");
	let cfg = super::test_config(test_db.dsn().to_string(), 2);
	let db = Db::connect(&cfg.storage.postgres).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	let backends = Backends::postgres(
		db.pool.clone(),
		Arc::new(RecordingDelivery::default()),
		Arc::new(ManualClock::new(super::START)),
	);
	let service = AlertService::new(cfg, backends);
	let bus = EventBus::new();
	let alert = service
		.create_alert(CreateAlertRequest {
			user_id: 5,
			name: "Antitrust".to_string(),
			query: json!({ "type": "opinion", "q": "antitrust" }),
			rate: Rate::Daily,
		})
		.await
		.expect("Failed to create alert.")
		.alert;
	let event = AlertEvent::QueryCommitted { query_id: alert.query_id, compiled: None };

	assert_eq!(publish_outbox(&db, &bus).await, 1);

	service
		.backends
		.queries
		.insert(&alert, &event)
		.await
		.expect_err("A duplicate stored query must be rejected.");

	let mut missing = alert.clone();

	missing.query_id = uuid::Uuid::new_v4();

	assert!(
		!service.backends.queries.update(&missing, &event).await.expect("Update call should succeed.")
	);
	assert_eq!(publish_outbox(&db, &bus).await, 0, "Rejected writes must not queue events.");

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
