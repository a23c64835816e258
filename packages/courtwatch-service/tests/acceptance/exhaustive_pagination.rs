use serde_json::json;

use courtwatch_domain::{Cursor, IndexedDocument, Rate, SortValue};
use courtwatch_service::{Error, PageRequest};

use super::Harness;

#[tokio::test]
async fn walk_finds_every_match_once_for_any_batch_size() {
	const MATCHING: usize = 5;

	for batch_size in [1, 2, MATCHING as u32] {
		let harness = Harness::new(super::memory_config(batch_size));
		let mut expected = Vec::new();

		for index in 0..MATCHING {
			let alert = harness
				.create_alert(
					index as i64,
					&format!("Due process {index}"),
					json!({ "type": "opinion", "q": "\"due process\"" }),
					Rate::Weekly,
				)
				.await;

			expected.push(alert.query_id);
		}

		harness
			.create_alert(99, "Tax", json!({ "type": "opinion", "q": "tax" }), Rate::Weekly)
			.await;
		harness
			.create_alert(99, "Argued", json!({ "type": "oral_argument", "q": "due process" }), Rate::Weekly)
			.await;

		expected.sort();

		let document = IndexedDocument::build(
			&super::opinion(1, None, "Procedural due process requires notice."),
			None,
		);
		let found = harness
			.service
			.percolate(&document)
			.await
			.expect("Percolation should succeed.")
			.into_iter()
			.map(|found| found.query_id)
			.collect::<Vec<_>>();

		assert_eq!(found, expected, "Unexpected matches for batch size {batch_size}.");
	}
}

#[tokio::test]
async fn stored_query_listing_pages_by_cursor() {
	let harness = Harness::new(super::memory_config(10));

	for index in 0..5 {
		harness
			.create_alert(1, &format!("Alert {index}"), json!({ "type": "opinion", "q": "x" }), Rate::Daily)
			.await;
	}

	let mut seen = Vec::new();
	let mut cursor = None;

	loop {
		let page = harness
			.service
			.list_stored_queries(PageRequest { page_size: Some(2), cursor, ..PageRequest::default() })
			.await
			.expect("Listing should succeed.");

		assert!(page.items.len() <= 2);

		seen.extend(page.items.into_iter().map(|alert| alert.query_id));

		match page.next_cursor {
			Some(next) => cursor = Some(next),
			None => break,
		}
	}

	let mut sorted = seen.clone();

	sorted.sort();
	sorted.dedup();

	assert_eq!(seen.len(), 5);
	assert_eq!(seen, sorted);
}

#[tokio::test]
async fn cursors_from_other_listings_are_rejected() {
	let harness = Harness::new(super::memory_config(10));
	let token = Cursor::new("opinion", vec![SortValue::Id(uuid::Uuid::nil())], false).encode();
	let err = harness
		.service
		.list_stored_queries(PageRequest { cursor: Some(token), ..PageRequest::default() })
		.await
		.expect_err("Expected cursor rejection.");

	assert!(matches!(err, Error::InvalidCursor { .. }), "Unexpected error: {err}");

	let err = harness
		.service
		.list_stored_queries(PageRequest {
			cursor: Some("not-a-cursor".to_string()),
			..PageRequest::default()
		})
		.await
		.expect_err("Expected cursor rejection.");

	assert!(matches!(err, Error::InvalidCursor { .. }), "Unexpected error: {err}");
}
