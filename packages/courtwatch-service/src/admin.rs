use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
	AlertService, BoxFuture, Error, QueryStore, Result,
	pagination::{Page, PageQuery, PageRequest, PageSource},
};
use courtwatch_domain::{CompiledQuery, SortSpec, SortValue, StoredQuery};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildReport {
	pub scanned: u64,
	pub upserted: u64,
	pub unchanged: u64,
	/// Stored queries that no longer compile. Their entries are removed.
	pub invalid: u64,
	pub removed_orphans: u64,
}

/// Every stored query, ascending by id.
pub struct StoredQueryPages<'q> {
	store: &'q dyn QueryStore,
	sort: SortSpec,
}
impl<'q> StoredQueryPages<'q> {
	pub const SHAPE: &'static str = "stored_query";

	pub fn new(store: &'q dyn QueryStore) -> Self {
		Self { store, sort: SortSpec::by_id() }
	}
}
impl PageSource for StoredQueryPages<'_> {
	type Item = StoredQuery;

	fn shape(&self) -> &str {
		Self::SHAPE
	}

	fn sort(&self) -> &SortSpec {
		&self.sort
	}

	fn sort_key(&self, item: &StoredQuery) -> Vec<SortValue> {
		vec![SortValue::Id(item.query_id)]
	}

	fn fetch<'a>(&'a self, query: PageQuery) -> BoxFuture<'a, Result<Vec<StoredQuery>>> {
		Box::pin(async move {
			if query.reverse {
				return Err(Error::InvalidRequest {
					message: "stored queries can only be listed forward.".to_string(),
				});
			}

			let after = match query.after.as_deref() {
				Some([SortValue::Id(query_id)]) => Some(*query_id),
				_ => None,
			};

			self.store.list_after(after, query.limit).await
		})
	}
}

impl AlertService {
	pub async fn list_stored_queries(&self, request: PageRequest) -> Result<Page<StoredQuery>> {
		let source = StoredQueryPages::new(self.backends.queries.as_ref());

		self.paginate(&source, request).await
	}

	/// Replays every stored query into the percolator, then removes entries whose query is gone.
	pub async fn rebuild_percolator(&self) -> Result<RebuildReport> {
		let batch = self.cfg.percolator.batch_size;
		let mut report = RebuildReport::default();
		let mut after: Option<Uuid> = None;

		loop {
			let queries = self.backends.queries.list_after(after, batch).await?;

			for stored in &queries {
				report.scanned += 1;

				match CompiledQuery::from_canonical(&stored.query_string) {
					Ok(compiled) =>
						if self.backends.percolator.upsert(stored.query_id, &compiled).await? {
							report.upserted += 1;
						} else {
							report.unchanged += 1;
						},
					Err(err) => {
						tracing::warn!(
							query_id = %stored.query_id,
							error = %err,
							"Stored query no longer compiles; removing it from the percolator."
						);

						self.backends.percolator.remove(stored.query_id).await?;

						report.invalid += 1;
					},
				}
			}

			if queries.len() < batch as usize {
				break;
			}

			after = queries.last().map(|stored| stored.query_id);
		}

		after = None;

		loop {
			let ids = self.backends.percolator.ids_after(after, batch).await?;

			for query_id in &ids {
				if self.backends.queries.get(*query_id).await?.is_none() {
					self.backends.percolator.remove(*query_id).await?;

					report.removed_orphans += 1;
				}
			}

			if ids.len() < batch as usize {
				break;
			}

			after = ids.last().copied();
		}

		tracing::info!(
			scanned = report.scanned,
			upserted = report.upserted,
			unchanged = report.unchanged,
			invalid = report.invalid,
			removed_orphans = report.removed_orphans,
			"Percolator rebuild finished."
		);

		Ok(report)
	}
}
