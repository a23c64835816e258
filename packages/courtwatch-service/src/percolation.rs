use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
	AlertService, BoxFuture, Error, PercolatorIndex, Result,
	pagination::{self, PageQuery, PageSource},
};
use courtwatch_domain::{IndexedDocument, SortSpec, SortValue};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PercolatorMatch {
	pub query_id: Uuid,
	/// Context around the first free-text hit, when the query has free text.
	pub snippet: Option<String>,
}

/// The matches for one document, as a listing sorted by query id.
struct PercolatorPages<'d> {
	index: &'d dyn PercolatorIndex,
	document: &'d IndexedDocument,
	sort: SortSpec,
}
impl PageSource for PercolatorPages<'_> {
	type Item = PercolatorMatch;

	fn shape(&self) -> &str {
		self.document.document_type.as_str()
	}

	fn sort(&self) -> &SortSpec {
		&self.sort
	}

	fn sort_key(&self, item: &PercolatorMatch) -> Vec<SortValue> {
		vec![SortValue::Id(item.query_id)]
	}

	fn fetch<'a>(&'a self, query: PageQuery) -> BoxFuture<'a, Result<Vec<PercolatorMatch>>> {
		Box::pin(async move {
			if query.reverse {
				return Err(Error::InvalidRequest {
					message: "percolation pages only walk forward.".to_string(),
				});
			}

			let after = match query.after.as_deref() {
				None => None,
				Some([SortValue::Id(query_id)]) => Some(*query_id),
				Some(_) => {
					return Err(Error::InvalidCursor {
						message: "percolation position must be a single query id.".to_string(),
					});
				},
			};

			self.index.percolate_page(self.document, after, query.limit).await
		})
	}
}

impl AlertService {
	/// Every stored query matching `document`, ascending by query id, each exactly once.
	///
	/// The walk resumes from the last seen query id rather than an offset, so entries added or
	/// removed mid-walk never shift the rest. A walk that outlives `walk_timeout_ms` is abandoned
	/// with a retryable error.
	pub async fn percolate(&self, document: &IndexedDocument) -> Result<Vec<PercolatorMatch>> {
		if !document.document_type.is_leaf() {
			return Err(Error::NotImplemented {
				message: format!(
					"'{}' is a container type and cannot be percolated.",
					document.document_type
				),
			});
		}

		let timeout_ms = self.cfg.percolator.walk_timeout_ms;
		let walk = self.walk_percolator(document);

		match tokio::time::timeout(Duration::from_millis(timeout_ms), walk).await {
			Ok(result) => result,
			Err(_) => {
				tracing::error!(
					document_id = document.id,
					timeout_ms,
					"Percolation walk timed out; the document will be retried."
				);

				Err(Error::PercolationTimeout { timeout_ms })
			},
		}
	}

	async fn walk_percolator(&self, document: &IndexedDocument) -> Result<Vec<PercolatorMatch>> {
		let source = PercolatorPages {
			index: self.backends.percolator.as_ref(),
			document,
			sort: SortSpec::by_id(),
		};
		let batch_size = self.cfg.percolator.batch_size;
		let mut matches = Vec::new();
		let mut token = None;
		let mut pages = 0_u32;

		loop {
			let page = pagination::paginate(&source, batch_size, token.as_deref(), false, None).await?;

			pages += 1;

			matches.extend(page.items);

			match page.next_cursor {
				Some(next) => token = Some(next),
				None => break,
			}
		}

		tracing::debug!(document_id = document.id, pages, matches = matches.len(), "Percolation walk finished.");

		Ok(matches)
	}
}
