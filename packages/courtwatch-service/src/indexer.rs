use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{AlertService, Error, Result, novelty::Accumulation, percolation::PercolatorMatch};
use courtwatch_domain::{CandidateDocument, CompiledQuery, IndexedDocument, ParentDocument};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PercolationReport {
	pub document_id: i64,
	pub matched: usize,
	pub realtime_sent: usize,
	/// Real-time matches inside the minimum send interval.
	pub realtime_suppressed: usize,
	pub accumulated: usize,
	pub already_pending: usize,
	/// Scheduled matches an earlier digest already reported.
	pub already_delivered: usize,
	/// Matches whose alert was deleted before it could be acted on.
	pub skipped_missing: usize,
	pub delivery_failures: usize,
	/// Matches that could not be acted on because a backend failed.
	pub failed: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentReindexReport {
	pub parent_id: i64,
	pub children: usize,
	pub reindexed: usize,
	pub failed: usize,
	pub matched: usize,
}

impl AlertService {
	/// Keeps the percolator in step with one stored query write.
	///
	/// The stored row is read back and compiled, so a stale or reordered event can never put an
	/// older version into the index. A query that no longer exists is removed.
	pub async fn on_stored_query_committed(
		&self,
		query_id: Uuid,
		compiled: Option<&Value>,
	) -> Result<()> {
		let stored = match compiled {
			None => None,
			Some(_) => self.backends.queries.get(query_id).await?,
		};
		let Some(stored) = stored else {
			let removed = self.backends.percolator.remove(query_id).await?;
			let cleared = self.clear_pending(query_id).await?;

			tracing::info!(%query_id, removed, cleared, "Stored query removed from percolator.");

			return Ok(());
		};
		let compiled = CompiledQuery::from_canonical(&stored.query_string)?;
		let changed = self.backends.percolator.upsert(query_id, &compiled).await?;

		tracing::info!(%query_id, changed, "Stored query indexed for percolation.");

		Ok(())
	}

	/// Indexes a committed leaf document and percolates it.
	///
	/// Safe to repeat: the last write for a document id wins and novelty tracking keeps repeats
	/// from notifying twice.
	pub async fn on_document_committed(&self, document: CandidateDocument) -> Result<PercolationReport> {
		if !document.document_type.is_leaf() {
			return Err(Error::NotImplemented {
				message: format!(
					"'{}' is a container type; commit it as a parent instead.",
					document.document_type
				),
			});
		}

		self.backends.documents.put(&document).await?;

		let indexed = self.index_view(&document).await?;

		self.percolate_and_dispatch(&indexed).await
	}

	/// Stores a container's fields and re-percolates every child with the merged view.
	///
	/// A failing child does not stop its siblings. Non-retryable failures are logged and counted;
	/// the first retryable one is returned after all children ran so the event is retried.
	pub async fn on_parent_committed(&self, parent: ParentDocument) -> Result<ParentReindexReport> {
		if parent.document_type.is_leaf() {
			return Err(Error::InvalidRequest {
				message: format!("'{}' is a leaf type and cannot be a parent.", parent.document_type),
			});
		}

		self.backends.documents.put_parent(&parent).await?;

		let children = self.backends.documents.children_of(parent.id).await?;
		let mut report =
			ParentReindexReport { parent_id: parent.id, children: children.len(), ..Default::default() };
		let mut retry = None;

		for child in children {
			let indexed = IndexedDocument::build(&child, Some(&parent));

			match self.percolate_and_dispatch(&indexed).await {
				Ok(child_report) => {
					report.reindexed += 1;
					report.matched += child_report.matched;
				},
				Err(err) => {
					tracing::warn!(
						parent_id = parent.id,
						document_id = child.id,
						error = %err,
						"Failed to re-percolate child document."
					);

					report.failed += 1;

					if err.is_retryable() {
						retry.get_or_insert(err);
					}
				},
			}
		}

		match retry {
			Some(err) => Err(err),
			None => Ok(report),
		}
	}

	/// Applies a late "cited by" computation and re-percolates the document.
	pub async fn on_back_references_updated(
		&self,
		document_id: i64,
		cited_by: &[i64],
	) -> Result<PercolationReport> {
		let mut document = self.backends.documents.get(document_id).await?.ok_or_else(|| {
			Error::NotFound { message: format!("document {document_id} has not been indexed.") }
		})?;
		let mut cited_by = cited_by.to_vec();

		cited_by.sort_unstable();
		cited_by.dedup();

		document.fields.cited_by = cited_by;

		self.backends.documents.put(&document).await?;

		let indexed = self.index_view(&document).await?;

		self.percolate_and_dispatch(&indexed).await
	}

	async fn index_view(&self, document: &CandidateDocument) -> Result<IndexedDocument> {
		let parent = match document.parent_id {
			Some(parent_id) => self.backends.documents.get_parent(parent_id).await?,
			None => None,
		};

		Ok(IndexedDocument::build(document, parent.as_ref()))
	}

	/// Percolates one merged document and routes every match by rate.
	///
	/// Each match re-reads its alert first; one deleted mid-walk is skipped, never notified. A
	/// failing match does not stop the others. The first retryable failure is returned once every
	/// match ran, and the retry finds the handled matches already pending or guarded.
	pub async fn percolate_and_dispatch(&self, document: &IndexedDocument) -> Result<PercolationReport> {
		let matches = self.percolate(document).await?;
		let mut report =
			PercolationReport { document_id: document.id, matched: matches.len(), ..Default::default() };
		let mut retry = None;

		for found in matches {
			let query_id = found.query_id;

			if let Err(err) = self.route_match(document, found, &mut report).await {
				tracing::warn!(
					%query_id,
					document_id = document.id,
					error = %err,
					"Failed to act on a percolator match."
				);

				report.failed += 1;

				if err.is_retryable() {
					retry.get_or_insert(err);
				}
			}
		}

		tracing::info!(
			document_id = document.id,
			matched = report.matched,
			realtime_sent = report.realtime_sent,
			accumulated = report.accumulated,
			failed = report.failed,
			"Document percolated."
		);

		match retry {
			Some(err) => Err(err),
			None => Ok(report),
		}
	}

	async fn route_match(
		&self,
		document: &IndexedDocument,
		found: PercolatorMatch,
		report: &mut PercolationReport,
	) -> Result<()> {
		let hit = document.hit_ref();
		let Some(query) = self.backends.queries.get(found.query_id).await? else {
			tracing::debug!(
				query_id = %found.query_id,
				document_id = document.id,
				"Dropping match for a deleted alert."
			);

			report.skipped_missing += 1;

			return Ok(());
		};

		if query.rate.is_scheduled() {
			match self.accumulate(query.rate, query.query_id, hit).await? {
				Accumulation::Added => report.accumulated += 1,
				Accumulation::AlreadyPending => report.already_pending += 1,
				Accumulation::AlreadyDelivered => report.already_delivered += 1,
			}

			return Ok(());
		}
		if !self.claim_realtime(query.query_id, hit).await? {
			tracing::debug!(
				query_id = %query.query_id,
				document_id = document.id,
				"Real-time send suppressed inside the minimum interval."
			);

			report.realtime_suppressed += 1;

			return Ok(());
		}

		if self.dispatch_realtime(&query, document, found.snippet).await {
			report.realtime_sent += 1;
		} else {
			report.delivery_failures += 1;
		}

		Ok(())
	}
}
