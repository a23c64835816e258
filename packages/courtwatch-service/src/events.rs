//! Commit-time events and the in-process bus that fans them out.

use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{AlertService, BoxFuture, Error, Result, memory::MemoryOutbox};
use courtwatch_domain::{CandidateDocument, ParentDocument};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertEvent {
	/// `compiled` is `None` when the stored query was deleted.
	QueryCommitted {
		query_id: Uuid,
		#[serde(default)]
		compiled: Option<Value>,
	},
	DocumentCommitted {
		document: CandidateDocument,
	},
	ParentCommitted {
		parent: ParentDocument,
	},
	BackReferencesUpdated {
		document_id: i64,
		cited_by: Vec<i64>,
	},
}
impl AlertEvent {
	pub fn kind(&self) -> EventKind {
		match self {
			Self::QueryCommitted { .. } => EventKind::QueryCommitted,
			Self::DocumentCommitted { .. } => EventKind::DocumentCommitted,
			Self::ParentCommitted { .. } => EventKind::ParentCommitted,
			Self::BackReferencesUpdated { .. } => EventKind::BackReferencesUpdated,
		}
	}

	pub fn to_payload(&self) -> Result<Value> {
		Ok(serde_json::to_value(self)?)
	}

	/// Reads an outbox payload back, refusing rows whose kind column disagrees with the body.
	pub fn from_payload(kind: &str, payload: &Value) -> Result<Self> {
		let event: Self = serde_json::from_value(payload.clone())?;

		if event.kind().as_str() != kind {
			return Err(Error::InvalidRequest {
				message: format!(
					"outbox row kind '{kind}' does not match payload kind '{}'.",
					event.kind()
				),
			});
		}

		Ok(event)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
	QueryCommitted,
	DocumentCommitted,
	ParentCommitted,
	BackReferencesUpdated,
}
impl EventKind {
	pub const ALL: [Self; 4] =
		[Self::QueryCommitted, Self::DocumentCommitted, Self::ParentCommitted, Self::BackReferencesUpdated];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::QueryCommitted => "query_committed",
			Self::DocumentCommitted => "document_committed",
			Self::ParentCommitted => "parent_committed",
			Self::BackReferencesUpdated => "back_references_updated",
		}
	}
}

impl std::fmt::Display for EventKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

pub trait EventHandler
where
	Self: Send + Sync,
{
	fn handle<'a>(&'a self, event: &'a AlertEvent) -> BoxFuture<'a, Result<()>>;
}

#[derive(Default)]
pub struct EventBus {
	handlers: HashMap<EventKind, Vec<Arc<dyn EventHandler>>>,
}
impl EventBus {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn subscribe(&mut self, kind: EventKind, handler: Arc<dyn EventHandler>) {
		self.handlers.entry(kind).or_default().push(handler);
	}

	pub fn subscribe_all(&mut self, handler: Arc<dyn EventHandler>) {
		for kind in EventKind::ALL {
			self.subscribe(kind, handler.clone());
		}
	}

	/// Runs every handler registered for the event's kind, even after one fails, and returns
	/// the first failure.
	pub async fn publish(&self, event: &AlertEvent) -> Result<()> {
		let mut first_err = None;

		for handler in self.handlers.get(&event.kind()).into_iter().flatten() {
			if let Err(err) = handler.handle(event).await {
				tracing::warn!(kind = %event.kind(), error = %err, "Event handler failed.");

				first_err.get_or_insert(err);
			}
		}

		match first_err {
			Some(err) => Err(err),
			None => Ok(()),
		}
	}

	/// Publishes queued events in order. A failing event does not stop the ones behind it.
	pub async fn drain(&self, outbox: &MemoryOutbox) -> Vec<Error> {
		let mut failures = Vec::new();

		while let Some(event) = outbox.pop() {
			if let Err(err) = self.publish(&event).await {
				failures.push(err);
			}
		}

		failures
	}
}

impl EventHandler for AlertService {
	fn handle<'a>(&'a self, event: &'a AlertEvent) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			match event {
				AlertEvent::QueryCommitted { query_id, compiled } =>
					self.on_stored_query_committed(*query_id, compiled.as_ref()).await,
				AlertEvent::DocumentCommitted { document } =>
					self.on_document_committed(document.clone()).await.map(|_| ()),
				AlertEvent::ParentCommitted { parent } =>
					self.on_parent_committed(parent.clone()).await.map(|_| ()),
				AlertEvent::BackReferencesUpdated { document_id, cited_by } =>
					self.on_back_references_updated(*document_id, cited_by).await.map(|_| ()),
			}
		})
	}
}
