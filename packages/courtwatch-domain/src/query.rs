use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
	InvalidQueryError,
	document::{DocumentType, MatchTarget},
	filter::AlertFilter,
	text::TextQuery,
};

/// The stored query string of an alert, as submitted by its owner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuerySpec {
	#[serde(rename = "type")]
	pub document_type: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub q: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub filter: Option<Value>,
}
impl QuerySpec {
	pub fn parse(raw: &str) -> Result<Self, InvalidQueryError> {
		serde_json::from_str(raw)
			.map_err(|err| InvalidQueryError::new("$", format!("query string is not valid: {err}.")))
	}

	pub fn from_value(raw: &Value) -> Result<Self, InvalidQueryError> {
		Self::deserialize(raw)
			.map_err(|err| InvalidQueryError::new("$", format!("query string is not valid: {err}.")))
	}

	pub fn compile(&self) -> Result<CompiledQuery, InvalidQueryError> {
		let document_type = match self.document_type.as_str() {
			"person" => {
				return Err(InvalidQueryError::new(
					"$.type",
					"person searches cannot be percolated; alerts need a document type.",
				));
			},
			raw => raw.parse::<DocumentType>().map_err(|err| InvalidQueryError::new("$.type", err))?,
		};

		if !document_type.is_leaf() {
			return Err(InvalidQueryError::new(
				"$.type",
				format!(
					"'{document_type}' is a container type; alerts target opinion, oral_argument or recap_document."
				),
			));
		}

		let text = self.q.as_deref().map(TextQuery::parse).transpose()?.filter(|text| !text.is_empty());
		let filter = self.filter.as_ref().map(AlertFilter::parse).transpose()?;

		if filter.is_none() && !text.as_ref().is_some_and(TextQuery::has_required) {
			return Err(InvalidQueryError::new(
				"$",
				"query must contain a search term or a filter.",
			));
		}

		let mut canonical = serde_json::Map::new();

		canonical.insert("type".to_string(), Value::String(document_type.as_str().to_string()));

		if let Some(text) = &text {
			canonical.insert("q".to_string(), Value::String(text.to_query_string()));
		}
		if let Some(filter) = &filter {
			canonical.insert("filter".to_string(), filter.as_value().clone());
		}

		Ok(CompiledQuery { document_type, text, filter, canonical: Value::Object(canonical) })
	}
}

/// A query string that passed compilation and can be evaluated against documents.
#[derive(Clone, Debug)]
pub struct CompiledQuery {
	document_type: DocumentType,
	text: Option<TextQuery>,
	filter: Option<AlertFilter>,
	canonical: Value,
}
impl CompiledQuery {
	pub fn compile(raw: &str) -> Result<Self, InvalidQueryError> {
		QuerySpec::parse(raw)?.compile()
	}

	/// Rebuilds a compiled query from its canonical JSON form.
	pub fn from_canonical(raw: &Value) -> Result<Self, InvalidQueryError> {
		QuerySpec::from_value(raw)?.compile()
	}

	pub fn document_type(&self) -> DocumentType {
		self.document_type
	}

	pub fn canonical(&self) -> &Value {
		&self.canonical
	}

	pub fn matches(&self, target: &MatchTarget<'_>) -> bool {
		if target.document.document_type != self.document_type {
			return false;
		}
		if let Some(filter) = &self.filter
			&& !filter.matches(target.document)
		{
			return false;
		}

		self.text.as_ref().is_none_or(|text| text.matches(target.words()))
	}

	/// A few words of context around the first text hit, for notifications.
	pub fn snippet(&self, target: &MatchTarget<'_>) -> Option<String> {
		const CONTEXT_WORDS: usize = 8;

		let words = target.words();
		let (start, end) = self.text.as_ref()?.first_match(words)?;
		let from = start.saturating_sub(CONTEXT_WORDS);
		let to = (end + CONTEXT_WORDS).min(words.len());

		Some(words[from..to].join(" "))
	}
}

impl PartialEq for CompiledQuery {
	fn eq(&self, other: &Self) -> bool {
		self.canonical == other.canonical
	}
}
