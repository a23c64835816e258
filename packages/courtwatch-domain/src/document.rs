use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::Date;
use unicode_segmentation::UnicodeSegmentation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
	Opinion,
	OralArgument,
	RecapDocument,
	OpinionCluster,
	Docket,
}
impl DocumentType {
	pub const LEAVES: [Self; 3] = [Self::Opinion, Self::OralArgument, Self::RecapDocument];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Opinion => "opinion",
			Self::OralArgument => "oral_argument",
			Self::RecapDocument => "recap_document",
			Self::OpinionCluster => "opinion_cluster",
			Self::Docket => "docket",
		}
	}

	/// Leaf documents carry searchable content and can be percolated. Containers only
	/// contribute fields to their children.
	pub fn is_leaf(self) -> bool {
		Self::LEAVES.contains(&self)
	}
}

impl fmt::Display for DocumentType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for DocumentType {
	type Err = String;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		match raw {
			"opinion" => Ok(Self::Opinion),
			"oral_argument" => Ok(Self::OralArgument),
			"recap_document" => Ok(Self::RecapDocument),
			"opinion_cluster" => Ok(Self::OpinionCluster),
			"docket" => Ok(Self::Docket),
			other => Err(format!("unknown document type '{other}'.")),
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuredFields {
	pub case_name: Option<String>,
	pub docket_number: Option<String>,
	pub court_id: Option<String>,
	pub judges: Vec<String>,
	pub date_filed: Option<Date>,
	pub date_argued: Option<Date>,
	pub citations: Vec<String>,
	pub cites: Vec<i64>,
	pub cited_by: Vec<i64>,
}
impl StructuredFields {
	/// Fields set on `self` win; anything left empty falls back to `parent`.
	pub fn merged_over(&self, parent: &Self) -> Self {
		fn pick<T: Clone>(child: &Option<T>, parent: &Option<T>) -> Option<T> {
			child.clone().or_else(|| parent.clone())
		}
		fn pick_list<T: Clone>(child: &[T], parent: &[T]) -> Vec<T> {
			if child.is_empty() { parent.to_vec() } else { child.to_vec() }
		}

		Self {
			case_name: pick(&self.case_name, &parent.case_name),
			docket_number: pick(&self.docket_number, &parent.docket_number),
			court_id: pick(&self.court_id, &parent.court_id),
			judges: pick_list(&self.judges, &parent.judges),
			date_filed: pick(&self.date_filed, &parent.date_filed),
			date_argued: pick(&self.date_argued, &parent.date_argued),
			citations: pick_list(&self.citations, &parent.citations),
			cites: pick_list(&self.cites, &parent.cites),
			cited_by: pick_list(&self.cited_by, &parent.cited_by),
		}
	}
}

/// A leaf document as committed by the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDocument {
	pub id: i64,
	pub document_type: DocumentType,
	pub parent_id: Option<i64>,
	#[serde(default)]
	pub fields: StructuredFields,
	#[serde(default)]
	pub searchable_text: String,
}

/// A container (cluster or docket) whose fields are shared by its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentDocument {
	pub id: i64,
	pub document_type: DocumentType,
	#[serde(default)]
	pub fields: StructuredFields,
}

/// The merged parent and child view that percolation runs against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedDocument {
	pub id: i64,
	pub document_type: DocumentType,
	pub parent_id: Option<i64>,
	pub fields: StructuredFields,
	pub searchable_text: String,
}
impl IndexedDocument {
	pub fn build(document: &CandidateDocument, parent: Option<&ParentDocument>) -> Self {
		let fields = match parent {
			Some(parent) => document.fields.merged_over(&parent.fields),
			None => document.fields.clone(),
		};

		Self {
			id: document.id,
			document_type: document.document_type,
			parent_id: document.parent_id,
			fields,
			searchable_text: document.searchable_text.clone(),
		}
	}

	/// Hits group under the parent container, or under the document itself when it has none.
	pub fn hit_ref(&self) -> HitRef {
		HitRef { parent_id: self.parent_id.unwrap_or(self.id), document_id: self.id }
	}
}

/// A document prepared once for matching against many compiled queries.
#[derive(Debug)]
pub struct MatchTarget<'a> {
	pub document: &'a IndexedDocument,
	words: Vec<String>,
}
impl<'a> MatchTarget<'a> {
	pub fn new(document: &'a IndexedDocument) -> Self {
		let fields = &document.fields;
		let mut words = Vec::new();

		for text in [
			fields.case_name.as_deref(),
			fields.docket_number.as_deref(),
			Some(document.searchable_text.as_str()),
		]
		.into_iter()
		.flatten()
		{
			words.extend(normalize_words(text));
		}

		Self { document, words }
	}

	pub fn words(&self) -> &[String] {
		&self.words
	}
}

/// A matched document as stored in an accumulating hit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HitRef {
	pub parent_id: i64,
	pub document_id: i64,
}
impl HitRef {
	pub fn to_member(self) -> String {
		format!("{}:{}", self.parent_id, self.document_id)
	}

	pub fn from_member(member: &str) -> Option<Self> {
		let (parent, document) = member.split_once(':')?;

		Some(Self { parent_id: parent.parse().ok()?, document_id: document.parse().ok()? })
	}
}

pub(crate) fn normalize_words(text: &str) -> impl Iterator<Item = String> + '_ {
	text.unicode_words().map(str::to_lowercase)
}
