pub mod alert;
pub mod cursor;
pub mod document;
pub mod error;
pub mod filter;
pub mod query;
pub mod rate;
pub mod text;

pub use alert::StoredQuery;
pub use cursor::{Cursor, SortKind, SortSpec, SortValue};
pub use document::{
	CandidateDocument, DocumentType, HitRef, IndexedDocument, MatchTarget, ParentDocument,
	StructuredFields,
};
pub use error::{InvalidCursorError, InvalidQueryError};
pub use filter::AlertFilter;
pub use query::{CompiledQuery, QuerySpec};
pub use rate::Rate;
pub use text::TextQuery;
