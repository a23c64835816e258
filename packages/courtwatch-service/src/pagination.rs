//! Keyset pagination over any sorted listing, driven by opaque cursors.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{AlertService, BoxFuture, Error, Result};
use courtwatch_domain::{Cursor, SortSpec, SortValue};

/// One fetch against a listing: rows strictly past `after` in the walk direction.
///
/// With `reverse` set, rows come back in descending sort order.
#[derive(Clone, Debug, PartialEq)]
pub struct PageQuery {
	pub after: Option<Vec<SortValue>>,
	pub reverse: bool,
	pub limit: u32,
	pub anchor: Option<OffsetDateTime>,
}

pub trait PageSource
where
	Self: Send + Sync,
{
	type Item: Send;

	/// Tag that cursors issued for this listing carry.
	fn shape(&self) -> &str;

	fn sort(&self) -> &SortSpec;

	fn sort_key(&self, item: &Self::Item) -> Vec<SortValue>;

	fn fetch<'a>(&'a self, query: PageQuery) -> BoxFuture<'a, Result<Vec<Self::Item>>>;
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PageRequest {
	pub page_size: Option<u32>,
	pub cursor: Option<String>,
	/// Start from the end of the listing. Ignored when a cursor is given.
	#[serde(default)]
	pub reverse: bool,
	#[serde(default)]
	pub anchor: Option<OffsetDateTime>,
}

/// Items are always in ascending sort order, whichever way the page was walked.
#[derive(Clone, Debug)]
pub struct Page<T> {
	pub items: Vec<T>,
	pub next_cursor: Option<String>,
	pub prev_cursor: Option<String>,
	pub anchor: Option<OffsetDateTime>,
}
impl<T> Page<T> {
	pub fn has_next(&self) -> bool {
		self.next_cursor.is_some()
	}

	pub fn has_prev(&self) -> bool {
		self.prev_cursor.is_some()
	}
}

/// Fetches one page of exactly `page_size` rows or fewer.
///
/// One extra row is requested as a lookahead, so whether another page exists in the walk
/// direction is known without a count.
pub async fn paginate<S>(
	source: &S,
	page_size: u32,
	token: Option<&str>,
	reverse: bool,
	anchor: Option<OffsetDateTime>,
) -> Result<Page<S::Item>>
where
	S: PageSource + ?Sized,
{
	if page_size == 0 {
		return Err(Error::InvalidRequest {
			message: "page_size must be greater than zero.".to_string(),
		});
	}

	let cursor = token.map(|token| Cursor::decode(token, source.shape(), source.sort())).transpose()?;
	let reverse = cursor.as_ref().map_or(reverse, |cursor| cursor.reverse);
	let anchor = cursor.as_ref().and_then(|cursor| cursor.anchor).or(anchor);
	let resumed = cursor.is_some();
	let mut items = source
		.fetch(PageQuery {
			after: cursor.map(|cursor| cursor.sort_key),
			reverse,
			limit: page_size + 1,
			anchor,
		})
		.await?;
	let more = items.len() > page_size as usize;

	items.truncate(page_size as usize);

	if reverse {
		items.reverse();
	}

	let issue = |item: &S::Item, reverse: bool| {
		let cursor = Cursor::new(source.shape(), source.sort_key(item), reverse);

		match anchor {
			Some(anchor) => cursor.with_anchor(anchor).encode(),
			None => cursor.encode(),
		}
	};
	// Walking backward, the rows we came from lie ahead; walking forward from a cursor, the
	// rows we came from lie behind.
	let (has_next, has_prev) = if reverse { (resumed, more) } else { (more, resumed) };
	let next_cursor = items.last().filter(|_| has_next).map(|item| issue(item, false));
	let prev_cursor = items.first().filter(|_| has_prev).map(|item| issue(item, true));

	Ok(Page { items, next_cursor, prev_cursor, anchor })
}

impl AlertService {
	/// General listing entry point. Page size falls back to the configured default and is
	/// clamped to the configured maximum.
	pub async fn paginate<S>(&self, source: &S, request: PageRequest) -> Result<Page<S::Item>>
	where
		S: PageSource + ?Sized,
	{
		let limits = &self.cfg.pagination;
		let page_size =
			request.page_size.unwrap_or(limits.default_page_size).clamp(1, limits.max_page_size);

		paginate(source, page_size, request.cursor.as_deref(), request.reverse, request.anchor).await
	}
}
