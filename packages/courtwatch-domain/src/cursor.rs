//! Opaque pagination cursors.
//!
//! A token is URL-safe base64 over `key=value` pairs joined by `&`: `s` holds the sort
//! position, `r` the direction, `t` the shape tag of the listing that issued it and `d` an
//! optional anchor instant. Key order is not significant.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::InvalidCursorError;

const MAX_TOKEN_BYTES: usize = 2_048;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortKind {
	Number,
	Date,
	Id,
}
impl SortKind {
	fn prefix(self) -> &'static str {
		match self {
			Self::Number => "n",
			Self::Date => "d",
			Self::Id => "u",
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SortValue {
	Number(i64),
	Date(OffsetDateTime),
	Id(Uuid),
}
impl SortValue {
	pub fn kind(&self) -> SortKind {
		match self {
			Self::Number(_) => SortKind::Number,
			Self::Date(_) => SortKind::Date,
			Self::Id(_) => SortKind::Id,
		}
	}

	fn encode(&self) -> String {
		match self {
			Self::Number(value) => format!("n:{value}"),
			Self::Date(value) => format!("d:{}", value.unix_timestamp_nanos()),
			Self::Id(value) => format!("u:{}", value.simple()),
		}
	}

	fn decode(raw: &str) -> Result<Self, InvalidCursorError> {
		let (prefix, value) = raw
			.split_once(':')
			.ok_or_else(|| InvalidCursorError::new("sort value is missing its type prefix."))?;

		match prefix {
			"n" => value
				.parse()
				.map(Self::Number)
				.map_err(|_| InvalidCursorError::new("numeric sort value is malformed.")),
			"d" => value
				.parse::<i128>()
				.ok()
				.and_then(|nanos| OffsetDateTime::from_unix_timestamp_nanos(nanos).ok())
				.map(Self::Date)
				.ok_or_else(|| InvalidCursorError::new("date sort value is malformed.")),
			"u" => Uuid::parse_str(value)
				.map(Self::Id)
				.map_err(|_| InvalidCursorError::new("id sort value is malformed.")),
			other => Err(InvalidCursorError::new(format!("unknown sort value type '{other}'."))),
		}
	}
}

/// The sort a listing walks in, one kind per component of the sort key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortSpec {
	pub field: String,
	pub kinds: Vec<SortKind>,
}
impl SortSpec {
	pub fn new(field: impl Into<String>, kinds: impl Into<Vec<SortKind>>) -> Self {
		Self { field: field.into(), kinds: kinds.into() }
	}

	/// Ascending by a single UUID key.
	pub fn by_id() -> Self {
		Self::new("id", [SortKind::Id])
	}

	pub fn accepts(&self, key: &[SortValue]) -> bool {
		key.len() == self.kinds.len()
			&& key.iter().zip(&self.kinds).all(|(value, kind)| value.kind() == *kind)
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cursor {
	pub shape: String,
	pub sort_key: Vec<SortValue>,
	pub reverse: bool,
	pub anchor: Option<OffsetDateTime>,
}
impl Cursor {
	pub fn new(shape: impl Into<String>, sort_key: Vec<SortValue>, reverse: bool) -> Self {
		Self { shape: shape.into(), sort_key, reverse, anchor: None }
	}

	pub fn with_anchor(mut self, anchor: OffsetDateTime) -> Self {
		self.anchor = Some(anchor);

		self
	}

	pub fn encode(&self) -> String {
		let sort_key = self.sort_key.iter().map(SortValue::encode).collect::<Vec<_>>().join(",");
		let mut raw = format!("s={sort_key}&r={}&t={}", u8::from(self.reverse), self.shape);

		if let Some(anchor) = self.anchor {
			raw.push_str(&format!("&d={}", anchor.unix_timestamp_nanos()));
		}

		URL_SAFE_NO_PAD.encode(raw)
	}

	/// Decodes a token and checks it against the listing it is presented to.
	pub fn decode(token: &str, shape: &str, sort: &SortSpec) -> Result<Self, InvalidCursorError> {
		let cursor = Self::parse(token)?;

		if cursor.shape != shape {
			return Err(InvalidCursorError::new(format!(
				"cursor was issued for '{}' and cannot be used for '{shape}'.",
				cursor.shape
			)));
		}
		if !sort.accepts(&cursor.sort_key) {
			return Err(InvalidCursorError::new(format!(
				"cursor sort position does not fit sort field '{}'.",
				sort.field
			)));
		}

		Ok(cursor)
	}

	/// Decodes a token without checking it against a listing.
	pub fn parse(token: &str) -> Result<Self, InvalidCursorError> {
		if token.is_empty() || token.len() > MAX_TOKEN_BYTES {
			return Err(InvalidCursorError::new("cursor token is empty or too long."));
		}

		let bytes = URL_SAFE_NO_PAD
			.decode(token.trim_end_matches('='))
			.map_err(|_| InvalidCursorError::new("cursor token is not valid base64."))?;
		let raw = String::from_utf8(bytes)
			.map_err(|_| InvalidCursorError::new("cursor token is not valid UTF-8."))?;
		let mut sort_key = None;
		let mut reverse = None;
		let mut shape = None;
		let mut anchor = None;

		for pair in raw.split('&') {
			let (key, value) = pair
				.split_once('=')
				.ok_or_else(|| InvalidCursorError::new(format!("malformed cursor pair '{pair}'.")))?;
			let duplicate = match key {
				"s" => sort_key.replace(decode_sort_key(value)?).is_some(),
				"r" => reverse.replace(decode_flag(value)?).is_some(),
				"t" => shape.replace(value.to_string()).is_some(),
				"d" => anchor.replace(decode_instant(value)?).is_some(),
				other => {
					return Err(InvalidCursorError::new(format!("unknown cursor key '{other}'.")));
				},
			};

			if duplicate {
				return Err(InvalidCursorError::new(format!("duplicate cursor key '{key}'.")));
			}
		}

		let shape = shape
			.filter(|shape| !shape.is_empty())
			.ok_or_else(|| InvalidCursorError::new("cursor has no shape tag."))?;

		Ok(Self {
			shape,
			sort_key: sort_key.ok_or_else(|| InvalidCursorError::new("cursor has no sort position."))?,
			reverse: reverse.unwrap_or(false),
			anchor,
		})
	}
}

fn decode_sort_key(raw: &str) -> Result<Vec<SortValue>, InvalidCursorError> {
	if raw.is_empty() {
		return Ok(Vec::new());
	}

	raw.split(',').map(SortValue::decode).collect()
}

fn decode_flag(raw: &str) -> Result<bool, InvalidCursorError> {
	match raw {
		"0" | "false" => Ok(false),
		"1" | "true" => Ok(true),
		_ => Err(InvalidCursorError::new("reverse flag must be 0 or 1.")),
	}
}

fn decode_instant(raw: &str) -> Result<OffsetDateTime, InvalidCursorError> {
	raw.parse::<i128>()
		.ok()
		.and_then(|nanos| OffsetDateTime::from_unix_timestamp_nanos(nanos).ok())
		.ok_or_else(|| InvalidCursorError::new("anchor is malformed."))
}
