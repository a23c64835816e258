use crate::{InvalidQueryError, document::normalize_words};

const MAX_QUERY_BYTES: usize = 4_096;

/// Free-text part of an alert.
///
/// Bare terms are all required, `"quoted phrases"` must appear as contiguous words and a
/// leading `-` excludes a term or phrase. Matching is case-insensitive over Unicode words.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextQuery {
	required: Vec<Vec<String>>,
	excluded: Vec<Vec<String>>,
}
impl TextQuery {
	pub fn parse(raw: &str) -> Result<Self, InvalidQueryError> {
		let path = "$.q";

		if raw.len() > MAX_QUERY_BYTES {
			return Err(InvalidQueryError::new(
				path,
				format!("query text exceeds maximum bytes ({MAX_QUERY_BYTES})."),
			));
		}

		let mut query = Self::default();
		let mut rest = raw.trim_start();

		while !rest.is_empty() {
			let negated = rest.starts_with('-');

			if negated {
				rest = &rest[1..];
			}

			let (clause, remainder) = if let Some(quoted) = rest.strip_prefix('"') {
				let end = quoted
					.find('"')
					.ok_or_else(|| InvalidQueryError::new(path, "unterminated quoted phrase."))?;

				(&quoted[..end], &quoted[end + 1..])
			} else {
				let end = rest.find(char::is_whitespace).unwrap_or(rest.len());

				(&rest[..end], &rest[end..])
			};
			let words: Vec<String> = normalize_words(clause).collect();

			if !words.is_empty() {
				if negated { query.excluded.push(words) } else { query.required.push(words) }
			}

			rest = remainder.trim_start();
		}

		Ok(query)
	}

	pub fn is_empty(&self) -> bool {
		self.required.is_empty() && self.excluded.is_empty()
	}

	pub fn has_required(&self) -> bool {
		!self.required.is_empty()
	}

	pub fn matches(&self, words: &[String]) -> bool {
		self.required.iter().all(|clause| contains_sequence(words, clause))
			&& !self.excluded.iter().any(|clause| contains_sequence(words, clause))
	}

	/// Word range of the first required clause found in `words`.
	pub fn first_match(&self, words: &[String]) -> Option<(usize, usize)> {
		self.required
			.iter()
			.filter_map(|clause| {
				words
					.windows(clause.len())
					.position(|window| window == clause.as_slice())
					.map(|start| (start, start + clause.len()))
			})
			.min()
	}

	/// Canonical query text: one clause per word sequence, phrases quoted.
	pub fn to_query_string(&self) -> String {
		fn render(clause: &[String]) -> String {
			if clause.len() == 1 { clause[0].clone() } else { format!("\"{}\"", clause.join(" ")) }
		}

		self.required
			.iter()
			.map(|clause| render(clause))
			.chain(self.excluded.iter().map(|clause| format!("-{}", render(clause))))
			.collect::<Vec<_>>()
			.join(" ")
	}
}

fn contains_sequence(words: &[String], clause: &[String]) -> bool {
	!clause.is_empty() && words.windows(clause.len()).any(|window| window == clause)
}
