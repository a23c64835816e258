use std::fmt::{Display, Formatter};

/// A stored query that cannot be compiled for percolation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidQueryError {
	pub path: String,
	pub message: String,
}
impl InvalidQueryError {
	pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
		Self { path: path.into(), message: message.into() }
	}
}

impl Display for InvalidQueryError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}: {}", self.path, self.message)
	}
}

impl std::error::Error for InvalidQueryError {}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid cursor: {message}")]
pub struct InvalidCursorError {
	pub message: String,
}
impl InvalidCursorError {
	pub(crate) fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}
}
