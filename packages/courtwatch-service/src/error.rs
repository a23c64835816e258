use courtwatch_domain::{InvalidCursorError, InvalidQueryError};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid query at {path}: {message}")]
	InvalidQuery { path: String, message: String },
	#[error("Invalid cursor: {message}")]
	InvalidCursor { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Percolator unavailable: {message}")]
	PercolationUnavailable { message: String },
	#[error("Percolation walk timed out after {timeout_ms} ms.")]
	PercolationTimeout { timeout_ms: u64 },
	#[error("Not implemented: {message}")]
	NotImplemented { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Delivery error: {message}")]
	Delivery { message: String },
}
impl Error {
	/// Failures worth another attempt from the outbox worker.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			Self::PercolationUnavailable { .. } | Self::PercolationTimeout { .. } | Self::Storage { .. }
		)
	}
}

impl From<InvalidQueryError> for Error {
	fn from(err: InvalidQueryError) -> Self {
		Self::InvalidQuery { path: err.path, message: err.message }
	}
}

impl From<InvalidCursorError> for Error {
	fn from(err: InvalidCursorError) -> Self {
		Self::InvalidCursor { message: err.message }
	}
}

impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}

impl From<courtwatch_storage::Error> for Error {
	fn from(err: courtwatch_storage::Error) -> Self {
		match err {
			courtwatch_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			courtwatch_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			courtwatch_storage::Error::NotFound(message) => Self::NotFound { message },
		}
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Self::InvalidRequest { message: err.to_string() }
	}
}
