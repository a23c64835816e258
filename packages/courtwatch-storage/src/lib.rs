pub mod db;
pub mod documents;
pub mod models;
pub mod novelty;
pub mod outbox;
pub mod percolator;
pub mod queries;
pub mod schedule;
pub mod schema;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
