pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Storage(#[from] courtwatch_storage::Error),
	#[error(transparent)]
	Service(#[from] courtwatch_service::Error),
}
