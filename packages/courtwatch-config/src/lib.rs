mod error;
mod types;

pub use error::{Error, Result};
pub use types::{Config, Dispatch, Novelty, Pagination, Percolator, Postgres, Service, Storage, Worker};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.is_empty() {
		return Err(Error::invalid("service.log_level", "must be non-empty."));
	}
	if cfg.storage.postgres.dsn.is_empty() {
		return Err(Error::invalid("storage.postgres.dsn", "must be non-empty."));
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::invalid("storage.postgres.pool_max_conns", "must be greater than zero."));
	}
	if cfg.percolator.batch_size == 0 {
		return Err(Error::invalid("percolator.batch_size", "must be greater than zero."));
	}
	if cfg.percolator.walk_timeout_ms == 0 {
		return Err(Error::invalid("percolator.walk_timeout_ms", "must be greater than zero."));
	}
	if cfg.novelty.realtime_min_interval_seconds <= 0 {
		return Err(Error::invalid(
			"novelty.realtime_min_interval_seconds",
			"must be greater than zero.",
		));
	}
	if cfg.dispatch.digest_max_alerts_per_recipient == 0 {
		return Err(Error::invalid(
			"dispatch.digest_max_alerts_per_recipient",
			"must be greater than zero.",
		));
	}
	if cfg.dispatch.digest_max_hits_per_group == 0 {
		return Err(Error::invalid(
			"dispatch.digest_max_hits_per_group",
			"must be greater than zero.",
		));
	}
	if cfg.pagination.default_page_size == 0 {
		return Err(Error::invalid("pagination.default_page_size", "must be greater than zero."));
	}
	if cfg.pagination.max_page_size < cfg.pagination.default_page_size {
		return Err(Error::invalid(
			"pagination.max_page_size",
			"must be greater than or equal to pagination.default_page_size.",
		));
	}

	validate_worker(&cfg.worker)
}

fn validate_worker(worker: &Worker) -> Result<()> {
	if worker.poll_interval_ms == 0 {
		return Err(Error::invalid("worker.poll_interval_ms", "must be greater than zero."));
	}
	if worker.claim_lease_seconds <= 0 {
		return Err(Error::invalid("worker.claim_lease_seconds", "must be greater than zero."));
	}
	if worker.base_backoff_ms <= 0 {
		return Err(Error::invalid("worker.base_backoff_ms", "must be greater than zero."));
	}
	if worker.max_backoff_ms < worker.base_backoff_ms {
		return Err(Error::invalid(
			"worker.max_backoff_ms",
			"must be greater than or equal to worker.base_backoff_ms.",
		));
	}
	if worker.max_attempts <= 0 {
		return Err(Error::invalid("worker.max_attempts", "must be greater than zero."));
	}
	if worker.guard_cleanup_interval_seconds <= 0 {
		return Err(Error::invalid(
			"worker.guard_cleanup_interval_seconds",
			"must be greater than zero.",
		));
	}
	if worker.done_retention_hours <= 0 {
		return Err(Error::invalid("worker.done_retention_hours", "must be greater than zero."));
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.service.log_level = cfg.service.log_level.trim().to_string();
	cfg.storage.postgres.dsn = cfg.storage.postgres.dsn.trim().to_string();
}
