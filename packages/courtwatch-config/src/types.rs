use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub percolator: Percolator,
	pub novelty: Novelty,
	pub dispatch: Dispatch,
	#[serde(default)]
	pub pagination: Pagination,
	pub worker: Worker,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

/// Reverse-search settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Percolator {
	/// Stored queries returned per percolate page.
	pub batch_size: u32,
	/// Upper bound on one full walk over every page for a single document.
	pub walk_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Novelty {
	/// Minimum gap between two real-time sends of the same (alert, document) pair.
	pub realtime_min_interval_seconds: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Dispatch {
	/// Alerts rendered per digest message. The subject still reports the true total.
	pub digest_max_alerts_per_recipient: u32,
	/// Document ids listed per parent group. The hit count is never truncated.
	#[serde(default = "default_digest_max_hits_per_group")]
	pub digest_max_hits_per_group: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Pagination {
	pub default_page_size: u32,
	pub max_page_size: u32,
}
impl Default for Pagination {
	fn default() -> Self {
		Self { default_page_size: 20, max_page_size: 100 }
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Worker {
	pub poll_interval_ms: u64,
	pub claim_lease_seconds: i64,
	pub base_backoff_ms: i64,
	pub max_backoff_ms: i64,
	pub max_attempts: i32,
	#[serde(default = "default_guard_cleanup_interval_seconds")]
	pub guard_cleanup_interval_seconds: i64,
	/// Delivered outbox rows older than this are purged during cleanup.
	#[serde(default = "default_done_retention_hours")]
	pub done_retention_hours: i64,
}

fn default_digest_max_hits_per_group() -> u32 {
	5
}

fn default_guard_cleanup_interval_seconds() -> i64 {
	900
}

fn default_done_retention_hours() -> i64 {
	168
}
