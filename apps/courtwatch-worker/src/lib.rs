pub mod delivery;
pub mod worker;

mod error;

pub use error::{Error, Result};

use std::{path::PathBuf, sync::Arc};

use clap::{
	Parser, Subcommand,
	builder::{
		Styles,
		styling::{AnsiColor, Effects},
	},
};
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

use courtwatch_domain::Rate;
use courtwatch_service::{AlertService, Backends, EventBus, SystemClock};
use courtwatch_storage::db::Db;

#[derive(Debug, Parser)]
#[command(version, rename_all = "kebab", styles = styles())]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Drain the alert outbox and run scheduled digests until stopped.
	Run,
	/// Flush pending digests for one rate, for use from an external scheduler.
	Flush {
		#[arg(long, value_parser = parse_rate)]
		rate: Rate,
		/// Print what would be sent without consuming or sending anything.
		#[arg(long)]
		simulate: bool,
		/// Only flush digests for this recipient.
		#[arg(long, value_name = "USER_ID")]
		user_id: Option<i64>,
	},
	/// Replay every stored query into the percolator and drop orphaned entries.
	Rebuild,
}

fn parse_rate(raw: &str) -> std::result::Result<Rate, String> {
	let rate = raw.parse::<Rate>()?;

	if !rate.is_scheduled() {
		return Err("real-time alerts are sent as they match and have no flush.".to_string());
	}

	Ok(rate)
}

pub fn styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Red.on_default() | Effects::BOLD)
		.usage(AnsiColor::Red.on_default() | Effects::BOLD)
		.literal(AnsiColor::Blue.on_default() | Effects::BOLD)
		.placeholder(AnsiColor::Green.on_default())
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = courtwatch_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let backends = Backends::postgres(
		db.pool.clone(),
		Arc::new(delivery::LogDelivery),
		Arc::new(SystemClock),
	);
	let worker_cfg = config.worker.clone();
	let service = Arc::new(AlertService::new(config, backends));

	match args.command {
		Command::Run => {
			let mut bus = EventBus::new();

			bus.subscribe_all(service.clone());

			let state = worker::WorkerState { db, bus, service, cfg: worker_cfg };

			worker::run_worker(state).await?;
		},
		Command::Flush { rate, simulate: true, user_id } => {
			let pending = service.pending_digest_for(rate, user_id).await?;

			println!("{}", serde_json::to_string_pretty(&pending)?);
		},
		Command::Flush { rate, simulate: false, user_id } => {
			let report = service.flush_digests_for(rate, user_id).await?;

			// A single-recipient flush leaves everyone else pending for the scheduled run.
			if user_id.is_none() {
				worker::record_digest_run(&db, rate, OffsetDateTime::now_utc().date()).await?;
			}

			println!("{}", serde_json::to_string_pretty(&report)?);
		},
		Command::Rebuild => {
			let report = service.rebuild_percolator().await?;

			println!("{}", serde_json::to_string_pretty(&report)?);
		},
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn flush_takes_a_scheduled_rate() {
		let args = Args::try_parse_from(["courtwatch-worker", "-c", "worker.toml", "flush", "--rate", "wly"])
			.expect("Arguments should parse.");

		assert!(matches!(
			args.command,
			Command::Flush { rate: Rate::Weekly, simulate: false, user_id: None }
		));
		assert!(
			Args::try_parse_from(["courtwatch-worker", "-c", "worker.toml", "flush", "--rate", "rt"])
				.is_err()
		);
	}

	#[test]
	fn flush_can_preview_one_recipient() {
		let args = Args::try_parse_from([
			"courtwatch-worker",
			"-c",
			"worker.toml",
			"flush",
			"--rate",
			"daily",
			"--simulate",
			"--user-id",
			"42",
		])
		.expect("Arguments should parse.");

		assert!(matches!(
			args.command,
			Command::Flush { rate: Rate::Daily, simulate: true, user_id: Some(42) }
		));
	}

	#[test]
	fn config_is_required() {
		assert!(Args::try_parse_from(["courtwatch-worker", "run"]).is_err());
	}
}
