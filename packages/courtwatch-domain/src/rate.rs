use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::{Date, Duration, OffsetDateTime};

/// Delivery cadence of a stored query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rate {
	#[serde(rename = "rt")]
	RealTime,
	#[serde(rename = "dly")]
	Daily,
	#[serde(rename = "wly")]
	Weekly,
	#[serde(rename = "mly")]
	Monthly,
}
impl Rate {
	pub const SCHEDULED: [Self; 3] = [Self::Daily, Self::Weekly, Self::Monthly];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::RealTime => "rt",
			Self::Daily => "dly",
			Self::Weekly => "wly",
			Self::Monthly => "mly",
		}
	}

	pub fn is_scheduled(self) -> bool {
		!matches!(self, Self::RealTime)
	}

	/// Prefix of every accumulating hit set for this rate.
	pub fn hit_namespace(self) -> String {
		format!("hits:{}", self.as_str())
	}

	pub fn hit_set_key(self, query_id: uuid::Uuid) -> String {
		format!("{}:{query_id}", self.hit_namespace())
	}

	/// Start of the window a flush run at `now` reports on.
	///
	/// Daily runs happen early the next day, weekly runs cover the previous seven days, and
	/// monthly runs cover everything since the first day of the previous month.
	pub fn cut_off(self, now: OffsetDateTime) -> Date {
		let today = now.date();

		match self {
			Self::RealTime | Self::Daily => today - Duration::days(1),
			Self::Weekly => today - Duration::days(7),
			Self::Monthly => {
				let early_last_month = today - Duration::days(28);

				early_last_month.replace_day(1).unwrap_or(early_last_month)
			},
		}
	}

	/// Whether a scheduled flush for this rate may run on `date`.
	///
	/// Monthly runs are pinned to days 1-28 so that every month gets exactly one run.
	pub fn may_flush_on(self, date: Date) -> bool {
		match self {
			Self::Monthly => date.day() <= 28,
			_ => true,
		}
	}
}

impl fmt::Display for Rate {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Rate {
	type Err = String;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"rt" | "real_time" | "realtime" => Ok(Self::RealTime),
			"dly" | "daily" => Ok(Self::Daily),
			"wly" | "weekly" => Ok(Self::Weekly),
			"mly" | "monthly" => Ok(Self::Monthly),
			other => Err(format!("unknown rate '{other}', expected one of rt, dly, wly, mly.")),
		}
	}
}
