use tracksync_store::RunHash;

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Everything a sync pass needs to know, handed to the [`Orchestrator`](crate::Orchestrator)
/// once at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
	/// Only sync these runs instead of every run of the source store.
	pub runs: Vec<RunHash>,
	/// Seconds added to the source duration before comparing it with the destination's.
	pub offset: f64,
	/// Duration difference, in seconds, under which a run counts as already synced.
	pub eps: f64,
	/// Attempts per store operation before giving up.
	pub retries: u32,
	/// Seconds to wait between attempts.
	pub sleep: f64,
	/// Seconds between passes, anything not positive runs a single pass.
	pub repeat: f64,
	pub force: bool,
	/// First run index, negative counts from the end.
	pub first: i64,
	/// Last run index (inclusive), negative counts from the end.
	pub last: i64,
	/// Mass update chunk size. Negative probes the destination and uses the absolute value
	/// if supported, zero disables mass updates.
	pub chunk_size: i64,
	pub raise_errors: bool,
	/// Ignore destination watermarks and copy every sample again.
	pub full_copy: bool,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			runs: Vec::new(),
			offset: 0.0,
			eps: 1.0,
			retries: 3,
			sleep: 1.0,
			repeat: 0.0,
			force: false,
			first: 0,
			last: -1,
			chunk_size: -1024,
			raise_errors: false,
			full_copy: false,
		}
	}
}

impl SyncConfig {
	#[must_use]
	pub fn sleep_duration(&self) -> Duration {
		seconds(self.sleep)
	}

	/// `None` when passes shouldn't repeat.
	#[must_use]
	pub fn repeat_interval(&self) -> Option<Duration> {
		(self.repeat > 0.0).then(|| seconds(self.repeat))
	}
}

fn seconds(secs: f64) -> Duration {
	Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}
