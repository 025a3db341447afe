use tracksync_store::RunHash;

use serde::Serialize;
use tracing::{info, warn};

use super::batch::SyncStats;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunOutcome {
	Skipped { diff: f64 },
	Synced(SyncStats),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunFailure {
	pub run: RunHash,
	pub error: String,
}

/// What happened to every run of a single pass.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
	pub successes: Vec<RunHash>,
	pub skips: Vec<RunHash>,
	pub failures: Vec<RunFailure>,
	pub totals: SyncStats,
	/// The pass stopped early because cancellation was requested.
	pub cancelled: bool,
}

impl PassReport {
	#[must_use]
	pub fn processed(&self) -> usize {
		self.successes.len() + self.skips.len() + self.failures.len()
	}

	pub fn log_summary(&self) {
		if !self.skips.is_empty() {
			info!(count = self.skips.len(), runs = ?self.skips, "Skipped runs already in sync");
		}

		if !self.successes.is_empty() {
			info!(
				count = self.successes.len(),
				runs = ?self.successes,
				chunks = self.totals.chunks,
				items = self.totals.items,
				"Successfully synchronized runs"
			);
		}

		if !self.failures.is_empty() {
			warn!(
				count = self.failures.len(),
				failures = ?self.failures,
				"Failed to synchronize runs"
			);
		}
	}
}

/// Outcome of a whole orchestrator run, which may span many passes.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
	pub passes: u64,
	/// Passes that couldn't run at all, e.g. because a store failed to open.
	pub failed_passes: u64,
	/// Report of the last pass that ran, failed passes leave it untouched.
	pub last: Option<PassReport>,
}
