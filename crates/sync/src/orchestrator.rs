use tracksync_store::{RunHash, Store, StoreOpener};

use std::{ops::RangeInclusive, time::Duration};

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::{
	replicator,
	report::{PassReport, RunFailure, RunOutcome, Summary},
	skip::{SkipDecision, SkipPolicy, SyncReason},
	Error, Fetcher, SyncConfig,
};

const CANCELLATION_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Resolves `first` and `last` (inclusive, negative counting from the end) against a list of
/// `len` runs. `None` when the range selects nothing.
#[must_use]
pub fn resolve_range(len: usize, first: i64, last: i64) -> Option<RangeInclusive<usize>> {
	let len = i64::try_from(len).ok()?;
	let absolute = |index: i64| if index < 0 { index + len } else { index };

	let first = absolute(first).max(0);
	let last = absolute(last).min(len - 1);

	if first > last {
		return None;
	}

	Some(usize::try_from(first).ok()?..=usize::try_from(last).ok()?)
}

/// Drives sync passes over every selected run, optionally repeating them until cancelled.
#[derive(Debug)]
pub struct Orchestrator {
	config: SyncConfig,
	fetcher: Fetcher,
	policy: SkipPolicy,
	cancel: CancellationToken,
}

impl Orchestrator {
	#[must_use]
	pub fn new(config: SyncConfig, cancel: CancellationToken) -> Self {
		Self {
			fetcher: Fetcher::new(config.retries, config.sleep_duration()),
			policy: SkipPolicy {
				offset: config.offset,
				eps: config.eps,
				force: config.force,
			},
			config,
			cancel,
		}
	}

	#[must_use]
	pub const fn config(&self) -> &SyncConfig {
		&self.config
	}

	/// Runs passes until one completes without a repeat interval configured, or until
	/// cancellation. Errors only escape with `raise_errors` set.
	pub async fn run(
		&self,
		source: &dyn StoreOpener,
		dest: &dyn StoreOpener,
	) -> Result<Summary, Error> {
		let mut summary = Summary::default();

		loop {
			if self.cancel.is_cancelled() {
				info!("Cancellation requested, stopping");
				break;
			}

			summary.passes += 1;

			match self.run_pass(source, dest).await {
				Ok(report) => summary.last = Some(report),
				Err(e) if self.config.raise_errors => return Err(e),
				Err(e) => {
					error!(?e, "Sync pass failed;");
					summary.failed_passes += 1;
				}
			}

			let Some(interval) = self.config.repeat_interval() else {
				break;
			};

			if !self.wait_next_pass(interval).await {
				info!("Cancellation requested while waiting for the next pass");
				break;
			}
		}

		Ok(summary)
	}

	/// Opens both stores, syncs the selected runs and closes the stores again, whatever happened.
	#[instrument(
		skip_all,
		fields(source = %source.describe(), dest = %dest.describe()),
		err
	)]
	pub async fn run_pass(
		&self,
		source: &dyn StoreOpener,
		dest: &dyn StoreOpener,
	) -> Result<PassReport, Error> {
		let source_store = self
			.fetcher
			.fetch("open source store", move || source.open())
			.await?;

		let dest_store = match self
			.fetcher
			.fetch("open destination store", move || dest.open())
			.await
		{
			Ok(store) => store,
			Err(e) => {
				close_store(source_store.as_ref(), "source").await;
				return Err(e);
			}
		};

		let res = self
			.sync_runs(source_store.as_ref(), dest_store.as_ref())
			.await;

		close_store(source_store.as_ref(), "source").await;
		close_store(dest_store.as_ref(), "destination").await;

		if let Ok(report) = &res {
			report.log_summary();
		}

		res
	}

	async fn sync_runs(&self, source: &dyn Store, dest: &dyn Store) -> Result<PassReport, Error> {
		let runs = if self.config.runs.is_empty() {
			self.fetcher
				.fetch("list source runs", move || source.list_runs())
				.await?
		} else {
			self.config.runs.clone()
		};

		let mut report = PassReport::default();

		let Some(range) = resolve_range(runs.len(), self.config.first, self.config.last) else {
			info!(
				runs_count = runs.len(),
				first = self.config.first,
				last = self.config.last,
				"No runs selected"
			);
			return Ok(report);
		};

		let total = range.end() - range.start() + 1;

		for (position, run) in runs[range].iter().enumerate() {
			if self.cancel.is_cancelled() {
				warn!(remaining = total - position, "Cancellation requested, stopping pass");
				report.cancelled = true;
				break;
			}

			debug!(%run, position = position + 1, total, "Processing run");

			match self.process_run(source, dest, run).await {
				Ok(RunOutcome::Skipped { diff }) => {
					info!(%run, diff, "Skipping run, it exists at destination with a close duration");
					report.skips.push(run.clone());
				}

				Ok(RunOutcome::Synced(stats)) => {
					report.totals += stats;
					report.successes.push(run.clone());
				}

				Err(e) if self.config.raise_errors => return Err(e),

				Err(e) => {
					error!(%run, ?e, "Failed to synchronize run;");
					report.failures.push(RunFailure {
						run: run.clone(),
						error: e.to_string(),
					});
				}
			}
		}

		Ok(report)
	}

	async fn process_run(
		&self,
		source: &dyn Store,
		dest: &dyn Store,
		run: &RunHash,
	) -> Result<RunOutcome, Error> {
		let source_info = self
			.fetcher
			.fetch("get source run", move || source.get_run(run))
			.await?
			.ok_or_else(|| Error::RunNotFound(run.clone()))?;

		let dest_info = self
			.fetcher
			.fetch("get destination run", move || dest.get_run(run))
			.await?;

		let decision = match self.policy.precheck(dest_info.as_ref()) {
			Some(reason) => SkipDecision::Sync(reason),
			None => {
				if self.has_properties(dest, run).await? {
					self.policy.decide(&source_info, dest_info.as_ref())
				} else {
					SkipDecision::Sync(SyncReason::MissingProperties)
				}
			}
		};

		match decision {
			SkipDecision::Skip { diff } => Ok(RunOutcome::Skipped { diff }),
			SkipDecision::Sync(reason) => {
				debug!(%run, ?reason, "Syncing run");
				replicator::sync_run(source, dest, run, &self.config, &self.fetcher)
					.await
					.map(RunOutcome::Synced)
			}
		}
	}

	async fn has_properties(&self, dest: &dyn Store, run: &RunHash) -> Result<bool, Error> {
		self.fetcher
			.fetch("find destination run properties", move || {
				dest.find_properties(run)
			})
			.await
			.map(|props| props.is_some())
	}

	/// Sleeps for `interval` in small steps, `false` if cancelled meanwhile.
	async fn wait_next_pass(&self, interval: Duration) -> bool {
		info!(?interval, "Waiting for the next pass");

		let deadline = Instant::now() + interval;

		loop {
			if self.cancel.is_cancelled() {
				return false;
			}

			let now = Instant::now();
			if now >= deadline {
				return true;
			}

			sleep((deadline - now).min(CANCELLATION_POLL_INTERVAL)).await;
		}
	}
}

async fn close_store(store: &dyn Store, role: &'static str) {
	if let Err(e) = store.close().await {
		warn!(role, ?e, "Failed to close store;");
	}
}
