use tracksync::SyncConfig;
use tracksync_store::RunHash;

use std::path::PathBuf;

use clap::Args;

#[derive(Args, Debug)]
pub struct SyncArgs {
	/// Store to copy runs from
	pub src_repo: PathBuf,

	/// Store to copy runs to
	pub dst_repo: PathBuf,

	/// TOML file with a base configuration, flags given here override it
	#[arg(long)]
	pub config: Option<PathBuf>,

	/// Only sync this run, may be repeated
	#[arg(long = "run", value_name = "HASH")]
	pub runs: Vec<String>,

	/// Seconds added to source durations before comparing them
	#[arg(long, allow_negative_numbers = true)]
	pub offset: Option<f64>,

	/// Duration difference under which a run is already in sync
	#[arg(long)]
	pub eps: Option<f64>,

	/// Attempts per store operation
	#[arg(long)]
	pub retries: Option<u32>,

	/// Seconds between attempts
	#[arg(long)]
	pub sleep: Option<f64>,

	/// Seconds between passes, 0 runs a single pass
	#[arg(long)]
	pub repeat: Option<f64>,

	/// Sync runs even when they look up to date
	#[arg(long)]
	pub force: bool,

	/// First run index, negative counts from the end
	#[arg(long, allow_negative_numbers = true)]
	pub first: Option<i64>,

	/// Last run index (inclusive), negative counts from the end
	#[arg(long, allow_negative_numbers = true)]
	pub last: Option<i64>,

	/// Mass update chunk size, negative auto-detects support and 0 disables
	#[arg(long, allow_negative_numbers = true)]
	pub chunk_size: Option<i64>,

	/// Stop at the first failure and exit with an error
	#[arg(long)]
	pub raise_errors: bool,

	/// Copy every sample again, ignoring what the destination already holds
	#[arg(long)]
	pub full_copy: bool,
}

impl SyncArgs {
	/// Applies the flags given on the command line over `base`.
	pub fn apply(&self, base: SyncConfig) -> SyncConfig {
		let mut config = base;

		if !self.runs.is_empty() {
			config.runs = self.runs.iter().map(|run| RunHash::from(run.as_str())).collect();
		}

		if let Some(offset) = self.offset {
			config.offset = offset;
		}
		if let Some(eps) = self.eps {
			config.eps = eps;
		}
		if let Some(retries) = self.retries {
			config.retries = retries;
		}
		if let Some(sleep) = self.sleep {
			config.sleep = sleep;
		}
		if let Some(repeat) = self.repeat {
			config.repeat = repeat;
		}
		if let Some(first) = self.first {
			config.first = first;
		}
		if let Some(last) = self.last {
			config.last = last;
		}
		if let Some(chunk_size) = self.chunk_size {
			config.chunk_size = chunk_size;
		}

		config.force |= self.force;
		config.raise_errors |= self.raise_errors;
		config.full_copy |= self.full_copy;

		config
	}
}
