mod args;

use tracksync::{Orchestrator, PassReport, Summary, SyncConfig};
use tracksync_store::LocalOpener;

use std::path::Path;

use anyhow::{Context as _, Result};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::context::Context;

pub use self::args::SyncArgs;

async fn load_config(path: Option<&Path>) -> Result<SyncConfig> {
	let Some(path) = path else {
		return Ok(SyncConfig::default());
	};

	let text = fs::read_to_string(path)
		.await
		.with_context(|| format!("reading sync config at {}", path.display()))?;

	toml::from_str(&text).with_context(|| format!("parsing sync config at {}", path.display()))
}

pub async fn run(ctx: &Context, args: SyncArgs, cancel: CancellationToken) -> Result<()> {
	let config = args.apply(load_config(args.config.as_deref()).await?);
	debug!(?config, "Resolved sync configuration");

	let (source, dest) = (
		LocalOpener::new(&args.src_repo),
		LocalOpener::new(&args.dst_repo),
	);

	let summary = match Orchestrator::new(config, cancel)
		.run(&source, &dest)
		.await
	{
		Ok(summary) => summary,
		Err(e) => {
			error!(?e, "Synchronization aborted;");
			return Err(e).context("synchronization aborted");
		}
	};

	ctx.print(&summary, print_human)
}

fn print_human(summary: &Summary) {
	println!(
		"passes: {} ({} failed to run)",
		summary.passes, summary.failed_passes
	);

	let Some(PassReport {
		successes,
		skips,
		failures,
		totals,
		cancelled,
	}) = &summary.last
	else {
		return;
	};

	println!("summary of the last pass:");
	println!(
		"  synced:  {} ({} items in {} chunks)",
		successes.len(),
		totals.items,
		totals.chunks
	);
	println!("  skipped: {}", skips.len());
	println!("  failed:  {}", failures.len());

	for failure in failures {
		println!("    {}: {}", failure.run, failure.error);
	}

	if *cancelled {
		println!("  cancelled before every run was processed");
	}
}
