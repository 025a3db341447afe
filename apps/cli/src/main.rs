use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod context;
mod domains;

use context::{Context, OutputFormat};
use domains::{init::InitArgs, sync::SyncArgs};

/// Crates whose logs follow `--verbosity` when `RUST_LOG` isn't set.
const LOGGED_CRATES: [&str; 3] = ["tracksync", "tracksync_store", "tracksync_cli"];

#[derive(Parser, Debug)]
#[command(name = "tracksync", about = "Incremental replication of experiment tracking runs")]
struct Cli {
	/// 0 errors only, 1 warnings, 2 progress, 3 details, 4 debug
	#[arg(long, short, global = true, default_value_t = 2, value_parser = clap::value_parser!(u8).range(0..=4))]
	verbosity: u8,

	/// Output format of the final report
	#[arg(long, global = true, value_enum, default_value = "human")]
	format: OutputFormat,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Synchronize runs from a source store to a destination store
	Sync(SyncArgs),
	/// Create an empty store directory
	Init(InitArgs),
}

fn init_tracing(verbosity: u8) {
	let level = match verbosity {
		0 => "error",
		1 => "warn",
		2 => "info",
		3 => "debug",
		_ => "trace",
	};

	let directives = LOGGED_CRATES
		.iter()
		.map(|krate| format!("{krate}={level}"))
		.collect::<Vec<_>>()
		.join(",");

	if let Err(e) = tracing_subscriber::registry()
		.with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives)))
		.with(fmt::layer().with_target(true).with_writer(std::io::stderr))
		.try_init()
	{
		eprintln!("Failed to initialize tracing: {e}");
	}
}

/// Cancels `cancel` on the first Ctrl-C, letting the current run finish.
fn cancel_on_interrupt(cancel: CancellationToken) {
	tokio::spawn(async move {
		match tokio::signal::ctrl_c().await {
			Ok(()) => {
				info!("Interrupted, exiting gracefully after the current run");
				cancel.cancel();
			}
			Err(e) => warn!(?e, "Failed to listen for Ctrl-C;"),
		}
	});
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	init_tracing(cli.verbosity);

	let ctx = Context::new(cli.format);

	match cli.command {
		Commands::Sync(args) => {
			let cancel = CancellationToken::new();
			cancel_on_interrupt(cancel.clone());

			domains::sync::run(&ctx, args, cancel).await
		}
		Commands::Init(args) => domains::init::run(&ctx, args).await,
	}
}
