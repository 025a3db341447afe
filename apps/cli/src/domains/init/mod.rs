use tracksync_store::{Capabilities, LocalStore, Store};

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tracing::info;

use crate::context::Context;

#[derive(Args, Debug)]
pub struct InitArgs {
	/// Directory of the new store
	pub path: PathBuf,
}

#[derive(Serialize)]
struct InitOutput {
	path: PathBuf,
}

pub async fn run(ctx: &Context, args: InitArgs) -> Result<()> {
	let store = LocalStore::init(&args.path, Capabilities::default()).await?;
	store.close().await?;

	info!(path = %args.path.display(), "Initialized store");

	ctx.print(&InitOutput { path: args.path }, |out| {
		println!("Initialized empty store at {}", out.path.display());
	})
}
