use tracksync_store::{layout, RunHash, Store, Tree, TreeKind};

use tracing::{info, instrument, warn};

use super::{
	batch::SyncStats, metadata, sequences::SequenceReplicator, BatchWriter, Error, Fetcher,
	SyncConfig,
};

/// Copies one run: its sequences, its meta tree (then published to the destination index) and
/// finally its structured properties.
#[instrument(skip(source, dest, config, fetcher), fields(%run), err)]
pub async fn sync_run(
	source: &dyn Store,
	dest: &dyn Store,
	run: &RunHash,
	config: &SyncConfig,
	fetcher: &Fetcher,
) -> Result<SyncStats, Error> {
	let mut writer = BatchWriter::new(config.chunk_size, *fetcher);

	let stats = copy_trees(source, dest, run, fetcher, &mut writer, config.full_copy).await?;

	metadata::replicate(source, dest, run, fetcher).await?;

	info!(
		chunks = stats.chunks,
		items = stats.items,
		chunk_size = ?writer.chunk_size(),
		"Synchronized run;"
	);

	Ok(stats)
}

async fn open_tree(
	store: &dyn Store,
	kind: TreeKind,
	run: &RunHash,
	read_only: bool,
	fetcher: &Fetcher,
) -> Result<Box<dyn Tree>, Error> {
	let operation = format!(
		"open {} {kind} tree",
		if read_only { "source" } else { "destination" }
	);

	fetcher
		.fetch(&operation, move || store.open_tree(kind, run, read_only, true))
		.await
}

async fn copy_trees(
	source: &dyn Store,
	dest: &dyn Store,
	run: &RunHash,
	fetcher: &Fetcher,
	writer: &mut BatchWriter,
	full_copy: bool,
) -> Result<SyncStats, Error> {
	let source_meta = open_tree(source, TreeKind::Meta, run, true, fetcher).await?;
	let dest_meta = open_tree(dest, TreeKind::Meta, run, false, fetcher).await?;
	let source_seqs = open_tree(source, TreeKind::Seqs, run, true, fetcher).await?;
	let dest_seqs = open_tree(dest, TreeKind::Seqs, run, false, fetcher).await?;

	// Taken before copying samples, so the `last_step`s it carries never run ahead of them.
	let source_meta_tree = source_meta.as_ref();
	let meta_snapshot = fetcher
		.fetch("read source meta tree", move || source_meta_tree.get(&[]))
		.await?;

	let dest_meta_run = dest_meta.subtree(&layout::meta_run_root(run));

	let stats = SequenceReplicator {
		source: source_seqs.as_ref(),
		dest: dest_seqs.as_ref(),
		dest_meta_run: dest_meta_run.as_ref(),
		fetcher,
		full_copy,
	}
	.replicate(run, writer)
	.await?;

	let Some(snapshot) = meta_snapshot else {
		warn!(%run, "Source run has no meta tree, nothing to publish");
		return Ok(stats);
	};

	let dest_meta_tree = dest_meta.as_ref();
	fetcher
		.fetch("write destination meta tree", move || {
			dest_meta_tree.set(&[], snapshot.clone())
		})
		.await?;

	let index = fetcher
		.fetch("build destination meta index", move || {
			dest.build_index(TreeKind::Meta)
		})
		.await?;

	let (index, dest_meta_run) = (index.as_ref(), dest_meta_run.as_ref());
	fetcher
		.fetch("finalize destination meta index", move || {
			index.finalize(run, dest_meta_run)
		})
		.await?;

	Ok(stats)
}
