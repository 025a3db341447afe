use tracksync_store::{layout, Dtype, Key, RunHash, Tree, Value};

use std::collections::BTreeSet;

use tracing::{debug, instrument, trace};

use super::{batch::SyncStats, watermark, BatchWriter, Error, Fetcher};

/// On-disk schema of metric samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
	/// `val`, `epoch` and `time` arrays; the key is the watermark.
	V1,
	/// Adds a `step` array which is the watermark instead of the key.
	V2,
}

impl Generation {
	#[must_use]
	pub fn root(self, run: &RunHash) -> Vec<Key> {
		match self {
			Self::V1 => layout::v1_sequences_root(run),
			Self::V2 => layout::v2_sequences_root(run),
		}
	}

	#[must_use]
	pub const fn arrays(self) -> &'static [(&'static str, Dtype)] {
		match self {
			Self::V1 => &[
				(layout::VAL, Dtype::Any),
				(layout::EPOCH, Dtype::Int64),
				(layout::TIME, Dtype::Int64),
			],
			Self::V2 => &[
				(layout::VAL, Dtype::Any),
				(layout::STEP, Dtype::Int64),
				(layout::EPOCH, Dtype::Int64),
				(layout::TIME, Dtype::Int64),
			],
		}
	}

	/// Keys of samples past `last_step`, given every array of the sequence.
	fn new_keys(self, columns: &[Column], last_step: i64) -> BTreeSet<i64> {
		let (watermark_array, by_key) = match self {
			Self::V1 => (layout::VAL, true),
			Self::V2 => (layout::STEP, false),
		};

		columns
			.iter()
			.find(|column| column.name == watermark_array)
			.map(|column| {
				column
					.items
					.iter()
					.filter(|(key, value)| {
						let position = if by_key { Some(*key) } else { value.as_i64() };
						position.is_some_and(|position| position > last_step)
					})
					.map(|(key, _)| *key)
					.collect()
			})
			.unwrap_or_default()
	}
}

struct Column {
	name: &'static str,
	dtype: Dtype,
	items: Vec<(i64, Value)>,
}

/// Copies the samples a destination run is missing, for every sequence of the source run.
pub struct SequenceReplicator<'a> {
	pub source: &'a dyn Tree,
	pub dest: &'a dyn Tree,
	/// Destination meta tree rooted at the run, where watermarks are read from.
	pub dest_meta_run: &'a dyn Tree,
	pub fetcher: &'a Fetcher,
	pub full_copy: bool,
}

impl SequenceReplicator<'_> {
	pub async fn replicate(
		&self,
		run: &RunHash,
		writer: &mut BatchWriter,
	) -> Result<SyncStats, Error> {
		let mut stats = SyncStats::default();

		for generation in [Generation::V2, Generation::V1] {
			stats += self.replicate_generation(generation, run, writer).await?;
		}

		Ok(stats)
	}

	async fn replicate_generation(
		&self,
		generation: Generation,
		run: &RunHash,
		writer: &mut BatchWriter,
	) -> Result<SyncStats, Error> {
		let root = generation.root(run);
		let source_root = self.source.subtree(&root);
		let dest_root = self.dest.subtree(&root);

		let source_tree = source_root.as_ref();
		let contexts = self
			.fetcher
			.fetch("list sequence contexts", move || source_tree.keys())
			.await?;

		let mut stats = SyncStats::default();

		for context in contexts {
			let context_tree = source_root.subtree(&[context.clone()]);
			let context_tree = context_tree.as_ref();
			let metrics = self
				.fetcher
				.fetch("list context metrics", move || context_tree.keys())
				.await?;

			for metric in metrics {
				let path = [context.clone(), metric.clone()];
				let source_sequence = source_root.subtree(&path);
				let dest_sequence = dest_root.subtree(&path);

				stats += self
					.replicate_sequence(
						generation,
						&context,
						&metric,
						source_sequence.as_ref(),
						dest_sequence.as_ref(),
						writer,
					)
					.await?;
			}
		}

		Ok(stats)
	}

	#[instrument(skip(self, source, dest, writer), err)]
	async fn replicate_sequence(
		&self,
		generation: Generation,
		context: &Key,
		metric: &Key,
		source: &dyn Tree,
		dest: &dyn Tree,
		writer: &mut BatchWriter,
	) -> Result<SyncStats, Error> {
		let (meta, full_copy) = (self.dest_meta_run, self.full_copy);
		let last_step = self
			.fetcher
			.fetch("resolve watermark", move || {
				watermark::resolve(meta, context, metric, full_copy)
			})
			.await?;

		let mut columns = Vec::with_capacity(generation.arrays().len());
		for &(name, dtype) in generation.arrays() {
			let view = source.array(name, dtype);
			let view = view.as_ref();
			let items = self
				.fetcher
				.fetch(&format!("read {name} array"), move || view.items())
				.await?;

			columns.push(Column { name, dtype, items });
		}

		let new_keys = generation.new_keys(&columns, last_step);
		if new_keys.is_empty() {
			trace!(last_step, "Sequence already up to date");
			return Ok(SyncStats::default());
		}

		let mut stats = SyncStats::default();

		for Column { name, dtype, items } in columns {
			let view = dest.array(name, dtype);
			let view = view.as_ref();

			self.fetcher
				.fetch(&format!("allocate {name} array"), move || view.allocate())
				.await?;

			let fresh = items
				.into_iter()
				.filter(|(key, _)| new_keys.contains(key))
				.collect();

			stats += writer.write(view, fresh).await?;
		}

		debug!(
			last_step,
			new_samples = new_keys.len(),
			items = stats.items,
			"Replicated sequence;"
		);

		Ok(stats)
	}
}
