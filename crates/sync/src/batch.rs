use tracksync_store::{ArrayView, Value};

use std::{cmp::Ordering, num::NonZeroUsize, ops::AddAssign};

use serde::Serialize;
use tracing::{debug, trace};

use super::{Error, Fetcher};

/// What the destination answered when asked whether it takes mass updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchSupport {
	Supported(NonZeroUsize),
	Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
	/// Not negotiated yet, the first write probes the destination with an empty mass update.
	Probe(NonZeroUsize),
	Negotiated(BatchSupport),
}

impl BatchMode {
	#[must_use]
	pub fn from_chunk_size(chunk_size: i64) -> Self {
		let size = NonZeroUsize::new(
			usize::try_from(chunk_size.unsigned_abs()).unwrap_or(usize::MAX),
		);

		match (chunk_size.cmp(&0), size) {
			(Ordering::Less, Some(size)) => Self::Probe(size),
			(Ordering::Greater, Some(size)) => Self::Negotiated(BatchSupport::Supported(size)),
			_ => Self::Negotiated(BatchSupport::Unsupported),
		}
	}
}

/// Chunks and items written to a destination.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncStats {
	pub chunks: usize,
	pub items: usize,
}

impl AddAssign for SyncStats {
	fn add_assign(&mut self, rhs: Self) {
		self.chunks += rhs.chunks;
		self.items += rhs.items;
	}
}

/// Writes ordered `(key, value)` pairs to array views, in chunks when the destination allows it.
///
/// One writer lives for one run sync, so the negotiated mode is reused for every array of the run.
#[derive(Debug)]
pub struct BatchWriter {
	mode: BatchMode,
	fetcher: Fetcher,
}

impl BatchWriter {
	#[must_use]
	pub fn new(chunk_size: i64, fetcher: Fetcher) -> Self {
		Self {
			mode: BatchMode::from_chunk_size(chunk_size),
			fetcher,
		}
	}

	#[must_use]
	pub const fn mode(&self) -> BatchMode {
		self.mode
	}

	/// Chunk size in use, `0` meaning one write per item, `None` while still unknown.
	#[must_use]
	pub const fn chunk_size(&self) -> Option<usize> {
		match self.mode {
			BatchMode::Probe(_) => None,
			BatchMode::Negotiated(BatchSupport::Supported(size)) => Some(size.get()),
			BatchMode::Negotiated(BatchSupport::Unsupported) => Some(0),
		}
	}

	async fn negotiate(&mut self, view: &dyn ArrayView) -> BatchSupport {
		match self.mode {
			BatchMode::Negotiated(support) => support,
			BatchMode::Probe(size) => {
				let support = match view.update(Vec::new()).await {
					Ok(()) => BatchSupport::Supported(size),
					Err(e) => {
						debug!(?e, "Destination refused an empty mass update");
						BatchSupport::Unsupported
					}
				};

				debug!(?support, "Negotiated mass update support");
				self.mode = BatchMode::Negotiated(support);

				support
			}
		}
	}

	pub async fn write(
		&mut self,
		view: &dyn ArrayView,
		items: Vec<(i64, Value)>,
	) -> Result<SyncStats, Error> {
		let mut stats = SyncStats::default();

		if items.is_empty() {
			return Ok(stats);
		}

		match self.negotiate(view).await {
			BatchSupport::Supported(size) => {
				for chunk in items.chunks(size.get()) {
					self.fetcher
						.fetch("apply mass update", move || view.update(chunk.to_vec()))
						.await?;

					stats.chunks += 1;
					stats.items += chunk.len();
					trace!(chunk_len = chunk.len(), "Wrote chunk");
				}
			}

			BatchSupport::Unsupported => {
				for (key, value) in &items {
					let key = *key;
					self.fetcher
						.fetch("write item", move || view.set(key, value.clone()))
						.await?;

					stats.items += 1;
				}
			}
		}

		Ok(stats)
	}
}
