use tracksync_store::RunInfo;

/// Why a run is synced, or how close it was when skipped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SkipDecision {
	Sync(SyncReason),
	Skip { diff: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncReason {
	MissingAtDestination,
	/// The destination has the run's trees but no structured record, e.g. after a rolled back
	/// properties copy.
	MissingProperties,
	Forced,
	ActiveMismatch,
	DurationMismatch { diff: f64 },
}

/// Decides, before copying anything, whether a run is already up to date at the destination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkipPolicy {
	pub offset: f64,
	pub eps: f64,
	pub force: bool,
}

impl SkipPolicy {
	/// Decisions that don't need the source run: a run unknown to the destination, or forced.
	#[must_use]
	pub const fn precheck(&self, dest: Option<&RunInfo>) -> Option<SyncReason> {
		if dest.is_none() {
			Some(SyncReason::MissingAtDestination)
		} else if self.force {
			Some(SyncReason::Forced)
		} else {
			None
		}
	}

	/// Compares both sides of a run known to the destination.
	#[must_use]
	pub fn compare(&self, source: &RunInfo, dest: &RunInfo) -> SkipDecision {
		let diff = (source.duration + self.offset - dest.duration).abs();

		if source.active != dest.active {
			SkipDecision::Sync(SyncReason::ActiveMismatch)
		} else if diff < self.eps {
			SkipDecision::Skip { diff }
		} else {
			SkipDecision::Sync(SyncReason::DurationMismatch { diff })
		}
	}

	#[must_use]
	pub fn decide(&self, source: &RunInfo, dest: Option<&RunInfo>) -> SkipDecision {
		match (self.precheck(dest), dest) {
			(Some(reason), _) => SkipDecision::Sync(reason),
			(None, Some(dest)) => self.compare(source, dest),
			(None, None) => SkipDecision::Sync(SyncReason::MissingAtDestination),
		}
	}
}
