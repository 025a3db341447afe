//! Where things live inside a run's trees.
//!
//! Meta tree:
//! ```text
//! chunks/<run>/creation_time          float, unix seconds
//! chunks/<run>/end_time               float, absent while the run is active
//! chunks/<run>/updated_time           float, last heartbeat of an active run
//! chunks/<run>/traces/<ctx>/<metric>/last_step
//! ```
//!
//! Sequence tree, generation 1 and generation 2:
//! ```text
//! chunks/<run>/<ctx>/<metric>/{val,epoch,time}
//! v2/chunks/<run>/<ctx>/<metric>/{val,step,epoch,time}
//! ```

use super::model::{Key, RunHash};

pub const CHUNKS: &str = "chunks";
pub const V2: &str = "v2";
pub const TRACES: &str = "traces";

pub const CREATION_TIME: &str = "creation_time";
pub const END_TIME: &str = "end_time";
pub const UPDATED_TIME: &str = "updated_time";
pub const LAST_STEP: &str = "last_step";

pub const VAL: &str = "val";
pub const STEP: &str = "step";
pub const EPOCH: &str = "epoch";
pub const TIME: &str = "time";

/// Root of a run's own attributes inside its meta tree.
#[must_use]
pub fn meta_run_root(run: &RunHash) -> Vec<Key> {
	vec![CHUNKS.into(), run.into()]
}

/// Path of the `last_step` leaf, relative to [`meta_run_root`].
#[must_use]
pub fn trace_last_step(context: &Key, metric: &Key) -> Vec<Key> {
	vec![
		TRACES.into(),
		context.clone(),
		metric.clone(),
		LAST_STEP.into(),
	]
}

#[must_use]
pub fn v1_sequences_root(run: &RunHash) -> Vec<Key> {
	vec![CHUNKS.into(), run.into()]
}

#[must_use]
pub fn v2_sequences_root(run: &RunHash) -> Vec<Key> {
	vec![V2.into(), CHUNKS.into(), run.into()]
}
