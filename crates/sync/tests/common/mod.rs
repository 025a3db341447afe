#![allow(dead_code)]

use tracksync::sequences::Generation;
use tracksync_store::{
	layout, Dtype, Error as StoreError, Key, LocalStore, RunHash, Store, StoreOpener, Tree,
	TreeKind, Value,
};

use std::{
	collections::BTreeSet,
	path::Path,
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	},
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

pub const CREATED: f64 = 1_700_000_000.0;

pub async fn meta_run_tree(store: &LocalStore, run: &RunHash) -> Box<dyn Tree> {
	store
		.open_tree(TreeKind::Meta, run, false, true)
		.await
		.unwrap()
		.subtree(&layout::meta_run_root(run))
}

async fn sequence_tree(
	store: &LocalStore,
	run: &RunHash,
	generation: Generation,
	context: i64,
	metric: &str,
) -> Box<dyn Tree> {
	let mut path = generation.root(run);
	path.extend([Key::Int(context), Key::from(metric)]);

	store
		.open_tree(TreeKind::Seqs, run, false, true)
		.await
		.unwrap()
		.subtree(&path)
}

/// Records a run with its timing attributes and structured properties.
pub async fn record_run(store: &LocalStore, run: &RunHash, duration: f64, active: bool) {
	let meta = meta_run_tree(store, run).await;
	meta.set(&[layout::CREATION_TIME.into()], Value::Float(CREATED).into())
		.await
		.unwrap();

	let last_seen = if active {
		layout::UPDATED_TIME
	} else {
		layout::END_TIME
	};
	meta.set(&[last_seen.into()], Value::Float(CREATED + duration).into())
		.await
		.unwrap();

	let record = store
		.open_properties(run, false, Some(created_at()))
		.await
		.unwrap();
	record
		.set_name(Some(format!("{run}-name")))
		.await
		.unwrap();
	record
		.set_experiment(Some("resnet-sweep".to_string()))
		.await
		.unwrap();
	record
		.set_description(Some("lr=3e-4".to_string()))
		.await
		.unwrap();
	record.set_archived(true).await.unwrap();
	record.add_tag("baseline").await.unwrap();
	record.add_tag("gpu").await.unwrap();
}

pub fn created_at() -> chrono::DateTime<Utc> {
	Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

/// Appends a generation 2 sequence with one sample per step, keyed from 0, and records its
/// `last_step` in the meta tree.
pub async fn record_v2(store: &LocalStore, run: &RunHash, context: i64, metric: &str, steps: &[i64]) {
	let sequence = sequence_tree(store, run, Generation::V2, context, metric).await;

	for (key, step) in (0..).zip(steps) {
		sequence
			.array(layout::VAL, Dtype::Any)
			.set(key, Value::Int(step * 10))
			.await
			.unwrap();
		sequence
			.array(layout::STEP, Dtype::Int64)
			.set(key, Value::Int(*step))
			.await
			.unwrap();
		sequence
			.array(layout::EPOCH, Dtype::Int64)
			.set(key, Value::Int(step / 100))
			.await
			.unwrap();
		sequence
			.array(layout::TIME, Dtype::Int64)
			.set(key, Value::Int(1_700_000_000 + step))
			.await
			.unwrap();
	}

	if let Some(last) = steps.last() {
		set_last_step(store, run, context, metric, *last).await;
	}
}

/// Appends `count` generation 1 samples, keyed from 0.
pub async fn record_v1(store: &LocalStore, run: &RunHash, context: i64, metric: &str, count: i64) {
	let sequence = sequence_tree(store, run, Generation::V1, context, metric).await;

	for key in 0..count {
		sequence
			.array(layout::VAL, Dtype::Any)
			.set(key, Value::Float(0.25))
			.await
			.unwrap();
		sequence
			.array(layout::EPOCH, Dtype::Int64)
			.set(key, Value::Int(0))
			.await
			.unwrap();
		sequence
			.array(layout::TIME, Dtype::Int64)
			.set(key, Value::Int(1_700_000_000 + key))
			.await
			.unwrap();
	}

	if count > 0 {
		set_last_step(store, run, context, metric, count - 1).await;
	}
}

pub async fn set_last_step(store: &LocalStore, run: &RunHash, context: i64, metric: &str, step: i64) {
	meta_run_tree(store, run)
		.await
		.set(
			&layout::trace_last_step(&Key::Int(context), &Key::from(metric)),
			Value::Int(step).into(),
		)
		.await
		.unwrap();
}

pub async fn array_keys(
	store: &LocalStore,
	run: &RunHash,
	generation: Generation,
	context: i64,
	metric: &str,
	array: &str,
) -> Vec<i64> {
	array_items(store, run, generation, context, metric, array)
		.await
		.into_iter()
		.map(|(key, _)| key)
		.collect()
}

pub async fn array_items(
	store: &LocalStore,
	run: &RunHash,
	generation: Generation,
	context: i64,
	metric: &str,
	array: &str,
) -> Vec<(i64, Value)> {
	sequence_tree(store, run, generation, context, metric)
		.await
		.array(array, Dtype::Any)
		.items()
		.await
		.unwrap()
}

/// Hands out `store`, except on the listed open calls (counted from 0) which fail as if the store
/// were missing.
pub struct FlakyOpener {
	store: LocalStore,
	failing_opens: BTreeSet<usize>,
	opens: AtomicUsize,
}

impl FlakyOpener {
	pub fn new(store: LocalStore, failing_opens: impl IntoIterator<Item = usize>) -> Self {
		Self {
			store,
			failing_opens: failing_opens.into_iter().collect(),
			opens: AtomicUsize::new(0),
		}
	}

	pub fn opens(&self) -> usize {
		self.opens.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl StoreOpener for FlakyOpener {
	async fn open(&self) -> Result<Arc<dyn Store>, StoreError> {
		let call = self.opens.fetch_add(1, Ordering::SeqCst);

		if self.failing_opens.contains(&call) {
			return Err(StoreError::NotFound(Path::new("flaky").into()));
		}

		Ok(Arc::new(self.store.clone()))
	}

	fn describe(&self) -> String {
		"flaky store".to_string()
	}
}
