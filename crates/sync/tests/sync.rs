use tracksync::{sequences::Generation, Error, Orchestrator, PassReport, SyncConfig};
use tracksync_store::{
	layout, Capabilities, Error as StoreError, Key, LocalOpener, LocalStore, RunHash, Store,
	StoreOpener, TreeKind, Value,
};

use std::time::Duration;

use tempfile::tempdir;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

mod common;

use common::{
	array_items, array_keys, created_at, meta_run_tree, record_run, record_v1, record_v2,
	set_last_step, FlakyOpener,
};

fn config() -> SyncConfig {
	SyncConfig {
		sleep: 0.0,
		..Default::default()
	}
}

async fn run_once(
	config: SyncConfig,
	source: &dyn StoreOpener,
	dest: &dyn StoreOpener,
) -> PassReport {
	let summary = Orchestrator::new(config, CancellationToken::new())
		.run(source, dest)
		.await
		.unwrap();

	assert_eq!(summary.passes, 1);
	assert_eq!(summary.failed_passes, 0);

	summary.last.unwrap()
}

/// A finished run with one sequence of each generation.
async fn seeded_source(run: &RunHash) -> LocalStore {
	let source = LocalStore::in_memory();
	record_run(&source, run, 120.0, false).await;
	record_v2(&source, run, 0, "loss", &[3, 4, 5, 6, 7]).await;
	record_v1(&source, run, 1, "accuracy", 3).await;

	source
}

#[tokio::test]
#[traced_test]
async fn new_run_is_fully_copied() {
	let run = RunHash::from("8f3a2c");
	let source = seeded_source(&run).await;
	let dest = LocalStore::in_memory();

	let report = run_once(config(), &source, &dest).await;

	assert_eq!(report.successes, vec![run.clone()]);
	assert!(report.skips.is_empty() && report.failures.is_empty());
	assert_eq!(report.totals.items, 5 * 4 + 3 * 3);

	assert_eq!(
		array_items(&dest, &run, Generation::V2, 0, "loss", layout::STEP).await,
		array_items(&source, &run, Generation::V2, 0, "loss", layout::STEP).await,
	);
	assert_eq!(
		array_keys(&dest, &run, Generation::V1, 1, "accuracy", layout::TIME).await,
		vec![0, 1, 2]
	);

	let info = dest.get_run(&run).await.unwrap().unwrap();
	assert!(!info.active);
	assert!((info.duration - 120.0).abs() < f64::EPSILON);

	let props = dest.find_properties(&run).await.unwrap().unwrap();
	assert_eq!(props, source.find_properties(&run).await.unwrap().unwrap());
	assert_eq!(props.created_at, created_at());
	assert!(props.archived);
	assert!(props.tags.contains("gpu"));

	assert_eq!(
		dest.index_entry(TreeKind::Meta, &run).await,
		meta_run_tree(&source, &run).await.get(&[]).await.unwrap()
	);
}

#[tokio::test]
#[traced_test]
async fn resync_is_idempotent() {
	let run = RunHash::from("8f3a2c");
	let source = seeded_source(&run).await;
	let dest = LocalStore::in_memory();

	run_once(config(), &source, &dest).await;
	let before = array_items(&dest, &run, Generation::V2, 0, "loss", layout::VAL).await;

	let forced = SyncConfig {
		force: true,
		..config()
	};
	let report = run_once(forced, &source, &dest).await;

	assert_eq!(report.successes, vec![run.clone()]);
	assert_eq!(report.totals.items, 0);
	assert_eq!(
		array_items(&dest, &run, Generation::V2, 0, "loss", layout::VAL).await,
		before
	);

	let report = run_once(config(), &source, &dest).await;
	assert_eq!(report.skips, vec![run]);
	assert!(report.successes.is_empty());
}

#[tokio::test]
#[traced_test]
async fn only_samples_past_the_watermark_are_copied() {
	let run = RunHash::from("8f3a2c");
	let source = LocalStore::in_memory();
	record_run(&source, &run, 60.0, false).await;
	record_v2(&source, &run, 0, "loss", &[3, 4, 5, 6, 7]).await;

	let dest = LocalStore::in_memory();
	set_last_step(&dest, &run, 0, "loss", 5).await;

	let report = run_once(config(), &source, &dest).await;

	assert_eq!(report.totals.items, 2 * 4);
	assert_eq!(
		array_keys(&dest, &run, Generation::V2, 0, "loss", layout::VAL).await,
		vec![3, 4]
	);
	assert_eq!(
		array_items(&dest, &run, Generation::V2, 0, "loss", layout::STEP).await,
		vec![(3, Value::Int(6)), (4, Value::Int(7))]
	);

	// The meta tree now carries the source watermark.
	assert_eq!(
		meta_run_tree(&dest, &run)
			.await
			.get(&layout::trace_last_step(&Key::Int(0), &Key::from("loss")))
			.await
			.unwrap()
			.and_then(|node| node.as_value().and_then(Value::as_i64)),
		Some(7)
	);
}

#[tokio::test]
#[traced_test]
async fn full_copy_ignores_watermarks() {
	let run = RunHash::from("8f3a2c");
	let source = LocalStore::in_memory();
	record_run(&source, &run, 60.0, false).await;
	record_v2(&source, &run, 0, "loss", &[3, 4, 5, 6, 7]).await;

	let dest = LocalStore::in_memory();
	set_last_step(&dest, &run, 0, "loss", 5).await;

	let report = run_once(
		SyncConfig {
			full_copy: true,
			..config()
		},
		&source,
		&dest,
	)
	.await;

	assert_eq!(report.totals.items, 5 * 4);
	assert_eq!(
		array_keys(&dest, &run, Generation::V2, 0, "loss", layout::VAL).await,
		vec![0, 1, 2, 3, 4]
	);
}

#[tokio::test]
#[traced_test]
async fn matching_runs_are_skipped_unless_activity_differs() {
	let (done, running) = (RunHash::from("aaaa"), RunHash::from("bbbb"));
	let source = LocalStore::in_memory();
	record_run(&source, &done, 120.0, false).await;
	record_run(&source, &running, 120.0, false).await;

	let dest = LocalStore::in_memory();
	record_run(&dest, &done, 120.0, false).await;
	record_run(&dest, &running, 120.0, true).await;

	let report = run_once(config(), &source, &dest).await;

	assert_eq!(report.skips, vec![done]);
	assert_eq!(report.successes, vec![running.clone()]);
	assert!(!dest.get_run(&running).await.unwrap().unwrap().active);
}

#[tokio::test]
#[traced_test]
async fn duration_offset_shifts_the_comparison() {
	let run = RunHash::from("aaaa");
	let source = LocalStore::in_memory();
	record_run(&source, &run, 100.0, false).await;

	let dest = LocalStore::in_memory();
	record_run(&dest, &run, 130.0, false).await;

	let report = run_once(
		SyncConfig {
			offset: 30.0,
			..config()
		},
		&source,
		&dest,
	)
	.await;
	assert_eq!(report.skips, vec![run.clone()]);

	let report = run_once(config(), &source, &dest).await;
	assert_eq!(report.successes, vec![run]);
}

#[tokio::test]
#[traced_test]
async fn mass_updates_are_detected_per_destination() {
	let run = RunHash::from("8f3a2c");
	let source = seeded_source(&run).await;

	let plain = LocalStore::with_capabilities(Capabilities {
		remote: false,
		mass_update: false,
	});
	let report = run_once(config(), &source, &plain).await;
	assert_eq!(report.totals.chunks, 0);
	assert_eq!(report.totals.items, 29);

	let batched = LocalStore::in_memory();
	let report = run_once(config(), &source, &batched).await;
	assert_eq!(report.totals.chunks, 4 + 3);
	assert_eq!(report.totals.items, 29);

	let small_chunks = LocalStore::in_memory();
	let report = run_once(
		SyncConfig {
			chunk_size: 2,
			..config()
		},
		&source,
		&small_chunks,
	)
	.await;
	// 5 samples in chunks of 2 for each of the 4 generation 2 arrays, 3 in chunks of 2 for the
	// 3 generation 1 ones.
	assert_eq!(report.totals.chunks, 4 * 3 + 3 * 2);
}

#[tokio::test]
#[traced_test]
async fn run_range_counts_from_the_end() {
	let source = LocalStore::in_memory();
	let runs = (0..10)
		.map(|i| RunHash::from(format!("run-{i}")))
		.collect::<Vec<_>>();
	for run in &runs {
		record_run(&source, run, 10.0, false).await;
	}

	let dest = LocalStore::in_memory();
	let report = run_once(
		SyncConfig {
			first: -3,
			last: -1,
			..config()
		},
		&source,
		&dest,
	)
	.await;

	assert_eq!(report.successes, runs[7..].to_vec());
	assert_eq!(dest.list_runs().await.unwrap(), runs[7..].to_vec());

	let report = run_once(
		SyncConfig {
			first: 5,
			last: 4,
			..config()
		},
		&source,
		&LocalStore::in_memory(),
	)
	.await;
	assert_eq!(report.processed(), 0);
}

#[tokio::test]
#[traced_test]
async fn explicit_runs_restrict_the_pass() {
	let source = LocalStore::in_memory();
	for run in ["a", "b", "c"] {
		record_run(&source, &run.into(), 10.0, false).await;
	}

	let dest = LocalStore::in_memory();
	let report = run_once(
		SyncConfig {
			runs: vec!["b".into()],
			..config()
		},
		&source,
		&dest,
	)
	.await;

	assert_eq!(report.successes, vec![RunHash::from("b")]);
	assert_eq!(dest.list_runs().await.unwrap(), vec![RunHash::from("b")]);
}

#[tokio::test]
#[traced_test]
async fn explicit_run_missing_from_source_is_a_run_failure() {
	let source = LocalStore::in_memory();
	let dest = LocalStore::in_memory();
	record_run(&dest, &"ghost".into(), 10.0, false).await;

	let report = run_once(
		SyncConfig {
			runs: vec!["ghost".into()],
			..config()
		},
		&source,
		&dest,
	)
	.await;

	assert_eq!(report.failures.len(), 1);
	assert_eq!(report.failures[0].run, RunHash::from("ghost"));
}

#[tokio::test]
#[traced_test]
async fn explicit_run_missing_from_both_stores_publishes_nothing() {
	let ghost = RunHash::from("ghost");
	let source = LocalStore::in_memory();
	let dest = LocalStore::in_memory();

	let config = SyncConfig {
		runs: vec![ghost.clone()],
		..config()
	};

	let report = run_once(config.clone(), &source, &dest).await;
	assert_eq!(report.failures.len(), 1);
	assert_eq!(report.failures[0].run, ghost);

	let res = Orchestrator::new(
		SyncConfig {
			raise_errors: true,
			..config
		},
		CancellationToken::new(),
	)
	.run(&source, &dest)
	.await;
	assert!(matches!(res, Err(Error::RunNotFound(run)) if run == ghost));

	assert_eq!(dest.index_entry(TreeKind::Meta, &ghost).await, None);
	assert!(dest.list_runs().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn cancelled_before_starting_runs_no_pass() {
	let source = seeded_source(&"8f3a2c".into()).await;
	let dest = LocalStore::in_memory();

	let cancel = CancellationToken::new();
	cancel.cancel();

	let started = Instant::now();
	let summary = Orchestrator::new(
		SyncConfig {
			repeat: 60.0,
			..config()
		},
		cancel,
	)
	.run(&source, &dest)
	.await
	.unwrap();

	assert_eq!(summary.passes, 0);
	assert!(summary.last.is_none());
	assert!(started.elapsed() < Duration::from_secs(1));
	assert!(dest.list_runs().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn cancellation_interrupts_the_repeat_wait() {
	let source = seeded_source(&"8f3a2c".into()).await;
	let dest = LocalStore::in_memory();

	let cancel = CancellationToken::new();
	let orchestrator = Orchestrator::new(
		SyncConfig {
			repeat: 3_600.0,
			..config()
		},
		cancel.clone(),
	);

	let started = Instant::now();
	let (summary, ()) = tokio::join!(orchestrator.run(&source, &dest), async {
		sleep(Duration::from_secs(5)).await;
		cancel.cancel();
	});
	let summary = summary.unwrap();

	assert_eq!(summary.passes, 1);
	assert_eq!(summary.last.unwrap().successes.len(), 1);
	assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn repeated_passes_pick_up_new_samples() {
	let run = RunHash::from("8f3a2c");
	let source = seeded_source(&run).await;
	let dest = LocalStore::in_memory();

	let cancel = CancellationToken::new();
	let orchestrator = Orchestrator::new(
		SyncConfig {
			repeat: 10.0,
			force: true,
			..config()
		},
		cancel.clone(),
	);

	let (summary, ()) = tokio::join!(orchestrator.run(&source, &dest), async {
		sleep(Duration::from_secs(5)).await;
		record_v2(&source, &run, 0, "loss", &[3, 4, 5, 6, 7, 8, 9]).await;
		sleep(Duration::from_secs(10)).await;
		cancel.cancel();
	});
	let summary = summary.unwrap();

	assert_eq!(summary.passes, 2);
	assert_eq!(summary.last.unwrap().totals.items, 2 * 4);
	assert_eq!(
		array_keys(&dest, &run, Generation::V2, 0, "loss", layout::VAL).await,
		(0..7).collect::<Vec<_>>()
	);
}

#[tokio::test]
#[traced_test]
async fn transient_read_failures_are_retried() {
	let run = RunHash::from("8f3a2c");
	let source = seeded_source(&run).await;
	source.inject_read_failures(2);

	let dest = LocalStore::in_memory();
	let report = run_once(config(), &source, &dest).await;

	assert_eq!(report.successes, vec![run]);
	assert!(logs_contain("retrying"));
}

#[tokio::test]
#[traced_test]
async fn exhausted_retries_fail_the_run_only() {
	let run = RunHash::from("8f3a2c");
	let source = seeded_source(&run).await;
	let dest = LocalStore::in_memory();

	let config = SyncConfig {
		runs: vec![run.clone()],
		retries: 1,
		..config()
	};

	// Explicit runs skip listing, so the first source read is the run lookup.
	source.inject_read_failures(1);
	let report = run_once(config.clone(), &source, &dest).await;

	assert!(report.successes.is_empty());
	assert_eq!(report.failures.len(), 1);
	assert_eq!(report.failures[0].run, run);

	source.inject_read_failures(1);
	let res = Orchestrator::new(
		SyncConfig {
			raise_errors: true,
			..config
		},
		CancellationToken::new(),
	)
	.run(&source, &dest)
	.await;

	assert!(matches!(
		res,
		Err(Error::FetchExhausted {
			retries: 1,
			source: StoreError::Unavailable(_),
			..
		})
	));
}

#[tokio::test]
#[traced_test]
async fn failed_properties_copy_is_rolled_back() {
	let run = RunHash::from("8f3a2c");
	let source = seeded_source(&run).await;
	let dest = LocalStore::in_memory();
	dest.reject_properties_writes(true);

	let report = run_once(config(), &source, &dest).await;
	assert_eq!(report.failures.len(), 1);
	assert!(dest.find_properties(&run).await.unwrap().is_none());

	// The trees made it across, the missing record alone brings the run back.
	assert!(dest.get_run(&run).await.unwrap().is_some());

	let res = Orchestrator::new(
		SyncConfig {
			raise_errors: true,
			..config()
		},
		CancellationToken::new(),
	)
	.run(&source, &dest)
	.await;

	assert!(matches!(res, Err(Error::TransactionFailure { .. })));
	assert!(dest.find_properties(&run).await.unwrap().is_none());

	dest.reject_properties_writes(false);
	let report = run_once(config(), &source, &dest).await;
	assert_eq!(report.successes, vec![run.clone()]);
	assert_eq!(
		dest.find_properties(&run).await.unwrap(),
		source.find_properties(&run).await.unwrap()
	);
}

#[tokio::test]
#[traced_test]
async fn remote_destinations_copy_properties_without_transaction() {
	let run = RunHash::from("8f3a2c");
	let source = seeded_source(&run).await;
	let dest = LocalStore::with_capabilities(Capabilities {
		remote: true,
		mass_update: true,
	});
	dest.reject_properties_writes(true);

	let res = Orchestrator::new(
		SyncConfig {
			raise_errors: true,
			..config()
		},
		CancellationToken::new(),
	)
	.run(&source, &dest)
	.await;

	assert!(matches!(
		res,
		Err(Error::Store {
			source: StoreError::PropertiesRejected(_),
			..
		})
	));
}

#[tokio::test]
#[traced_test]
async fn store_open_failure_fails_the_pass() {
	let dir = tempdir().unwrap();
	let missing = LocalOpener::new(dir.path().join("missing"));
	let dest = LocalStore::in_memory();

	let summary = Orchestrator::new(config(), CancellationToken::new())
		.run(&missing, &dest)
		.await
		.unwrap();

	assert_eq!(summary.passes, 1);
	assert_eq!(summary.failed_passes, 1);
	assert!(summary.last.is_none());

	let res = Orchestrator::new(
		SyncConfig {
			raise_errors: true,
			..config()
		},
		CancellationToken::new(),
	)
	.run(&missing, &dest)
	.await;

	assert!(matches!(
		res,
		Err(Error::Store {
			source: StoreError::NotFound(_),
			..
		})
	));
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn failed_store_open_is_retried_on_the_next_pass() {
	let run = RunHash::from("8f3a2c");
	let source = FlakyOpener::new(seeded_source(&run).await, [0]);
	let dest = LocalStore::in_memory();

	let cancel = CancellationToken::new();
	let orchestrator = Orchestrator::new(
		SyncConfig {
			repeat: 10.0,
			..config()
		},
		cancel.clone(),
	);

	let (summary, ()) = tokio::join!(orchestrator.run(&source, &dest), async {
		sleep(Duration::from_secs(15)).await;
		cancel.cancel();
	});
	let summary = summary.unwrap();

	assert_eq!(source.opens(), 2);
	assert_eq!(summary.passes, 2);
	assert_eq!(summary.failed_passes, 1);
	assert_eq!(summary.last.unwrap().successes, vec![run.clone()]);
	assert_eq!(dest.list_runs().await.unwrap(), vec![run]);
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn failed_pass_keeps_the_previous_report() {
	let run = RunHash::from("8f3a2c");
	let source = FlakyOpener::new(seeded_source(&run).await, [1]);
	let dest = LocalStore::in_memory();

	let cancel = CancellationToken::new();
	let orchestrator = Orchestrator::new(
		SyncConfig {
			repeat: 10.0,
			..config()
		},
		cancel.clone(),
	);

	let (summary, ()) = tokio::join!(orchestrator.run(&source, &dest), async {
		sleep(Duration::from_secs(15)).await;
		cancel.cancel();
	});
	let summary = summary.unwrap();

	assert_eq!(summary.passes, 2);
	assert_eq!(summary.failed_passes, 1);

	let last = summary.last.unwrap();
	assert_eq!(last.successes, vec![run]);
	assert_eq!(last.totals.items, 5 * 4 + 3 * 3);
}

#[tokio::test]
#[traced_test]
async fn aborted_pass_still_persists_the_destination() {
	let dest_dir = tempdir().unwrap();
	let (synced, broken) = (RunHash::from("a"), RunHash::from("b"));

	// `broken` has samples but no structured record, so copying its properties fails.
	let source = LocalStore::in_memory();
	record_run(&source, &synced, 60.0, false).await;
	record_v2(&source, &broken, 0, "loss", &[1, 2]).await;

	LocalStore::init(dest_dir.path(), Capabilities::default())
		.await
		.unwrap();

	let res = Orchestrator::new(
		SyncConfig {
			raise_errors: true,
			..config()
		},
		CancellationToken::new(),
	)
	.run(&source, &LocalOpener::new(dest_dir.path()))
	.await;
	assert!(res.is_err());

	let reopened = LocalStore::open(dest_dir.path(), Capabilities::default())
		.await
		.unwrap();
	assert!(reopened.list_runs().await.unwrap().contains(&synced));
	assert!(reopened.find_properties(&synced).await.unwrap().is_some());
}

#[tokio::test]
#[traced_test]
async fn directory_stores_are_synced_and_persisted() {
	let (source_dir, dest_dir) = (tempdir().unwrap(), tempdir().unwrap());
	let run = RunHash::from("8f3a2c");

	let source = LocalStore::init(source_dir.path(), Capabilities::default())
		.await
		.unwrap();
	record_run(&source, &run, 120.0, false).await;
	record_v2(&source, &run, 0, "loss", &[1, 2, 3]).await;
	source.close().await.unwrap();

	LocalStore::init(dest_dir.path(), Capabilities::default())
		.await
		.unwrap();

	let report = run_once(
		config(),
		&LocalOpener::new(source_dir.path()),
		&LocalOpener::new(dest_dir.path()),
	)
	.await;
	assert_eq!(report.successes, vec![run.clone()]);

	let reopened = LocalStore::open(dest_dir.path(), Capabilities::default())
		.await
		.unwrap();
	assert_eq!(reopened.list_runs().await.unwrap(), vec![run.clone()]);
	assert_eq!(
		array_keys(&reopened, &run, Generation::V2, 0, "loss", layout::STEP).await,
		vec![0, 1, 2]
	);
	assert!(reopened.find_properties(&run).await.unwrap().is_some());
}
