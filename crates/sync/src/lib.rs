//!
//! # Run synchronization engine
//!
//! Replicates experiment runs (structured properties, a meta tree and metric sequences) from a
//! source tracking store to a destination one, incrementally and resumably:
//! - Each sequence only gets the samples past the destination watermark (`last_step`);
//! - Runs whose duration and activity already match at the destination are skipped;
//! - Writes are chunked into mass updates when the destination supports them;
//! - Store operations are retried on transient failures;
//! - Passes can repeat on an interval until cancelled.
//!
//! ## Basic example
//!
//! ```
//! use tracksync::{Orchestrator, SyncConfig};
//! use tracksync_store::LocalStore;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (source, dest) = (LocalStore::in_memory(), LocalStore::in_memory());
//!
//!     let orchestrator = Orchestrator::new(SyncConfig::default(), CancellationToken::new());
//!     let summary = orchestrator.run(&source, &dest).await.unwrap();
//!
//!     assert_eq!(summary.passes, 1);
//! }
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod batch;
mod config;
mod error;
mod fetcher;
pub mod metadata;
mod orchestrator;
mod replicator;
mod report;
pub mod sequences;
mod skip;
pub mod watermark;

pub use batch::{BatchMode, BatchSupport, BatchWriter, SyncStats};
pub use config::SyncConfig;
pub use error::Error;
pub use fetcher::Fetcher;
pub use orchestrator::{resolve_range, Orchestrator};
pub use replicator::sync_run;
pub use report::{PassReport, RunFailure, RunOutcome, Summary};
pub use skip::{SkipDecision, SkipPolicy, SyncReason};
