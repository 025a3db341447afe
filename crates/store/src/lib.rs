//!
//! # Tracking store contract
//!
//! Capability traits over an experiment tracking store (runs, their meta and sequence trees,
//! structured properties, transactions and indexes) plus [`LocalStore`], a backend that keeps
//! everything in memory and persists it to a directory when closed.
//!

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

mod error;
pub mod layout;
mod local;
mod model;
mod store;

pub use error::{Error, FileIOError};
pub use local::{Capabilities, LocalOpener, LocalStore};
pub use model::{Dtype, Key, Node, RunHash, RunInfo, RunProperties, TreeKind, Value};
pub use store::{ArrayView, Index, PropertiesRecord, Store, StoreOpener, Transaction, Tree};
