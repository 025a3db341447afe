use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
	error::Error,
	model::{Dtype, Key, Node, RunHash, RunInfo, RunProperties, TreeKind, Value},
};

/// A tracking store holding runs, their trees and their structured properties.
///
/// Implemented once per backend; the sync engine only ever talks to `dyn Store`.
#[async_trait]
pub trait Store: Send + Sync {
	/// Remote stores own their atomicity, so no client-side [`Transaction`] is available.
	fn is_remote(&self) -> bool;

	async fn list_runs(&self) -> Result<Vec<RunHash>, Error>;

	async fn get_run(&self, run: &RunHash) -> Result<Option<RunInfo>, Error>;

	async fn open_tree(
		&self,
		kind: TreeKind,
		run: &RunHash,
		read_only: bool,
		no_cache: bool,
	) -> Result<Box<dyn Tree>, Error>;

	async fn find_properties(&self, run: &RunHash) -> Result<Option<RunProperties>, Error>;

	/// Opens the structured record of `run`, creating it with `created_at` if it doesn't exist
	/// and the record isn't read only.
	async fn open_properties(
		&self,
		run: &RunHash,
		read_only: bool,
		created_at: Option<DateTime<Utc>>,
	) -> Result<Box<dyn PropertiesRecord>, Error>;

	/// Exclusive section over structured properties, `None` on stores that can't provide one.
	async fn transaction(&self) -> Result<Option<Box<dyn Transaction>>, Error>;

	async fn build_index(&self, kind: TreeKind) -> Result<Box<dyn Index>, Error>;

	async fn close(&self) -> Result<(), Error>;
}

/// Hierarchical key-value view rooted somewhere inside one run's tree.
#[async_trait]
pub trait Tree: Send + Sync {
	fn subtree(&self, path: &[Key]) -> Box<dyn Tree>;

	fn array(&self, name: &str, dtype: Dtype) -> Box<dyn ArrayView>;

	/// Child keys in order, empty if nothing exists at this position.
	async fn keys(&self) -> Result<Vec<Key>, Error>;

	/// Snapshot of the node at `path`; an empty path reads this whole view.
	async fn get(&self, path: &[Key]) -> Result<Option<Node>, Error>;

	/// Replaces the node at `path`; an empty path replaces this whole view.
	async fn set(&self, path: &[Key], node: Node) -> Result<(), Error>;
}

/// Ordered integer-keyed view over one array of a sequence.
#[async_trait]
pub trait ArrayView: Send + Sync {
	/// Creates the array if it doesn't exist yet, no-op otherwise.
	async fn allocate(&self) -> Result<(), Error>;

	async fn items(&self) -> Result<Vec<(i64, Value)>, Error>;

	async fn get(&self, key: i64) -> Result<Option<Value>, Error>;

	async fn set(&self, key: i64, value: Value) -> Result<(), Error>;

	/// Mass update: writes every pair in one call. Stores without support return
	/// [`Error::Unsupported`], even for an empty batch.
	async fn update(&self, batch: Vec<(i64, Value)>) -> Result<(), Error>;
}

#[async_trait]
pub trait PropertiesRecord: Send + Sync {
	async fn set_name(&self, name: Option<String>) -> Result<(), Error>;

	async fn set_experiment(&self, experiment: Option<String>) -> Result<(), Error>;

	async fn set_description(&self, description: Option<String>) -> Result<(), Error>;

	async fn set_archived(&self, archived: bool) -> Result<(), Error>;

	async fn add_tag(&self, tag: &str) -> Result<(), Error>;
}

#[async_trait]
pub trait Transaction: Send {
	async fn commit(self: Box<Self>) -> Result<(), Error>;

	async fn rollback(self: Box<Self>) -> Result<(), Error>;
}

#[async_trait]
pub trait Index: Send + Sync {
	/// Publishes the finished `run_tree` of `run` so readers of the index observe it.
	async fn finalize(&self, run: &RunHash, run_tree: &dyn Tree) -> Result<(), Error>;
}

/// Knows how to (re)open a store, once per sync pass.
#[async_trait]
pub trait StoreOpener: Send + Sync {
	async fn open(&self) -> Result<Arc<dyn Store>, Error>;

	fn describe(&self) -> String;
}
