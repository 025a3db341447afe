use std::{
	collections::BTreeMap,
	path::{Path, PathBuf},
	sync::{
		atomic::{AtomicBool, AtomicUsize, Ordering},
		Arc,
	},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{
	fs,
	sync::{Mutex, OwnedMutexGuard, RwLock},
};
use tracing::{debug, instrument, trace};

use super::{
	error::{Error, FileIOError},
	layout,
	model::{Dtype, Key, Node, RunHash, RunInfo, RunProperties, TreeKind, Value},
	store::{ArrayView, Index, PropertiesRecord, Store, StoreOpener, Transaction, Tree},
};

const STORE_FILE: &str = "store.msgpack";

/// What a [`LocalStore`] accepts, so one backend can stand in for every kind of destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
	/// Behave like a remote store: no client-side transactions.
	pub remote: bool,
	/// Accept mass updates on array views.
	pub mass_update: bool,
}

impl Default for Capabilities {
	fn default() -> Self {
		Self {
			remote: false,
			mass_update: true,
		}
	}
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct RunRecord {
	meta: Node,
	seqs: Node,
	props: Option<RunProperties>,
}

impl RunRecord {
	const fn tree(&self, kind: TreeKind) -> &Node {
		match kind {
			TreeKind::Meta => &self.meta,
			TreeKind::Seqs => &self.seqs,
		}
	}

	fn tree_mut(&mut self, kind: TreeKind) -> &mut Node {
		match kind {
			TreeKind::Meta => &mut self.meta,
			TreeKind::Seqs => &mut self.seqs,
		}
	}

	fn info(&self, run: &RunHash) -> RunInfo {
		let attributes = self.meta.get(&layout::meta_run_root(run));
		let time = |name: &str| {
			attributes
				.and_then(|node| node.get(&[name.into()]))
				.and_then(Node::as_value)
				.and_then(Value::as_f64)
		};

		let created = time(layout::CREATION_TIME).unwrap_or_default();
		let ended = time(layout::END_TIME);
		let last_seen = ended
			.or_else(|| time(layout::UPDATED_TIME))
			.unwrap_or(created);

		RunInfo {
			hash: run.clone(),
			duration: (last_seen - created).max(0.0),
			active: ended.is_none(),
		}
	}
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct State {
	runs: BTreeMap<RunHash, RunRecord>,
	indexes: BTreeMap<TreeKind, BTreeMap<RunHash, Node>>,
}

#[derive(Debug)]
struct Inner {
	state: RwLock<State>,
	transaction_lock: Arc<Mutex<()>>,
	capabilities: Capabilities,
	root: Option<PathBuf>,
	read_failures: AtomicUsize,
	reject_properties: AtomicBool,
}

/// Tree store kept in memory, optionally persisted to a directory when closed.
///
/// Clones share the same underlying state, which makes a clone behave like a second handle
/// opened on the same repository.
#[derive(Debug, Clone)]
pub struct LocalStore {
	inner: Arc<Inner>,
}

impl Default for LocalStore {
	fn default() -> Self {
		Self::in_memory()
	}
}

impl LocalStore {
	#[must_use]
	pub fn in_memory() -> Self {
		Self::with_capabilities(Capabilities::default())
	}

	#[must_use]
	pub fn with_capabilities(capabilities: Capabilities) -> Self {
		Self::from_parts(State::default(), capabilities, None)
	}

	fn from_parts(state: State, capabilities: Capabilities, root: Option<PathBuf>) -> Self {
		Self {
			inner: Arc::new(Inner {
				state: RwLock::new(state),
				transaction_lock: Arc::new(Mutex::new(())),
				capabilities,
				root,
				read_failures: AtomicUsize::new(0),
				reject_properties: AtomicBool::new(false),
			}),
		}
	}

	/// Creates an empty repository at `path`.
	pub async fn init(path: impl AsRef<Path>, capabilities: Capabilities) -> Result<Self, Error> {
		let path = path.as_ref();
		fs::create_dir_all(path)
			.await
			.map_err(|e| FileIOError::from((path, e, "creating store directory")))?;

		let store = Self::from_parts(State::default(), capabilities, Some(path.to_path_buf()));
		store.persist().await?;

		Ok(store)
	}

	/// Opens an existing repository at `path`.
	#[instrument(skip_all, fields(path = %path.as_ref().display()), err)]
	pub async fn open(path: impl AsRef<Path>, capabilities: Capabilities) -> Result<Self, Error> {
		let path = path.as_ref();
		let file = path.join(STORE_FILE);

		let bytes = match fs::read(&file).await {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(Error::NotFound(path.into()));
			}
			Err(e) => return Err(FileIOError::from((&file, e, "reading store snapshot")).into()),
		};

		let state: State = rmp_serde::from_slice(&bytes)?;
		debug!(runs = state.runs.len(), "Opened local store");

		Ok(Self::from_parts(
			state,
			capabilities,
			Some(path.to_path_buf()),
		))
	}

	#[must_use]
	pub fn capabilities(&self) -> Capabilities {
		self.inner.capabilities
	}

	/// Makes the next `count` read operations fail with a retryable error.
	pub fn inject_read_failures(&self, count: usize) {
		self.inner.read_failures.store(count, Ordering::SeqCst);
	}

	/// Makes every structured properties write fail until turned off again.
	pub fn reject_properties_writes(&self, reject: bool) {
		self.inner.reject_properties.store(reject, Ordering::SeqCst);
	}

	/// The node published for `run` by [`Index::finalize`], if any.
	pub async fn index_entry(&self, kind: TreeKind, run: &RunHash) -> Option<Node> {
		self.inner
			.state
			.read()
			.await
			.indexes
			.get(&kind)
			.and_then(|index| index.get(run))
			.cloned()
	}

	fn check_read(&self) -> Result<(), Error> {
		if self
			.inner
			.read_failures
			.try_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
			.is_ok()
		{
			trace!("Injected read failure");
			return Err(Error::Unavailable("injected read failure".to_string()));
		}

		Ok(())
	}

	async fn persist(&self) -> Result<(), Error> {
		let Some(root) = &self.inner.root else {
			return Ok(());
		};

		let bytes = rmp_serde::to_vec_named(&*self.inner.state.read().await)?;

		let file = root.join(STORE_FILE);
		let tmp = root.join(format!("{STORE_FILE}.tmp"));

		fs::write(&tmp, bytes)
			.await
			.map_err(|e| FileIOError::from((&tmp, e, "writing store snapshot")))?;
		fs::rename(&tmp, &file)
			.await
			.map_err(|e| FileIOError::from((&file, e, "replacing store snapshot")))?;

		Ok(())
	}
}

#[async_trait]
impl Store for LocalStore {
	fn is_remote(&self) -> bool {
		self.inner.capabilities.remote
	}

	async fn list_runs(&self) -> Result<Vec<RunHash>, Error> {
		self.check_read()?;
		Ok(self.inner.state.read().await.runs.keys().cloned().collect())
	}

	async fn get_run(&self, run: &RunHash) -> Result<Option<RunInfo>, Error> {
		self.check_read()?;
		Ok(self
			.inner
			.state
			.read()
			.await
			.runs
			.get(run)
			.map(|record| record.info(run)))
	}

	async fn open_tree(
		&self,
		kind: TreeKind,
		run: &RunHash,
		read_only: bool,
		_no_cache: bool,
	) -> Result<Box<dyn Tree>, Error> {
		Ok(Box::new(LocalTree {
			store: self.clone(),
			run: run.clone(),
			kind,
			path: Vec::new(),
			read_only,
		}))
	}

	async fn find_properties(&self, run: &RunHash) -> Result<Option<RunProperties>, Error> {
		self.check_read()?;
		Ok(self
			.inner
			.state
			.read()
			.await
			.runs
			.get(run)
			.and_then(|record| record.props.clone()))
	}

	async fn open_properties(
		&self,
		run: &RunHash,
		read_only: bool,
		created_at: Option<DateTime<Utc>>,
	) -> Result<Box<dyn PropertiesRecord>, Error> {
		if !read_only {
			self.inner
				.state
				.write()
				.await
				.runs
				.entry(run.clone())
				.or_default()
				.props
				.get_or_insert_with(|| RunProperties::new(created_at.unwrap_or_else(Utc::now)));
		}

		Ok(Box::new(LocalProperties {
			store: self.clone(),
			run: run.clone(),
			read_only,
		}))
	}

	async fn transaction(&self) -> Result<Option<Box<dyn Transaction>>, Error> {
		if self.inner.capabilities.remote {
			return Ok(None);
		}

		let guard = Arc::clone(&self.inner.transaction_lock).lock_owned().await;

		let snapshot = self
			.inner
			.state
			.read()
			.await
			.runs
			.iter()
			.map(|(run, record)| (run.clone(), record.props.clone()))
			.collect();

		Ok(Some(Box::new(LocalTransaction {
			store: self.clone(),
			snapshot,
			_guard: guard,
		})))
	}

	async fn build_index(&self, kind: TreeKind) -> Result<Box<dyn Index>, Error> {
		Ok(Box::new(LocalIndex {
			store: self.clone(),
			kind,
		}))
	}

	async fn close(&self) -> Result<(), Error> {
		self.persist().await?;
		debug!(persisted = self.inner.root.is_some(), "Closed local store");
		Ok(())
	}
}

#[async_trait]
impl StoreOpener for LocalStore {
	async fn open(&self) -> Result<Arc<dyn Store>, Error> {
		Ok(Arc::new(self.clone()))
	}

	fn describe(&self) -> String {
		self.inner.root.as_ref().map_or_else(
			|| "in-memory store".to_string(),
			|root| root.display().to_string(),
		)
	}
}

/// Opens a directory backed [`LocalStore`] afresh every time.
#[derive(Debug, Clone)]
pub struct LocalOpener {
	pub path: PathBuf,
	pub capabilities: Capabilities,
}

impl LocalOpener {
	#[must_use]
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			capabilities: Capabilities::default(),
		}
	}
}

#[async_trait]
impl StoreOpener for LocalOpener {
	async fn open(&self) -> Result<Arc<dyn Store>, Error> {
		Ok(Arc::new(
			LocalStore::open(&self.path, self.capabilities).await?,
		))
	}

	fn describe(&self) -> String {
		self.path.display().to_string()
	}
}

struct LocalTree {
	store: LocalStore,
	run: RunHash,
	kind: TreeKind,
	path: Vec<Key>,
	read_only: bool,
}

impl LocalTree {
	fn at(&self, path: &[Key]) -> Self {
		Self {
			store: self.store.clone(),
			run: self.run.clone(),
			kind: self.kind,
			path: self.full_path(path),
			read_only: self.read_only,
		}
	}

	fn full_path(&self, path: &[Key]) -> Vec<Key> {
		self.path.iter().chain(path).cloned().collect()
	}

	fn display_path(&self) -> String {
		self.path
			.iter()
			.map(ToString::to_string)
			.collect::<Vec<_>>()
			.join("/")
	}

	async fn read_node<T>(
		&self,
		path: &[Key],
		f: impl FnOnce(Option<&Node>) -> T + Send,
	) -> Result<T, Error> {
		self.store.check_read()?;

		let full_path = self.full_path(path);
		let state = self.store.inner.state.read().await;

		Ok(f(state
			.runs
			.get(&self.run)
			.and_then(|record| record.tree(self.kind).get(&full_path))))
	}

	/// Runs `f` over the run's root node of this tree kind and the path of this view.
	async fn write_node<T>(
		&self,
		f: impl FnOnce(&mut Node, &[Key]) -> T + Send,
	) -> Result<T, Error> {
		if self.read_only {
			return Err(Error::ReadOnly(self.run.clone()));
		}

		let mut state = self.store.inner.state.write().await;
		let record = state.runs.entry(self.run.clone()).or_default();

		Ok(f(record.tree_mut(self.kind), &self.path))
	}
}

#[async_trait]
impl Tree for LocalTree {
	fn subtree(&self, path: &[Key]) -> Box<dyn Tree> {
		Box::new(self.at(path))
	}

	fn array(&self, name: &str, dtype: Dtype) -> Box<dyn ArrayView> {
		Box::new(LocalArray {
			tree: self.at(&[name.into()]),
			dtype,
		})
	}

	async fn keys(&self) -> Result<Vec<Key>, Error> {
		self.read_node(&[], |node| node.map(Node::keys).unwrap_or_default())
			.await
	}

	async fn get(&self, path: &[Key]) -> Result<Option<Node>, Error> {
		self.read_node(path, |node| node.cloned()).await
	}

	async fn set(&self, path: &[Key], node: Node) -> Result<(), Error> {
		let path = path.to_vec();
		self.write_node(move |root, base| {
			root.insert(&[base, path.as_slice()].concat(), node);
		})
		.await
	}
}

struct LocalArray {
	tree: LocalTree,
	dtype: Dtype,
}

impl LocalArray {
	fn check_dtype(&self, value: &Value) -> Result<(), Error> {
		if self.dtype.accepts(value) {
			Ok(())
		} else {
			Err(Error::TypeMismatch {
				path: self.tree.display_path(),
				dtype: self.dtype,
			})
		}
	}
}

#[async_trait]
impl ArrayView for LocalArray {
	async fn allocate(&self) -> Result<(), Error> {
		self.tree
			.write_node(|root, path| {
				root.branch_mut(path);
			})
			.await
	}

	async fn items(&self) -> Result<Vec<(i64, Value)>, Error> {
		self.tree
			.read_node(&[], |node| match node {
				Some(Node::Branch(children)) => children
					.iter()
					.filter_map(|(key, child)| match (key, child) {
						(Key::Int(key), Node::Leaf(value)) => Some((*key, value.clone())),
						_ => None,
					})
					.collect(),
				_ => Vec::new(),
			})
			.await
	}

	async fn get(&self, key: i64) -> Result<Option<Value>, Error> {
		self.tree
			.read_node(&[Key::Int(key)], |node| {
				node.and_then(Node::as_value).cloned()
			})
			.await
	}

	async fn set(&self, key: i64, value: Value) -> Result<(), Error> {
		self.check_dtype(&value)?;

		self.tree
			.write_node(move |root, path| {
				root.branch_mut(path)
					.insert(Key::Int(key), Node::Leaf(value));
			})
			.await
	}

	async fn update(&self, batch: Vec<(i64, Value)>) -> Result<(), Error> {
		if !self.tree.store.inner.capabilities.mass_update {
			return Err(Error::Unsupported("mass update"));
		}

		batch
			.iter()
			.try_for_each(|(_, value)| self.check_dtype(value))?;

		self.tree
			.write_node(move |root, path| {
				root.branch_mut(path).extend(
					batch
						.into_iter()
						.map(|(key, value)| (Key::Int(key), Node::Leaf(value))),
				);
			})
			.await
	}
}

struct LocalProperties {
	store: LocalStore,
	run: RunHash,
	read_only: bool,
}

impl LocalProperties {
	async fn modify(&self, f: impl FnOnce(&mut RunProperties) + Send) -> Result<(), Error> {
		if self.read_only {
			return Err(Error::ReadOnly(self.run.clone()));
		}

		if self.store.inner.reject_properties.load(Ordering::SeqCst) {
			return Err(Error::PropertiesRejected(self.run.clone()));
		}

		let mut state = self.store.inner.state.write().await;
		f(state
			.runs
			.entry(self.run.clone())
			.or_default()
			.props
			.get_or_insert_with(|| RunProperties::new(Utc::now())));

		Ok(())
	}
}

#[async_trait]
impl PropertiesRecord for LocalProperties {
	async fn set_name(&self, name: Option<String>) -> Result<(), Error> {
		self.modify(|props| props.name = name).await
	}

	async fn set_experiment(&self, experiment: Option<String>) -> Result<(), Error> {
		self.modify(|props| props.experiment = experiment).await
	}

	async fn set_description(&self, description: Option<String>) -> Result<(), Error> {
		self.modify(|props| props.description = description).await
	}

	async fn set_archived(&self, archived: bool) -> Result<(), Error> {
		self.modify(|props| props.archived = archived).await
	}

	async fn add_tag(&self, tag: &str) -> Result<(), Error> {
		let tag = tag.to_string();
		self.modify(|props| {
			props.tags.insert(tag);
		})
		.await
	}
}

struct LocalTransaction {
	store: LocalStore,
	snapshot: BTreeMap<RunHash, Option<RunProperties>>,
	_guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl Transaction for LocalTransaction {
	async fn commit(self: Box<Self>) -> Result<(), Error> {
		trace!("Committed properties transaction");
		Ok(())
	}

	async fn rollback(self: Box<Self>) -> Result<(), Error> {
		let Self {
			store,
			mut snapshot,
			_guard,
		} = *self;

		let mut state = store.inner.state.write().await;
		for (run, record) in &mut state.runs {
			record.props = snapshot.remove(run).flatten();
		}

		debug!("Rolled back properties transaction");

		Ok(())
	}
}

struct LocalIndex {
	store: LocalStore,
	kind: TreeKind,
}

#[async_trait]
impl Index for LocalIndex {
	async fn finalize(&self, run: &RunHash, run_tree: &dyn Tree) -> Result<(), Error> {
		let node = run_tree.get(&[]).await?.unwrap_or_default();

		self.store
			.inner
			.state
			.write()
			.await
			.indexes
			.entry(self.kind)
			.or_default()
			.insert(run.clone(), node);

		Ok(())
	}
}
