use std::{
	collections::{BTreeMap, BTreeSet},
	fmt,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, immutable identifier of a run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunHash(String);

impl RunHash {
	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for RunHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for RunHash {
	fn from(hash: &str) -> Self {
		Self(hash.to_string())
	}
}

impl From<String> for RunHash {
	fn from(hash: String) -> Self {
		Self(hash)
	}
}

/// Which of the two trees a run keeps in a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TreeKind {
	Meta,
	Seqs,
}

impl fmt::Display for TreeKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Meta => write!(f, "meta"),
			Self::Seqs => write!(f, "seqs"),
		}
	}
}

/// A single path component inside a tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Key {
	Int(i64),
	Str(String),
}

impl fmt::Display for Key {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Int(key) => write!(f, "{key}"),
			Self::Str(key) => f.write_str(key),
		}
	}
}

impl From<i64> for Key {
	fn from(key: i64) -> Self {
		Self::Int(key)
	}
}

impl From<&str> for Key {
	fn from(key: &str) -> Self {
		Self::Str(key.to_string())
	}
}

impl From<String> for Key {
	fn from(key: String) -> Self {
		Self::Str(key)
	}
}

impl From<&RunHash> for Key {
	fn from(hash: &RunHash) -> Self {
		Self::Str(hash.as_str().to_string())
	}
}

/// Scalar stored at a tree leaf or an array slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	Str(String),
}

impl Value {
	#[must_use]
	pub const fn as_i64(&self) -> Option<i64> {
		match self {
			Self::Int(value) => Some(*value),
			_ => None,
		}
	}

	#[must_use]
	#[allow(clippy::cast_precision_loss)]
	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Self::Int(value) => Some(*value as f64),
			Self::Float(value) => Some(*value),
			_ => None,
		}
	}
}

impl From<i64> for Value {
	fn from(value: i64) -> Self {
		Self::Int(value)
	}
}

impl From<f64> for Value {
	fn from(value: f64) -> Self {
		Self::Float(value)
	}
}

impl From<bool> for Value {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}

impl From<&str> for Value {
	fn from(value: &str) -> Self {
		Self::Str(value.to_string())
	}
}

/// Element type an array view enforces on writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
	Any,
	Int64,
}

impl Dtype {
	#[must_use]
	pub const fn accepts(self, value: &Value) -> bool {
		match self {
			Self::Any => true,
			Self::Int64 => matches!(value, Value::Int(_)),
		}
	}
}

impl fmt::Display for Dtype {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Any => write!(f, "any"),
			Self::Int64 => write!(f, "int64"),
		}
	}
}

/// Hierarchical value: either a scalar leaf or an ordered branch of child nodes.
///
/// Arrays are branches whose keys are all [`Key::Int`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
	Leaf(Value),
	Branch(BTreeMap<Key, Node>),
}

impl Default for Node {
	fn default() -> Self {
		Self::Branch(BTreeMap::new())
	}
}

impl From<Value> for Node {
	fn from(value: Value) -> Self {
		Self::Leaf(value)
	}
}

impl Node {
	#[must_use]
	pub fn get(&self, path: &[Key]) -> Option<&Self> {
		path.iter().try_fold(self, |node, key| match node {
			Self::Branch(children) => children.get(key),
			Self::Leaf(_) => None,
		})
	}

	/// Walks `path`, creating empty branches along the way. A leaf found in the middle of the
	/// path is replaced by a branch.
	pub fn entry(&mut self, path: &[Key]) -> &mut Self {
		let mut node = self;
		for key in path {
			if matches!(node, Self::Leaf(_)) {
				*node = Self::default();
			}
			let Self::Branch(children) = node else {
				unreachable!("leaf nodes were just replaced by branches");
			};
			node = children.entry(key.clone()).or_default();
		}
		node
	}

	/// Returns the branch children at `path`, turning whatever is there into a branch.
	pub fn branch_mut(&mut self, path: &[Key]) -> &mut BTreeMap<Key, Self> {
		let node = self.entry(path);
		if matches!(node, Self::Leaf(_)) {
			*node = Self::default();
		}
		match node {
			Self::Branch(children) => children,
			Self::Leaf(_) => unreachable!("leaf was just replaced by a branch"),
		}
	}

	pub fn insert(&mut self, path: &[Key], value: Self) {
		match path.split_last() {
			None => *self = value,
			Some((last, parent)) => {
				self.branch_mut(parent).insert(last.clone(), value);
			}
		}
	}

	#[must_use]
	pub fn keys(&self) -> Vec<Key> {
		match self {
			Self::Branch(children) => children.keys().cloned().collect(),
			Self::Leaf(_) => Vec::new(),
		}
	}

	#[must_use]
	pub const fn as_value(&self) -> Option<&Value> {
		match self {
			Self::Leaf(value) => Some(value),
			Self::Branch(_) => None,
		}
	}
}

/// Derived, read-only attributes of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
	pub hash: RunHash,
	/// Seconds between creation and the run's end (or its last update while still active).
	pub duration: f64,
	pub active: bool,
}

/// Structured, mutable properties of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunProperties {
	pub name: Option<String>,
	pub experiment: Option<String>,
	pub description: Option<String>,
	pub archived: bool,
	pub tags: BTreeSet<String>,
	pub created_at: DateTime<Utc>,
}

impl RunProperties {
	#[must_use]
	pub const fn new(created_at: DateTime<Utc>) -> Self {
		Self {
			name: None,
			experiment: None,
			description: None,
			archived: false,
			tags: BTreeSet::new(),
			created_at,
		}
	}
}
