use std::{fmt, io, path::Path};

use thiserror::Error;

use super::model::{Dtype, RunHash};

#[derive(Debug, Error)]
pub enum Error {
	#[error("store temporarily unavailable: {0}")]
	Unavailable(String),
	#[error("store not found: <path='{}'>", .0.display())]
	NotFound(Box<Path>),
	#[error("operation not supported by this store: {0}")]
	Unsupported(&'static str),
	#[error("tried to write through a read-only view of run <hash='{0}'>")]
	ReadOnly(RunHash),
	#[error("value rejected by {dtype} array at <path='{path}'>")]
	TypeMismatch { path: String, dtype: Dtype },
	#[error("properties write rejected for run <hash='{0}'>")]
	PropertiesRejected(RunHash),

	#[error(transparent)]
	FileIO(#[from] FileIOError),
	#[error("serialization error: {0}")]
	Serialization(#[from] rmp_serde::encode::Error),
	#[error("deserialization error: {0}")]
	Deserialization(#[from] rmp_serde::decode::Error),
}

impl Error {
	/// Whether trying the same operation again may succeed.
	#[must_use]
	pub const fn is_retryable(&self) -> bool {
		matches!(self, Self::Unavailable(_) | Self::FileIO(_))
	}
}

/// File I/O error that includes the path that caused the error
#[derive(Error, Debug)]
pub struct FileIOError {
	pub path: Box<Path>,
	#[source]
	pub source: io::Error,
	pub maybe_context: Option<&'static str>,
}

impl fmt::Display for FileIOError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"file I/O error{}: {}; path: '{}'",
			self.maybe_context
				.map(|ctx| format!(" ({ctx})"))
				.unwrap_or_default(),
			self.source,
			self.path.display()
		)
	}
}

impl<P: AsRef<Path>> From<(P, io::Error, &'static str)> for FileIOError {
	fn from((path, source, context): (P, io::Error, &'static str)) -> Self {
		Self {
			path: path.as_ref().into(),
			source,
			maybe_context: Some(context),
		}
	}
}
