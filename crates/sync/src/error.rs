use tracksync_store::{Error as StoreError, RunHash};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("failed to {operation} after {retries} attempts: {source}")]
	FetchExhausted {
		operation: String,
		retries: u32,
		#[source]
		source: StoreError,
	},
	#[error("failed to {operation}: {source}")]
	Store {
		operation: String,
		#[source]
		source: StoreError,
	},
	#[error("metadata transaction for run <hash='{run}'> was rolled back: {source}")]
	TransactionFailure {
		run: RunHash,
		#[source]
		source: Box<Error>,
	},
	#[error("run <hash='{0}'> not found in source store")]
	RunNotFound(RunHash),
	#[error("run <hash='{0}'> has no structured properties in source store")]
	MissingProperties(RunHash),
}
