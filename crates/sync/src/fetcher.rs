use tracksync_store::Error as StoreError;

use std::{future::Future, time::Duration};

use tokio::time::sleep;
use tracing::{trace, warn};

use super::Error;

/// Runs store operations with a bounded retry budget.
///
/// Only errors the store flags as retryable are attempted again, anything else is returned as
/// [`Error::Store`] right away.
#[derive(Debug, Clone, Copy)]
pub struct Fetcher {
	retries: u32,
	sleep: Duration,
}

impl Fetcher {
	#[must_use]
	pub const fn new(retries: u32, sleep: Duration) -> Self {
		Self { retries, sleep }
	}

	/// Total attempts made for an operation, never less than one.
	#[must_use]
	pub fn attempts(&self) -> u32 {
		self.retries.max(1)
	}

	pub async fn fetch<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, Error>
	where
		F: FnMut() -> Fut + Send,
		Fut: Future<Output = Result<T, StoreError>> + Send,
	{
		let attempts = self.attempts();
		let mut attempt = 1;

		loop {
			match op().await {
				Ok(value) => {
					if attempt > 1 {
						trace!(%operation, attempt, "Store operation recovered");
					}
					return Ok(value);
				}

				Err(e) if e.is_retryable() && attempt < attempts => {
					warn!(%operation, attempt, attempts, ?e, "Store operation failed, retrying;");
					sleep(self.sleep).await;
					attempt += 1;
				}

				Err(e) if e.is_retryable() => {
					return Err(Error::FetchExhausted {
						operation: operation.to_string(),
						retries: attempts,
						source: e,
					});
				}

				Err(e) => {
					return Err(Error::Store {
						operation: operation.to_string(),
						source: e,
					});
				}
			}
		}
	}
}
