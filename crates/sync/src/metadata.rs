use tracksync_store::{RunHash, Store};

use tracing::{debug, instrument, warn};

use super::{Error, Fetcher};

/// Copies name, experiment, description, archived flag and tags of `run`, keeping the source's
/// creation time.
pub async fn copy_properties(
	source: &dyn Store,
	dest: &dyn Store,
	run: &RunHash,
	fetcher: &Fetcher,
) -> Result<(), Error> {
	let props = fetcher
		.fetch("find source run properties", move || {
			source.find_properties(run)
		})
		.await?
		.ok_or_else(|| Error::MissingProperties(run.clone()))?;

	let created_at = Some(props.created_at);
	let record = fetcher
		.fetch("open destination run properties", move || {
			dest.open_properties(run, false, created_at)
		})
		.await?;
	let record = record.as_ref();

	let name = &props.name;
	fetcher
		.fetch("set run name", move || record.set_name(name.clone()))
		.await?;

	let experiment = &props.experiment;
	fetcher
		.fetch("set run experiment", move || {
			record.set_experiment(experiment.clone())
		})
		.await?;

	let description = &props.description;
	fetcher
		.fetch("set run description", move || {
			record.set_description(description.clone())
		})
		.await?;

	let archived = props.archived;
	fetcher
		.fetch("set run archived flag", move || record.set_archived(archived))
		.await?;

	for tag in &props.tags {
		fetcher
			.fetch("add run tag", move || record.add_tag(tag))
			.await?;
	}

	debug!(tags = props.tags.len(), "Copied run properties");

	Ok(())
}

/// Copies the structured properties of `run`, inside a transaction when the destination offers
/// one so a failure leaves its record untouched.
#[instrument(skip(source, dest, fetcher), fields(%run), err)]
pub async fn replicate(
	source: &dyn Store,
	dest: &dyn Store,
	run: &RunHash,
	fetcher: &Fetcher,
) -> Result<(), Error> {
	let transaction = if dest.is_remote() {
		None
	} else {
		dest.transaction().await.map_err(|e| Error::Store {
			operation: "begin properties transaction".to_string(),
			source: e,
		})?
	};

	let Some(transaction) = transaction else {
		return copy_properties(source, dest, run, fetcher).await;
	};

	match copy_properties(source, dest, run, fetcher).await {
		Ok(()) => transaction.commit().await.map_err(|e| Error::Store {
			operation: "commit properties transaction".to_string(),
			source: e,
		}),

		Err(e) => {
			if let Err(rollback_error) = transaction.rollback().await {
				warn!(?rollback_error, "Failed to roll back properties transaction");
			}

			Err(Error::TransactionFailure {
				run: run.clone(),
				source: Box::new(e),
			})
		}
	}
}
