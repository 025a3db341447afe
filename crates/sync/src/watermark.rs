use tracksync_store::{layout, Error as StoreError, Key, Node, Tree};

/// Position meaning "nothing copied yet".
pub const NONE_COPIED: i64 = -1;

/// Highest step (or key, for generation 1 sequences) the destination already holds for the
/// `(context, metric)` sequence.
///
/// `dest_meta_run_tree` is the destination meta tree rooted at the run
/// ([`layout::meta_run_root`]). Never writes anything.
pub async fn resolve(
	dest_meta_run_tree: &dyn Tree,
	context: &Key,
	metric: &Key,
	full_copy: bool,
) -> Result<i64, StoreError> {
	if full_copy {
		return Ok(NONE_COPIED);
	}

	Ok(dest_meta_run_tree
		.get(&layout::trace_last_step(context, metric))
		.await?
		.as_ref()
		.and_then(Node::as_value)
		.and_then(|value| value.as_i64())
		.unwrap_or(NONE_COPIED))
}
