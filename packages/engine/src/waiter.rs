use std::time::Duration;

use common::storage::ObjectStore;
use tracing::{debug, instrument};

use crate::error::ProcessError;

/// Wait until the object at `key` exists with a non-zero size.
///
/// The direct backend gives no completion callback; the output appearing in
/// storage is the completion signal. Polls up to `max_polls` times, pausing
/// `poll_interval` between attempts, and returns the observed size.
#[instrument(skip(store))]
pub async fn await_populated(
    store: &dyn ObjectStore,
    key: &str,
    poll_interval: Duration,
    max_polls: u32,
) -> Result<u64, ProcessError> {
    for attempt in 1..=max_polls {
        if let Some(size) = store.byte_size(key).await?
            && size > 0
        {
            debug!(attempt, size, "output materialized");
            return Ok(size);
        }
        tokio::time::sleep(poll_interval).await;
    }
    Err(ProcessError::DispatchTimedOut)
}
