//! Background refresh of a runner's public key.
//!
//! The refresher sleeps for the refresh interval, fetches the key from its
//! [`KeySource`] and swaps it into the [`KeyStore`]. A failed fetch leaves the
//! store untouched: the last key fetched successfully stays authoritative and
//! the next attempt is scheduled with exponential backoff (1s, 2s, 4s, ...)
//! capped at the refresh interval.
//!
//! # Graceful Shutdown
//!
//! The task exits when its cancellation token is cancelled, whether it is
//! sleeping or in the middle of a fetch. A fetch interrupted by cancellation
//! never reaches the store.

use crate::error::KeySourceError;
use crate::key_material::KeyMaterial;
use crate::observability;
use crate::source::KeySource;
use crate::store::KeyStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// First retry delay after a failed fetch.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Handle to a running refresher task.
///
/// Dropping the handle cancels the task without waiting for it.
#[derive(Debug)]
pub struct RefresherHandle {
    cancel_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RefresherHandle {
    /// Request cancellation without waiting.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Cancel the task and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.cancel_token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(target: "auth.refresher", error = %e, "Refresher task ended abnormally");
            }
        }
    }
}

impl Drop for RefresherHandle {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Spawn the refresher on the current tokio runtime.
///
/// `cancel_token` may be a child of a process-wide shutdown token; cancelling
/// either stops the task.
pub fn spawn_refresher(
    source: Arc<dyn KeySource>,
    store: KeyStore,
    interval: Duration,
    cancel_token: CancellationToken,
) -> RefresherHandle {
    let task = tokio::spawn(refresh_loop(source, store, interval, cancel_token.clone()));

    RefresherHandle {
        cancel_token,
        task: Some(task),
    }
}

#[instrument(skip_all, name = "auth.refresher")]
async fn refresh_loop(
    source: Arc<dyn KeySource>,
    store: KeyStore,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "auth.refresher",
        source = source.name(),
        interval_secs = interval.as_secs(),
        "Starting key refresher"
    );

    let mut delay = interval;
    let mut backoff = INITIAL_BACKOFF.min(interval);
    let mut consecutive_failures: u32 = 0;

    loop {
        tokio::select! {
            biased;
            () = cancel_token.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        let result = tokio::select! {
            biased;
            () = cancel_token.cancelled() => {
                debug!(target: "auth.refresher", "Fetch interrupted by shutdown");
                break;
            }
            result = source.fetch() => result,
        };

        let result = match result {
            Ok(material) => install(&store, material.into_public_only()).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                observability::record_key_refresh(source.name(), "success");
                observability::set_refresh_consecutive_failures(0);

                consecutive_failures = 0;
                backoff = INITIAL_BACKOFF.min(interval);
                delay = interval;
            }
            Err(e) => {
                consecutive_failures = consecutive_failures.saturating_add(1);
                observability::record_key_refresh(source.name(), "error");
                observability::set_refresh_consecutive_failures(consecutive_failures);

                warn!(
                    target: "auth.refresher",
                    error = %e,
                    consecutive_failures,
                    retry_in_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                    "Key refresh failed, keeping previous key"
                );

                delay = backoff;
                backoff = next_backoff(backoff, interval);
            }
        }
    }

    info!(target: "auth.refresher", "Key refresher stopped");
}

/// Double the retry delay, capped at the refresh interval.
fn next_backoff(current: Duration, interval: Duration) -> Duration {
    current.saturating_mul(2).min(interval)
}

/// Swap `material` into the store, logging whether the key actually changed.
///
/// Material for a different algorithm than the live key is refused.
async fn install(store: &KeyStore, material: KeyMaterial) -> Result<(), KeySourceError> {
    let current = store.read().await;

    if current.algorithm() != material.algorithm() {
        return Err(KeySourceError::KeyFetchMalformed(format!(
            "expected a {} key, fetched a {} key",
            current.algorithm(),
            material.algorithm()
        )));
    }

    let previous = current.fingerprint();
    let fetched = material.fingerprint();
    drop(current);

    store.replace(material).await;

    if previous == fetched {
        debug!(target: "auth.refresher", fingerprint = ?fetched, "Key refreshed, unchanged");
    } else {
        info!(
            target: "auth.refresher",
            previous = ?previous,
            current = ?fetched,
            "Key rotated"
        );
    }

    Ok(())
}
