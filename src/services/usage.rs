//! Usage counter
//!
//! A concurrently-shared request counter drained to the database on a
//! fixed interval by a background task. The drain takes-and-resets the
//! counter in one critical section; if the persist fails the drained
//! amount is folded back so no request is ever lost or double-counted.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::db::repositories::UsageRepository;
use crate::models::UsageReading;

/// Shared request counter with periodic persistence
pub struct UsageCounter {
    count: Mutex<u64>,
    repository: Arc<dyn UsageRepository>,
}

impl UsageCounter {
    /// Create a counter backed by the given repository
    pub fn new(repository: Arc<dyn UsageRepository>) -> Self {
        Self {
            count: Mutex::new(0),
            repository,
        }
    }

    /// Record one request
    pub async fn increment(&self) {
        let mut count = self.count.lock().await;
        *count += 1;
    }

    /// Current live count (requests since the last successful drain)
    pub async fn current(&self) -> u64 {
        *self.count.lock().await
    }

    /// Drain the counter and persist a reading.
    ///
    /// The take-and-reset happens in one critical section; increments
    /// arriving while the persist is in flight land in the next reading.
    /// On persist failure the drained amount is folded back into the live
    /// counter and a warning is logged; there is no inline retry.
    pub async fn drain_and_persist(&self) {
        let drained = {
            let mut count = self.count.lock().await;
            std::mem::take(&mut *count)
        };

        let reading = UsageReading::taken_now(drained as i64);
        match self.repository.insert(&reading).await {
            Ok(()) => {
                tracing::debug!(request_count = drained, "Persisted usage reading");
            }
            Err(e) => {
                let mut count = self.count.lock().await;
                *count += drained;
                tracing::warn!(
                    request_count = drained,
                    "Failed to persist usage reading, folded count back: {:#}",
                    e
                );
            }
        }
    }
}

/// Spawn the periodic drain task.
///
/// Drains on every interval tick. When the shutdown channel fires, one
/// final drain runs before the task exits so pending counts are not
/// dropped.
pub fn spawn_drain_task(
    counter: Arc<UsageCounter>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick of a tokio interval fires immediately; skip it so
        // the first reading covers a full interval
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    counter.drain_and_persist().await;
                }
                _ = shutdown.changed() => {
                    tracing::info!("Usage drain task shutting down, final drain");
                    counter.drain_and_persist().await;
                    break;
                }
            }
        }
    })
}
