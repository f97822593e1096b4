//! Idle eviction of overflow connections

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::manager::PoolShared;

/// Handle to the periodic eviction task.
///
/// Cancellation is only observed between passes, so a pass that is closing
/// connections always runs to completion. Dropping the handle cancels the task
/// without waiting for it.
pub(crate) struct EvictionTask {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl EvictionTask {
    /// Start the periodic eviction task.
    ///
    /// The task only holds a weak reference to the pool and also exits on its
    /// own once the pool is dropped or shut down.
    pub(crate) fn spawn(shared: &Arc<PoolShared>) -> Self {
        let pool = Arc::downgrade(shared);
        let period = shared.config.eviction_interval();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }
                let Some(shared) = pool.upgrade() else {
                    break;
                };
                if shared.is_closed() {
                    break;
                }

                let evicted = shared.evict_idle(Instant::now()).await;
                if evicted > 0 {
                    tracing::debug!(evicted, "evicted idle overflow connections");
                } else {
                    tracing::trace!("eviction pass found nothing to evict");
                }
            }
            tracing::debug!("eviction task stopped");
        });

        Self { handle, cancel }
    }

    /// Cancel the task and wait for an in-flight pass to finish.
    pub(crate) async fn stop(mut self) {
        self.cancel.cancel();
        if let Err(e) = (&mut self.handle).await
            && e.is_panic()
        {
            tracing::error!(error = %e, "eviction task panicked");
        }
    }
}

impl Drop for EvictionTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl PoolShared {
    /// Close overflow connections that have been idle for longer than `max_idle_secs` at `now`.
    ///
    /// Checked-out connections are never touched, and core connections are
    /// never inspected. Close failures are logged and counted; the pass carries on.
    pub(crate) async fn evict_idle(&self, now: Instant) -> usize {
        let max_idle = self.config.max_idle();

        let candidates: Vec<_> = self
            .overflow_snapshot()
            .into_iter()
            .filter(|entry| {
                entry.is_idle() && entry.idle_for(now).is_some_and(|idle| idle > max_idle)
            })
            .collect();

        let mut evicted = 0;
        for entry in candidates {
            if !entry.try_claim_stale(now, max_idle) {
                // A claim that was handed back may have been skipped by an acquirer.
                if entry.is_idle() {
                    self.available.notify_one();
                }
                continue;
            }

            tracing::debug!(
                connection_id = entry.id(),
                idle_ms = entry.idle_for(now).map(|d| d.as_millis() as u64),
                "evicting idle overflow connection"
            );
            let _ = self.discard(entry).await;
            evicted += 1;
        }
        evicted
    }
}
