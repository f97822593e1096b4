//! Pool manager: core and overflow sets, acquisition and shutdown

use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use sluice_core::{DatabaseDriver, DriverRegistry, Result, SluiceError};
use tokio::sync::Notify;
use tokio::time::Instant;

use super::config::PoolConfig;
use super::connection::{ConnectionRole, ConnectionState, PooledConnection};
use super::eviction::EvictionTask;
use super::guard::PoolGuard;
use super::ids::IdAllocator;
use super::stats::PoolStats;

const CREATED: u8 = 0;
const STARTING: u8 = 1;
const RUNNING: u8 = 2;
const CLOSED: u8 = 3;

/// State shared between the manager, its guards and the eviction task.
pub(crate) struct PoolShared {
    pub(crate) config: PoolConfig,
    driver: Arc<dyn DatabaseDriver>,
    ids: Arc<IdAllocator>,
    /// Filled once by `init`; membership never changes afterwards
    core: OnceLock<Vec<Arc<PooledConnection>>>,
    /// Keyed by connection id
    overflow: DashMap<usize, Arc<PooledConnection>>,
    /// Overflow connections alive or being opened; never above the overflow capacity
    overflow_slots: AtomicUsize,
    state: AtomicU8,
    /// Signalled whenever a connection becomes idle or overflow capacity frees up
    pub(crate) available: Notify,
    waiting: AtomicUsize,
    created: AtomicU64,
    evicted: AtomicU64,
    close_errors: AtomicU64,
}

/// Reservation of one overflow slot, given back on drop unless committed.
struct OverflowSlot<'a> {
    shared: &'a PoolShared,
    committed: bool,
}

impl OverflowSlot<'_> {
    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for OverflowSlot<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.shared.overflow_slots.fetch_sub(1, Ordering::SeqCst);
            self.shared.available.notify_one();
        }
    }
}

/// Counts a caller as waiting for as long as it is alive.
struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl PoolShared {
    fn ensure_running(&self) -> Result<()> {
        match self.state.load(Ordering::SeqCst) {
            RUNNING => Ok(()),
            CLOSED => Err(SluiceError::PoolClosed),
            _ => Err(SluiceError::NotInitialized),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.load(Ordering::SeqCst) == CLOSED
    }

    fn core(&self) -> &[Arc<PooledConnection>] {
        self.core.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn overflow_snapshot(&self) -> Vec<Arc<PooledConnection>> {
        self.overflow
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Check out the first idle connection, core set first.
    fn checkout_idle(&self) -> Option<Arc<PooledConnection>> {
        if let Some(entry) = self.core().iter().find(|entry| entry.try_checkout()) {
            return Some(Arc::clone(entry));
        }
        self.overflow
            .iter()
            .find(|entry| entry.value().try_checkout())
            .map(|entry| Arc::clone(entry.value()))
    }

    fn reserve_overflow_slot(&self) -> Option<OverflowSlot<'_>> {
        let capacity = self.config.overflow_capacity();
        self.overflow_slots
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                (used < capacity).then_some(used + 1)
            })
            .ok()?;
        Some(OverflowSlot {
            shared: self,
            committed: false,
        })
    }

    /// Open a new overflow connection in a reserved slot and check it out.
    async fn grow(&self, slot: OverflowSlot<'_>) -> Result<Arc<PooledConnection>> {
        let entry = PooledConnection::open(
            &self.config,
            self.driver.as_ref(),
            Arc::clone(&self.ids),
            ConnectionRole::Overflow,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to open overflow connection");
            e
        })?;
        let entry = Arc::new(entry);
        entry.try_checkout();
        self.overflow.insert(entry.id(), Arc::clone(&entry));
        slot.commit();
        self.created.fetch_add(1, Ordering::SeqCst);

        // Shutdown may have swept the sets while the driver was connecting.
        // It keeps sweeping until this slot is given back, closing the entry.
        if self.is_closed() {
            self.available.notify_one();
            return Err(SluiceError::PoolClosed);
        }

        tracing::debug!(connection_id = entry.id(), "checked out new overflow connection");
        Ok(entry)
    }

    /// Acquisition loop: core scan, overflow scan, growth, then wait.
    async fn acquire(self: &Arc<Self>) -> Result<PoolGuard> {
        let mut waiting: Option<WaitingGuard<'_>> = None;
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            self.ensure_running()?;

            if let Some(entry) = self.checkout_idle() {
                tracing::debug!(connection_id = entry.id(), role = ?entry.role(), "checked out idle connection");
                return Ok(PoolGuard::new(entry, Arc::clone(self)));
            }

            if let Some(slot) = self.reserve_overflow_slot() {
                // A slot reserved after shutdown started draining would never be swept.
                if self.is_closed() {
                    return Err(SluiceError::PoolClosed);
                }
                let entry = self.grow(slot).await?;
                return Ok(PoolGuard::new(entry, Arc::clone(self)));
            }

            if waiting.is_none() {
                tracing::debug!("pool saturated, waiting for a connection");
                waiting = Some(WaitingGuard::new(&self.waiting));
            }

            // Woken by a release; the timeout bounds the wait if a signal is missed.
            let _ = tokio::time::timeout(self.config.retry_interval(), notified).await;
        }
    }

    /// Hand a checked-out connection back to the pool.
    ///
    /// Once the pool is closed the connection belongs to `shutdown`, which
    /// closes idle and checked-out connections alike.
    pub(crate) fn release(&self, entry: Arc<PooledConnection>) -> Result<()> {
        if self.is_closed() {
            return Err(SluiceError::PoolClosed);
        }

        if !entry.release() {
            if self.is_closed() {
                return Err(SluiceError::PoolClosed);
            }
            return Err(SluiceError::Other(format!(
                "connection {} was not checked out",
                entry.id()
            )));
        }
        tracing::debug!(connection_id = entry.id(), "connection returned to pool");

        if self.is_closed() {
            return Err(SluiceError::PoolClosed);
        }
        self.available.notify_one();
        Ok(())
    }

    /// Claim and close every connection in both sets, idle or checked out.
    async fn close_all(&self) -> Result<()> {
        let entries: Vec<_> = self
            .core()
            .iter()
            .cloned()
            .chain(self.overflow_snapshot())
            .collect();

        let mut first_error = None;
        for entry in entries {
            if entry.try_retire()
                && let Err(e) = self.discard(entry).await
            {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Wait until no overflow connection is alive or being opened.
    ///
    /// Growth that was connecting when the pool closed still inserts its
    /// connection, so every wake-up sweeps both sets again.
    async fn drain_overflow(&self) -> Result<()> {
        let mut first_error = None;
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.overflow_slots.load(Ordering::SeqCst) == 0 {
                break;
            }
            let _ = tokio::time::timeout(self.config.retry_interval(), notified).await;
            if let Err(e) = self.close_all().await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Remove a claimed connection from its set and close it.
    pub(crate) async fn discard(&self, entry: Arc<PooledConnection>) -> Result<()> {
        let id = entry.id();
        let overflow = entry.role() == ConnectionRole::Overflow;
        if overflow {
            self.overflow.remove(&id);
        }

        let result = entry.evict().await;
        self.evicted.fetch_add(1, Ordering::SeqCst);
        if let Err(ref e) = result {
            self.close_errors.fetch_add(1, Ordering::SeqCst);
            tracing::warn!(connection_id = id, error = %e, "failed to close pooled connection");
        } else {
            tracing::debug!(connection_id = id, role = ?entry.role(), "closed pooled connection");
        }

        if overflow {
            self.overflow_slots.fetch_sub(1, Ordering::SeqCst);
            self.available.notify_one();
        }
        result
    }

    fn stats(&self) -> PoolStats {
        let overflow = self.overflow_snapshot();
        let core = self.core();
        let mut stats = PoolStats {
            max_size: self.config.max_pool_size(),
            core: core.len(),
            overflow: overflow.len(),
            waiting: self.waiting.load(Ordering::SeqCst),
            created: self.created.load(Ordering::SeqCst),
            evicted: self.evicted.load(Ordering::SeqCst),
            close_errors: self.close_errors.load(Ordering::SeqCst),
            ..PoolStats::default()
        };
        for entry in core.iter().chain(overflow.iter()) {
            match entry.state() {
                ConnectionState::Idle => stats.idle += 1,
                ConnectionState::CheckedOut => stats.active += 1,
                ConnectionState::Evicting | ConnectionState::Closed => {}
            }
        }
        stats
    }
}

/// A bounded pool of database connections
///
/// The pool keeps `init_pool_size` core connections open for its whole
/// lifetime and opens overflow connections on demand up to `max_pool_size`.
/// A background task closes overflow connections that have been idle for
/// longer than `max_idle_secs`.
pub struct PoolManager {
    shared: Arc<PoolShared>,
    eviction_task: Mutex<Option<EvictionTask>>,
}

impl PoolManager {
    /// Create a pool for the given configuration and driver
    ///
    /// The configuration is validated; no connection is opened until [`init`](Self::init).
    pub fn new(config: PoolConfig, driver: Arc<dyn DatabaseDriver>) -> Result<Self> {
        config.validate()?;
        let ids = Arc::new(IdAllocator::new(config.max_pool_size()));
        Ok(Self {
            shared: Arc::new(PoolShared {
                overflow: DashMap::with_capacity(config.overflow_capacity().min(64)),
                config,
                driver,
                ids,
                core: OnceLock::new(),
                overflow_slots: AtomicUsize::new(0),
                state: AtomicU8::new(CREATED),
                available: Notify::new(),
                waiting: AtomicUsize::new(0),
                created: AtomicU64::new(0),
                evicted: AtomicU64::new(0),
                close_errors: AtomicU64::new(0),
            }),
            eviction_task: Mutex::new(None),
        })
    }

    /// Create a pool whose driver is looked up by the configured driver name
    pub fn from_registry(config: PoolConfig, registry: &DriverRegistry) -> Result<Self> {
        let driver = registry.get(config.driver()).ok_or_else(|| {
            SluiceError::Configuration(format!("unknown driver: {}", config.driver()))
        })?;
        Self::new(config, driver)
    }

    /// Create and initialize a pool in one step
    pub async fn open(config: PoolConfig, driver: Arc<dyn DatabaseDriver>) -> Result<Self> {
        let pool = Self::new(config, driver)?;
        pool.init().await?;
        Ok(pool)
    }

    /// Start the eviction task and open the core connections
    ///
    /// If a core connection cannot be opened, the ones already opened are
    /// closed, the task is stopped and the driver error is returned.
    #[tracing::instrument(skip(self), fields(driver = %self.shared.config.driver()))]
    pub async fn init(&self) -> Result<()> {
        let shared = &self.shared;
        if let Err(state) =
            shared
                .state
                .compare_exchange(CREATED, STARTING, Ordering::SeqCst, Ordering::SeqCst)
        {
            return Err(match state {
                CLOSED => SluiceError::PoolClosed,
                _ => SluiceError::Other("pool is already initialized".into()),
            });
        }

        *self.eviction_task.lock() = Some(EvictionTask::spawn(shared));

        let size = shared.config.init_pool_size();
        let mut core = Vec::with_capacity(size);
        for _ in 0..size {
            match PooledConnection::open(
                &shared.config,
                shared.driver.as_ref(),
                Arc::clone(&shared.ids),
                ConnectionRole::Core,
            )
            .await
            {
                Ok(entry) => {
                    shared.created.fetch_add(1, Ordering::SeqCst);
                    core.push(Arc::new(entry));
                }
                Err(e) => {
                    tracing::error!(error = %e, opened = core.len(), "failed to open core connection");
                    self.stop_eviction_task().await;
                    for entry in core {
                        if entry.try_claim() {
                            let _ = shared.discard(entry).await;
                        }
                    }
                    let _ = shared.state.compare_exchange(
                        STARTING,
                        CREATED,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    );
                    return Err(e);
                }
            }
        }

        let _ = shared.core.set(core);
        if shared
            .state
            .compare_exchange(STARTING, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Shut down while the core set was being opened.
            shared.close_all().await?;
            return Err(SluiceError::PoolClosed);
        }

        tracing::info!(
            core = size,
            max = shared.config.max_pool_size(),
            max_idle_secs = shared.config.max_idle_secs(),
            "connection pool initialized"
        );
        Ok(())
    }

    /// Get a connection from the pool
    ///
    /// This will:
    /// 1. Check out the first idle core connection
    /// 2. Otherwise check out the first idle overflow connection
    /// 3. Otherwise open a new overflow connection if under `max_pool_size`
    /// 4. Otherwise wait until a connection is released
    ///
    /// Waits forever unless the configuration sets an acquire timeout.
    pub async fn acquire(&self) -> Result<PoolGuard> {
        match self.shared.config.acquire_timeout() {
            Some(timeout) => self.acquire_timeout(timeout).await,
            None => self.shared.acquire().await,
        }
    }

    /// Get a connection from the pool, giving up after `timeout`
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<PoolGuard> {
        tokio::time::timeout(timeout, self.shared.acquire())
            .await
            .map_err(|_| {
                SluiceError::Timeout(format!(
                    "Timed out waiting for connection (timeout: {:?})",
                    timeout
                ))
            })?
    }

    /// Run one eviction pass now, returning the number of connections closed
    pub async fn run_eviction(&self) -> usize {
        self.run_eviction_at(Instant::now()).await
    }

    /// Run one eviction pass judging idle time at `now`.
    pub(crate) async fn run_eviction_at(&self, now: Instant) -> usize {
        self.shared.evict_idle(now).await
    }

    /// Stop the eviction task and close every connection
    ///
    /// Idle and checked-out connections are both closed and every identifier
    /// is returned before this completes; holders that release afterwards get
    /// [`SluiceError::PoolClosed`]. Further calls to `acquire` fail the same way.
    /// Calling this more than once is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<()> {
        let shared = &self.shared;
        if shared.state.swap(CLOSED, Ordering::SeqCst) == CLOSED {
            tracing::debug!("pool already shut down");
            return Ok(());
        }
        shared.available.notify_waiters();
        self.stop_eviction_task().await;

        let swept = shared.close_all().await;
        let drained = shared.drain_overflow().await;
        let stats = shared.stats();
        tracing::info!(
            evicted = stats.evicted,
            close_errors = stats.close_errors,
            "connection pool shut down"
        );
        swept.and(drained)
    }

    /// Cancel the eviction task and wait for a running pass to finish.
    async fn stop_eviction_task(&self) {
        let task = self.eviction_task.lock().take();
        if let Some(task) = task {
            task.stop().await;
        }
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        self.shared.stats()
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Whether `shutdown` has been called
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Core connections, empty before `init`
    pub fn core_connections(&self) -> &[Arc<PooledConnection>] {
        self.shared.core()
    }

    /// Snapshot of the overflow connections
    pub fn overflow_connections(&self) -> Vec<Arc<PooledConnection>> {
        self.shared.overflow_snapshot()
    }

    /// The pool's connection identifier allocator
    pub fn identifiers(&self) -> &IdAllocator {
        &self.shared.ids
    }
}

impl std::fmt::Debug for PoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolManager")
            .field("config", &self.shared.config)
            .field("stats", &self.shared.stats())
            .finish()
    }
}
