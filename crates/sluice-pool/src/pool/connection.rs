//! Pooled connection entries

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use sluice_core::{Connection, DatabaseDriver, Result, SluiceError};
use tokio::time::Instant;

use super::config::PoolConfig;
use super::ids::IdAllocator;

const IDLE: u8 = 0;
const CHECKED_OUT: u8 = 1;
const EVICTING: u8 = 2;
const CLOSED: u8 = 3;

/// Which of the pool's two sets a connection belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    /// Opened at init, kept for the pool's lifetime
    Core,
    /// Opened on demand, evicted after sitting idle
    Overflow,
}

/// Lifecycle state of a pooled connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Available for checkout
    Idle,
    /// Held by a caller
    CheckedOut,
    /// Claimed by the pool for closing
    Evicting,
    /// Physical connection closed, identifier returned
    Closed,
}

impl ConnectionState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            IDLE => Self::Idle,
            CHECKED_OUT => Self::CheckedOut,
            EVICTING => Self::Evicting,
            _ => Self::Closed,
        }
    }
}

/// One physical connection plus the pool's bookkeeping for it.
///
/// Every state change is a compare-and-swap on a single atomic, so exactly one
/// party wins each transition:
///
/// ```text
/// Idle --checkout--> CheckedOut --release--> Idle
/// Idle --claim--> Evicting --evict--> Closed
///                 Evicting --restore--> Idle
/// Idle | CheckedOut --retire (pool closed)--> Evicting
/// ```
pub struct PooledConnection {
    id: usize,
    role: ConnectionRole,
    connection: Arc<dyn Connection>,
    ids: Arc<IdAllocator>,
    state: AtomicU8,
    last_released_at: Mutex<Option<Instant>>,
    created_at: Instant,
}

impl PooledConnection {
    /// Open a physical connection and take an identifier for it.
    ///
    /// The connection starts idle with no release timestamp. A driver failure
    /// is returned as [`SluiceError::ConnectionOpen`] and consumes no identifier.
    pub(crate) async fn open(
        config: &PoolConfig,
        driver: &dyn DatabaseDriver,
        ids: Arc<IdAllocator>,
        role: ConnectionRole,
    ) -> Result<Self> {
        let target = config.target();
        let connection = driver
            .connect(&target)
            .await
            .map_err(|e| SluiceError::connection_open(&target.url, e))?;

        let Some(id) = ids.acquire() else {
            if let Err(e) = connection.close().await {
                tracing::warn!(error = %e, "failed to close connection after identifier exhaustion");
            }
            return Err(SluiceError::Other(format!(
                "all {} connection identifiers are in use",
                ids.capacity()
            )));
        };

        tracing::debug!(connection_id = id, role = ?role, "opened pooled connection");
        Ok(Self {
            id,
            role,
            connection,
            ids,
            state: AtomicU8::new(IDLE),
            last_released_at: Mutex::new(None),
            created_at: Instant::now(),
        })
    }

    /// Pool-unique identifier
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn role(&self) -> ConnectionRole {
        self.role
    }

    /// The physical connection
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_raw(self.state.load(Ordering::SeqCst))
    }

    /// Whether the connection is available for checkout
    pub fn is_idle(&self) -> bool {
        self.state.load(Ordering::SeqCst) == IDLE
    }

    /// When the connection last became idle, `None` before its first release
    pub fn last_released_at(&self) -> Option<Instant> {
        *self.last_released_at.lock()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Time since the last release, measured at `now`
    pub fn idle_for(&self, now: Instant) -> Option<Duration> {
        self.last_released_at()
            .map(|released| now.saturating_duration_since(released))
    }

    pub(crate) fn try_checkout(&self) -> bool {
        self.transition(IDLE, CHECKED_OUT)
    }

    /// Mark a checked-out connection idle again and stamp the release time.
    pub(crate) fn release(&self) -> bool {
        if self.state.load(Ordering::SeqCst) != CHECKED_OUT {
            return false;
        }
        *self.last_released_at.lock() = Some(Instant::now());
        self.transition(CHECKED_OUT, IDLE)
    }

    pub(crate) fn try_claim(&self) -> bool {
        self.transition(IDLE, EVICTING)
    }

    /// Claim an idle connection if it has been idle for longer than `max_idle` at `now`.
    ///
    /// A connection that was checked out and released again after the caller
    /// looked at it is handed back idle with its release time untouched.
    pub(crate) fn try_claim_stale(&self, now: Instant, max_idle: Duration) -> bool {
        if !self.try_claim() {
            return false;
        }
        if self.idle_for(now).is_some_and(|idle| idle > max_idle) {
            return true;
        }
        self.restore();
        false
    }

    /// Claim a connection whether it is idle or held by a caller, used once the pool is closed.
    pub(crate) fn try_retire(&self) -> bool {
        self.state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |state| {
                matches!(state, IDLE | CHECKED_OUT).then_some(EVICTING)
            })
            .is_ok()
    }

    /// Hand a claimed connection back without touching its release time.
    pub(crate) fn restore(&self) -> bool {
        self.transition(EVICTING, IDLE)
    }

    /// Return the identifier and close the physical connection.
    ///
    /// Only a connection claimed with [`try_claim`](Self::try_claim) or
    /// [`try_retire`](Self::try_retire) can be evicted, and only once.
    pub(crate) async fn evict(&self) -> Result<()> {
        if !self.transition(EVICTING, CLOSED) {
            return Err(SluiceError::Other(format!(
                "connection {} was not claimed for eviction",
                self.id
            )));
        }
        self.ids.release(self.id);
        self.connection.close().await
    }

    fn transition(&self, from: u8, to: u8) -> bool {
        self.state
            .compare_exchange(from, to, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("state", &self.state())
            .field("driver", &self.connection.driver_name())
            .field("last_released_at", &self.last_released_at())
            .finish()
    }
}
