//! Caller-side handle for a checked-out connection

use std::ops::Deref;
use std::sync::Arc;

use sluice_core::{Connection, Result};

use super::connection::PooledConnection;
use super::manager::PoolShared;

/// A connection borrowed from the pool
///
/// Releasing the guard (explicitly with [`release`](Self::release) or by
/// dropping it) hands the connection back to the pool instead of closing it.
/// The guard is consumed by the release, so a connection cannot be returned twice.
pub struct PoolGuard {
    entry: Option<Arc<PooledConnection>>,
    pool: Arc<PoolShared>,
}

impl PoolGuard {
    pub(crate) fn new(entry: Arc<PooledConnection>, pool: Arc<PoolShared>) -> Self {
        Self {
            entry: Some(entry),
            pool,
        }
    }

    /// Identifier of the underlying pooled connection
    pub fn id(&self) -> usize {
        self.entry().id()
    }

    /// Pool bookkeeping for this connection
    pub fn entry(&self) -> &PooledConnection {
        self.entry.as_deref().expect("connection taken")
    }

    /// Get the underlying connection as an Arc
    pub fn inner(&self) -> &Arc<dyn Connection> {
        self.entry().connection()
    }

    /// Return the connection to the pool.
    ///
    /// Fails with [`SluiceError::PoolClosed`](sluice_core::SluiceError::PoolClosed)
    /// once the pool has been shut down; shutdown has already closed the connection.
    pub fn release(mut self) -> Result<()> {
        match self.entry.take() {
            Some(entry) => self.pool.release(entry),
            None => Ok(()),
        }
    }
}

impl Deref for PoolGuard {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.inner().as_ref()
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            let id = entry.id();
            if let Err(e) = self.pool.release(entry) {
                tracing::debug!(connection_id = id, error = %e, "connection dropped after pool shutdown");
            }
        }
    }
}

impl std::fmt::Debug for PoolGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolGuard").field("entry", &self.entry).finish()
    }
}
