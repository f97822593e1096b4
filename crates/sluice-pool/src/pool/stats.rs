//! Pool statistics types

use serde::{Deserialize, Serialize};

/// Point-in-time snapshot of a pool's state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolStats {
    /// Configured ceiling on live connections
    pub max_size: usize,
    /// Number of core connections
    pub core: usize,
    /// Number of overflow connections
    pub overflow: usize,
    /// Connections available for checkout
    pub idle: usize,
    /// Connections currently held by callers
    pub active: usize,
    /// Callers waiting on a saturated pool
    pub waiting: usize,
    /// Connections opened over the pool's lifetime
    pub created: u64,
    /// Connections closed by eviction or shutdown
    pub evicted: u64,
    /// Failed close calls
    pub close_errors: u64,
}

impl PoolStats {
    /// Total number of live connections (core + overflow)
    pub fn total(&self) -> usize {
        self.core + self.overflow
    }

    /// Fraction of live connections currently in use (0.0 to 1.0)
    ///
    /// Returns 0.0 for an empty pool.
    pub fn utilization(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.active as f64 / total as f64
        }
    }

    /// Whether every allowed connection exists and none is idle
    pub fn is_saturated(&self) -> bool {
        self.max_size > 0 && self.total() == self.max_size && self.idle == 0
    }
}
